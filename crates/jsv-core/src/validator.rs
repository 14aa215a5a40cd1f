use crate::codegen::{Procedure, dump_procedure};
use crate::compile::compile_schema;
use crate::compile::registry::CustomRules;
use crate::definition::KeywordDefinition;
use crate::error::CompileError;
use crate::error::runtime::RuntimeError;
use crate::options::{Options, ValidateSchema};
use crate::runtime::{Evaluator, Frame};
use crate::validation::{ErrorObject, Validation, errors_text};
use crate::vocab;
use rustc_hash::FxHashMap;
use serde_json::Value;
use smol_str::SmolStr;
use std::any::Any;
use std::sync::Arc;

/// The keyword registry and compiler entry point.
///
/// A new validator knows the built-in keywords; custom keywords are registered with
/// [`Validator::add_keyword`] and run after them, in registration order.
pub struct Validator {
    options: Options,
    keywords: Vec<(SmolStr, KeywordDefinition)>,
    index: FxHashMap<SmolStr, usize>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Validator {
    pub fn new(options: Options) -> Self {
        let mut validator = Self {
            options,
            keywords: Vec::new(),
            index: FxHashMap::default(),
        };
        for (name, def) in vocab::keywords() {
            validator.insert(name.into(), def);
        }
        validator
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Registers a keyword.
    ///
    /// Names start with a letter, `_` or `$` and continue with letters, digits, `_`, `$`,
    /// `:` or `-`.
    pub fn add_keyword(
        &mut self,
        name: impl Into<SmolStr>,
        def: KeywordDefinition,
    ) -> Result<&mut Self, CompileError> {
        let name = name.into();
        if !is_valid_keyword_name(&name) {
            return Err(CompileError::InvalidKeywordName(name));
        }
        if self.index.contains_key(&name) {
            return Err(CompileError::DuplicateKeyword(name));
        }

        tracing::debug!(keyword = %name, kind = ?def.kind, "keyword added");
        self.insert(name, def);
        Ok(self)
    }

    pub fn remove_keyword(&mut self, name: &str) -> Option<KeywordDefinition> {
        let position = self.index.remove(name)?;
        let (_, def) = self.keywords.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(def)
    }

    pub fn get_keyword(&self, name: &str) -> Option<&KeywordDefinition> {
        self.index.get(name).map(|&position| &self.keywords[position].1)
    }

    /// Registered keywords in evaluation order.
    pub fn keywords(&self) -> impl Iterator<Item = (&str, &KeywordDefinition)> {
        self.keywords.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub fn compile(&self, schema: &Value) -> Result<CompiledValidator, CompileError> {
        let (procedure, rules, is_async) = compile_schema(self, schema)?;
        tracing::debug!(
            instructions = procedure.pool().len(),
            rules = rules.len(),
            is_async,
            "schema compiled"
        );

        Ok(CompiledValidator {
            schema: Arc::new(schema.clone()),
            procedure: Arc::new(procedure),
            rules: Arc::new(rules),
            is_async,
        })
    }

    /// Checks `schema` against the JSON Schema meta-schema.
    ///
    /// An invalid schema is an error when `throw_on_invalid` is set, unless schema problems
    /// are only logged.
    pub fn validate_schema(
        &self,
        schema: &Value,
        throw_on_invalid: bool,
    ) -> Result<bool, CompileError> {
        let Err(error) = jsonschema::meta::validate(schema) else {
            return Ok(true);
        };
        let errors = [ErrorObject::new("metaSchema")
            .with_instance_path(error.instance_path.to_string())
            .with_schema_path(format!("#{}", error.schema_path))
            .with_message(error.to_string())];
        let text = errors_text(&errors, ", ", "schema");

        match self.options.validate_schema {
            ValidateSchema::Log => {
                tracing::error!(errors = %text, "schema is invalid");
                Ok(false)
            }
            _ if throw_on_invalid => Err(CompileError::InvalidSchema(text)),
            _ => Ok(false),
        }
    }

    pub fn errors_text(&self, errors: &[ErrorObject]) -> String {
        errors_text(errors, ", ", "data")
    }

    fn insert(&mut self, name: SmolStr, def: KeywordDefinition) {
        self.index.insert(name.clone(), self.keywords.len());
        self.keywords.push((name, def));
    }
}

fn is_valid_keyword_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | ':' | '-'))
}

/// A compiled schema, cheap to clone and shareable between threads.
#[derive(Debug, Clone)]
pub struct CompiledValidator {
    schema: Arc<Value>,
    procedure: Arc<Procedure>,
    rules: Arc<CustomRules>,
    is_async: bool,
}

impl CompiledValidator {
    /// Validates `data`. Modifying keywords may rewrite it in place.
    pub fn validate(&self, data: &mut Value) -> Result<Validation, RuntimeError> {
        self.run_blocking(data, None)
    }

    /// Validates `data`, passing `context` to external rules as their caller.
    pub fn validate_with_context(
        &self,
        data: &mut Value,
        context: &(dyn Any + Send + Sync),
    ) -> Result<Validation, RuntimeError> {
        self.run_blocking(data, Some(context))
    }

    pub async fn validate_async(&self, data: &mut Value) -> Result<Validation, RuntimeError> {
        self.run(data, None).await
    }

    pub async fn validate_async_with_context(
        &self,
        data: &mut Value,
        context: &(dyn Any + Send + Sync),
    ) -> Result<Validation, RuntimeError> {
        self.run(data, Some(context)).await
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    pub fn rules(&self) -> &CustomRules {
        &self.rules
    }

    /// The compiled procedure as pseudo code.
    pub fn dump(&self) -> String {
        dump_procedure(&self.procedure)
    }

    fn run_blocking(
        &self,
        data: &mut Value,
        context: Option<&(dyn Any + Send + Sync)>,
    ) -> Result<Validation, RuntimeError> {
        if self.is_async {
            return Err(RuntimeError::AsyncProcedure);
        }
        futures::executor::block_on(self.run(data, context))
    }

    async fn run(
        &self,
        data: &mut Value,
        context: Option<&(dyn Any + Send + Sync)>,
    ) -> Result<Validation, RuntimeError> {
        let evaluator = Evaluator::new(&self.procedure, &self.rules, &self.schema);
        let validation = evaluator.run(Frame::new(data, context)).await?;
        tracing::trace!(
            valid = validation.valid,
            errors = validation.errors.len(),
            "validation finished"
        );
        Ok(validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("isEven", true)]
    #[case("$async", true)]
    #[case("x-vendor:range", true)]
    #[case("_private", true)]
    #[case("1st", false)]
    #[case("with space", false)]
    #[case("", false)]
    fn test_keyword_names(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(is_valid_keyword_name(name), valid);
    }

    #[test]
    fn test_add_keyword_rejects_invalid_and_duplicate_names() {
        let mut validator = Validator::default();
        assert_eq!(
            validator
                .add_keyword("bad name", KeywordDefinition::validate(|_, _| true.into()))
                .map(|_| ())
                .unwrap_err(),
            CompileError::InvalidKeywordName("bad name".into())
        );
        assert_eq!(
            validator
                .add_keyword("type", KeywordDefinition::validate(|_, _| true.into()))
                .map(|_| ())
                .unwrap_err(),
            CompileError::DuplicateKeyword("type".into())
        );
    }

    #[test]
    fn test_remove_keyword_keeps_order() {
        let mut validator = Validator::default();
        validator
            .add_keyword("first", KeywordDefinition::validate(|_, _| true.into()))
            .unwrap()
            .add_keyword("second", KeywordDefinition::validate(|_, _| true.into()))
            .unwrap();

        assert!(validator.remove_keyword("const").is_some());
        assert!(validator.remove_keyword("const").is_none());
        assert!(validator.get_keyword("const").is_none());
        assert!(validator.get_keyword("second").is_some());

        let names = validator.keywords().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["type", "required", "minLength", "maxLength", "properties", "first", "second"]
        );
    }

    #[test]
    fn test_validate_schema() {
        let validator = Validator::default();
        assert_eq!(validator.validate_schema(&json!({"type": "string"}), true), Ok(true));
        assert_eq!(validator.validate_schema(&json!({"type": 12}), false), Ok(false));
        assert!(matches!(
            validator.validate_schema(&json!({"type": 12}), true),
            Err(CompileError::InvalidSchema(_))
        ));

        let logging = Validator::new(Options::default().validate_schema(ValidateSchema::Log));
        assert_eq!(logging.validate_schema(&json!({"type": 12}), true), Ok(false));
    }

    #[test]
    fn test_sync_entry_into_async_procedure() {
        let compiled = Validator::default()
            .compile(&json!({"$async": true, "type": "string"}))
            .unwrap();
        assert!(compiled.is_async());
        assert!(matches!(
            compiled.validate(&mut json!("a")),
            Err(RuntimeError::AsyncProcedure)
        ));
    }

    #[test]
    fn test_errors_text() {
        let validator = Validator::default();
        let compiled = validator
            .compile(&json!({"properties": {"name": {"type": "string"}}}))
            .unwrap();
        let validation = compiled.validate(&mut json!({"name": 1})).unwrap();
        assert_eq!(validator.errors_text(&validation.errors), "data/name should be string");
        assert_eq!(validator.errors_text(&[]), "No errors");
    }
}
