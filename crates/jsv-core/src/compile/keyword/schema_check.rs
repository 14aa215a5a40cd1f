use crate::compile::SchemaCxt;
use crate::definition::KeywordDefinition;
use crate::error::CompileError;
use crate::options::{Options, ValidateSchema};
use crate::validation::errors_text;

/// Checks a keyword occurrence against its definition before any code is emitted for it.
///
/// Computed keyword values are only known at validation time, so their own schema check is
/// left to the emitted procedure.
pub(crate) fn validate_keyword_schema(
    options: &Options,
    it: &SchemaCxt<'_>,
    keyword: &str,
    def: &KeywordDefinition,
    dynamic: bool,
) -> Result<(), CompileError> {
    let missing = def
        .dependencies
        .iter()
        .any(|dependency| it.schema.get(dependency.as_str()).is_none());
    if missing {
        return Err(CompileError::MissingDependencies {
            keyword: keyword.into(),
            dependencies: def.dependencies.clone(),
        });
    }

    let Some(validator) = def.schema_validator.as_ref().filter(|_| !dynamic) else {
        return Ok(());
    };
    let schema = it.schema.get(keyword).unwrap_or(&serde_json::Value::Null);
    if let Err(errors) = validator.validate(schema) {
        let message = errors_text(&errors, ", ", "data");
        if options.validate_schema == ValidateSchema::Log {
            tracing::error!(keyword, "keyword schema is invalid: {message}");
        } else {
            return Err(CompileError::InvalidKeywordSchema(message));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::SchemaValidator;
    use serde_json::json;

    fn range_def() -> KeywordDefinition {
        KeywordDefinition::validate(|_, _| true.into())
            .with_dependencies(["minimum", "maximum"])
            .with_schema_validator(
                SchemaValidator::from_meta_schema(&json!({"type": "boolean"})).unwrap(),
            )
    }

    #[test]
    fn test_missing_dependencies() {
        let schema = json!({"range": true, "minimum": 1});
        let result = validate_keyword_schema(
            &Options::default(),
            &SchemaCxt::root(&schema),
            "range",
            &range_def(),
            false,
        );
        assert_eq!(
            result.map_err(|e| e.to_string()),
            Err("parent schema must have dependencies of range: minimum,maximum".to_string())
        );
    }

    #[test]
    fn test_invalid_keyword_schema() {
        let schema = json!({"range": 1, "minimum": 1, "maximum": 2});
        let it = SchemaCxt::root(&schema);

        let result = validate_keyword_schema(&Options::default(), &it, "range", &range_def(), false);
        assert!(matches!(
            result,
            Err(CompileError::InvalidKeywordSchema(message)) if message.starts_with("data ")
        ));

        let logged = Options::default().validate_schema(ValidateSchema::Log);
        assert_eq!(
            validate_keyword_schema(&logged, &it, "range", &range_def(), false),
            Ok(())
        );
    }

    #[test]
    fn test_dynamic_value_skips_schema_check() {
        let schema = json!({"range": {"$data": "1/range"}, "minimum": 1, "maximum": 2});
        let result = validate_keyword_schema(
            &Options::default(),
            &SchemaCxt::root(&schema),
            "range",
            &range_def(),
            true,
        );
        assert_eq!(result, Ok(()));
    }
}
