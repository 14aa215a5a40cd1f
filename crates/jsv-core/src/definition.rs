//! Keyword definitions and the calling convention of external rules.
//!
//! A [`KeywordDefinition`] is a closed sum over the four ways a keyword can be implemented:
//!
//! - [`KeywordKind::Code`] emits validation logic directly into the procedure.
//! - [`KeywordKind::Macro`] expands the keyword into an equivalent schema.
//! - [`KeywordKind::Validate`] calls a fixed external rule at validation time.
//! - [`KeywordKind::Compile`] produces the external rule once, at compile time.

use crate::codegen::Expr;
use crate::compile::keyword::KeywordCxt;
use crate::error::CompileError;
use crate::validation::ErrorObject;
use crate::validator::Validator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use futures::future::BoxFuture;

/// JSON types a keyword schema or an instance can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    Null,
    Boolean,
    Object,
    Array,
    Number,
    Integer,
    String,
}

impl JsonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::String => "string",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "null" => Some(JsonType::Null),
            "boolean" => Some(JsonType::Boolean),
            "object" => Some(JsonType::Object),
            "array" => Some(JsonType::Array),
            "number" => Some(JsonType::Number),
            "integer" => Some(JsonType::Integer),
            "string" => Some(JsonType::String),
            _ => None,
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (JsonType::Null, Value::Null) => true,
            (JsonType::Boolean, Value::Bool(_)) => true,
            (JsonType::Object, Value::Object(_)) => true,
            (JsonType::Array, Value::Array(_)) => true,
            (JsonType::Number, Value::Number(_)) => true,
            (JsonType::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            (JsonType::String, Value::String(_)) => true,
            _ => false,
        }
    }

    /// Returns `true` if `value` matches any of `types`.
    pub fn any_matches(types: &[JsonType], value: &Value) -> bool {
        types.iter().any(|ty| ty.matches(value))
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a synchronous external rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutcome {
    pub valid: bool,
    /// Detailed error records; `None` when the rule signalled failure without detail.
    pub errors: Option<Vec<ErrorObject>>,
    /// Replacement for the validated data, honoured for `modifying` keywords.
    pub data: Option<Value>,
}

impl RuleOutcome {
    pub fn valid() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }

    pub fn invalid(errors: Vec<ErrorObject>) -> Self {
        Self {
            valid: false,
            errors: Some(errors),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<bool> for RuleOutcome {
    fn from(valid: bool) -> Self {
        Self {
            valid,
            ..Default::default()
        }
    }
}

pub type RuleFault = Box<dyn std::error::Error + Send + Sync>;

/// What an awaited rule settles to.
#[derive(Debug)]
pub enum AsyncOutcome {
    Ok(bool),
    /// Valid or not, with replacement data for `modifying` keywords.
    Modified { valid: bool, data: Value },
    /// The rule rejected the data and explains why.
    ValidationFailed(Vec<ErrorObject>),
    /// Anything else the rule signalled. It aborts the whole validation run.
    Fault(RuleFault),
}

impl From<bool> for AsyncOutcome {
    fn from(valid: bool) -> Self {
        AsyncOutcome::Ok(valid)
    }
}

/// Where the validated data sits inside the instance.
#[derive(Debug, Clone)]
pub struct DataCxt<'a> {
    pub instance_path: String,
    pub parent_data: Option<&'a Value>,
    pub parent_data_property: Option<Value>,
    pub root_data: &'a Value,
}

/// Caller identity handed to external rules.
#[derive(Clone, Copy)]
pub enum Caller<'a> {
    /// The context passed to `CompiledValidator::validate_with_context`.
    Context(&'a (dyn Any + Send + Sync)),
    Neutral,
}

impl Caller<'_> {
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Caller::Context(context) => context.downcast_ref(),
            Caller::Neutral => None,
        }
    }
}

impl fmt::Debug for Caller<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caller::Context(_) => f.write_str("Caller::Context"),
            Caller::Neutral => f.write_str("Caller::Neutral"),
        }
    }
}

/// Arguments of an external rule call besides the data itself.
#[derive(Debug, Clone)]
pub struct RuleArgs<'a> {
    /// The keyword's schema value. Absent when the rule was compiled against a static schema
    /// or the definition opted out of receiving it.
    pub schema: Option<&'a Value>,
    pub parent_schema: &'a Value,
    pub data_cxt: DataCxt<'a>,
    pub caller: Caller<'a>,
}

pub type ValidateFn = Arc<dyn Fn(&Value, &RuleArgs<'_>) -> RuleOutcome + Send + Sync>;
pub type AsyncValidateFn =
    Arc<dyn for<'a> Fn(&'a Value, RuleArgs<'a>) -> BoxFuture<'a, AsyncOutcome> + Send + Sync>;

/// An external rule, either synchronous or awaited.
#[derive(Clone)]
pub enum RuleFn {
    Sync(ValidateFn),
    Async(AsyncValidateFn),
}

impl RuleFn {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Value, &RuleArgs<'_>) -> RuleOutcome + Send + Sync + 'static,
    {
        RuleFn::Sync(Arc::new(f))
    }

    pub fn asynchronous<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a Value, RuleArgs<'a>) -> BoxFuture<'a, AsyncOutcome> + Send + Sync + 'static,
    {
        RuleFn::Async(Arc::new(f))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, RuleFn::Async(_))
    }
}

impl fmt::Debug for RuleFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleFn::Sync(_) => f.write_str("RuleFn::Sync"),
            RuleFn::Async(_) => f.write_str("RuleFn::Async"),
        }
    }
}

pub type CodeFn = Arc<
    dyn Fn(&mut KeywordCxt<'_, '_>, Option<JsonType>) -> Result<(), CompileError> + Send + Sync,
>;
pub type MacroFn = Arc<dyn Fn(&Value, &Value, &Validator) -> Value + Send + Sync>;
pub type CompileFn = Arc<dyn Fn(&Value, &Value, &Validator) -> Option<RuleFn> + Send + Sync>;

/// Checks a keyword's own schema value.
#[derive(Clone)]
pub struct SchemaValidator(Arc<dyn Fn(&Value) -> Result<(), Vec<ErrorObject>> + Send + Sync>);

impl SchemaValidator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), Vec<ErrorObject>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Builds a validator that checks keyword schemas against `meta_schema`.
    pub fn from_meta_schema(meta_schema: &Value) -> Result<Self, CompileError> {
        let validator = jsonschema::validator_for(meta_schema).map_err(|e| {
            CompileError::InvalidKeywordMetaSchema {
                reason: e.to_string(),
            }
        })?;

        Ok(Self::new(move |schema| {
            let errors = validator
                .iter_errors(schema)
                .map(|e| {
                    ErrorObject::new("metaSchema")
                        .with_instance_path(e.instance_path.to_string())
                        .with_schema_path(format!("#{}", e.schema_path))
                        .with_message(e.to_string())
                })
                .collect::<Vec<_>>();

            if errors.is_empty() {
                Ok(())
            } else {
                Err(errors)
            }
        }))
    }

    pub fn validate(&self, schema: &Value) -> Result<(), Vec<ErrorObject>> {
        (self.0)(schema)
    }
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SchemaValidator")
    }
}

/// Error parameters of a keyword, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorParams(Vec<(SmolStr, Expr)>);

impl ErrorParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter, replacing a previous value under the same key.
    pub fn insert(&mut self, key: impl Into<SmolStr>, value: Expr) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<SmolStr>, value: Expr) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Expr> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn extend(&mut self, other: ErrorParams) {
        for (key, value) in other.0 {
            self.insert(key, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &Expr)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub(crate) fn into_vec(self) -> Vec<(SmolStr, Expr)> {
        self.0
    }
}

/// What an error descriptor sees when rendering a record.
#[derive(Debug)]
pub struct ErrorCxt<'a> {
    pub keyword: &'a str,
    /// The literal keyword schema.
    pub schema: &'a Value,
    /// The resolved schema, a binding when the value is computed from data.
    pub schema_code: &'a Expr,
    pub parent_schema: &'a Value,
    /// Parameters collected through `KeywordCxt::error_params`.
    pub params: &'a ErrorParams,
}

pub type MessageFn = Arc<dyn Fn(&ErrorCxt<'_>) -> String + Send + Sync>;
pub type ParamsFn = Arc<dyn Fn(&ErrorCxt<'_>) -> ErrorParams + Send + Sync>;

/// Message and parameter templates of a keyword's error records.
///
/// Messages may reference parameters as `{name}`; they are substituted when the record is
/// created at validation time.
#[derive(Clone)]
pub struct ErrorDescriptor {
    pub message: MessageFn,
    pub params: ParamsFn,
}

impl ErrorDescriptor {
    pub fn new<M, P>(message: M, params: P) -> Self
    where
        M: Fn(&ErrorCxt<'_>) -> String + Send + Sync + 'static,
        P: Fn(&ErrorCxt<'_>) -> ErrorParams + Send + Sync + 'static,
    {
        Self {
            message: Arc::new(message),
            params: Arc::new(params),
        }
    }

    /// The generic "should pass keyword validation" error.
    pub fn keyword_error() -> Self {
        Self::new(
            |cxt| format!("should pass \"{}\" keyword validation", cxt.keyword),
            |cxt| ErrorParams::new().with("keyword", Expr::lit(cxt.keyword)),
        )
    }
}

impl fmt::Debug for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorDescriptor")
    }
}

/// Whether an external rule reports detailed error records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorsMode {
    None,
    #[default]
    Detailed,
}

#[derive(Clone)]
pub enum KeywordKind {
    Code(CodeFn),
    Macro {
        expand: MacroFn,
        /// Used instead of the expansion when the keyword value is computed from data.
        validate: Option<RuleFn>,
    },
    Validate(RuleFn),
    Compile {
        compile: CompileFn,
        /// Used instead of `compile` when the keyword value is computed from data.
        validate: Option<RuleFn>,
    },
}

impl KeywordKind {
    /// The fixed external rule, if the definition has one.
    pub fn validate_fn(&self) -> Option<&RuleFn> {
        match self {
            KeywordKind::Validate(rule) => Some(rule),
            KeywordKind::Macro { validate, .. } | KeywordKind::Compile { validate, .. } => {
                validate.as_ref()
            }
            KeywordKind::Code(_) => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            KeywordKind::Code(_) => "code",
            KeywordKind::Macro { .. } => "macro",
            KeywordKind::Validate(_) => "validate",
            KeywordKind::Compile { .. } => "compile",
        }
    }
}

impl fmt::Debug for KeywordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a keyword is compiled, plus the constraints shared by every kind.
#[derive(Debug, Clone)]
pub struct KeywordDefinition {
    pub kind: KeywordKind,
    /// Types the keyword's own schema value must have.
    pub schema_type: Vec<JsonType>,
    /// Instance types the keyword applies to; other data skips it.
    pub data_type: Vec<JsonType>,
    /// The keyword value may be `{"$data": pointer}`.
    pub data_dependent: bool,
    pub errors: ErrorsMode,
    /// Compile-time known outcome of the rule.
    pub valid: Option<bool>,
    /// Keywords that must be present in the same schema object.
    pub dependencies: Vec<SmolStr>,
    pub schema_validator: Option<SchemaValidator>,
    pub error: Option<ErrorDescriptor>,
    /// The rule may replace the data it validates.
    pub modifying: bool,
    pub is_async: bool,
    /// Whether the schema value is passed to external rules.
    pub pass_schema: bool,
}

impl KeywordDefinition {
    fn with_kind(kind: KeywordKind) -> Self {
        Self {
            kind,
            schema_type: Vec::new(),
            data_type: Vec::new(),
            data_dependent: false,
            errors: ErrorsMode::default(),
            valid: None,
            dependencies: Vec::new(),
            schema_validator: None,
            error: None,
            modifying: false,
            is_async: false,
            pass_schema: true,
        }
    }

    pub fn code<F>(f: F) -> Self
    where
        F: Fn(&mut KeywordCxt<'_, '_>, Option<JsonType>) -> Result<(), CompileError>
            + Send
            + Sync
            + 'static,
    {
        Self::with_kind(KeywordKind::Code(Arc::new(f)))
    }

    pub fn macro_<F>(f: F) -> Self
    where
        F: Fn(&Value, &Value, &Validator) -> Value + Send + Sync + 'static,
    {
        Self::with_kind(KeywordKind::Macro {
            expand: Arc::new(f),
            validate: None,
        })
    }

    pub fn validate<F>(f: F) -> Self
    where
        F: Fn(&Value, &RuleArgs<'_>) -> RuleOutcome + Send + Sync + 'static,
    {
        Self::with_kind(KeywordKind::Validate(RuleFn::sync(f)))
    }

    pub fn validate_async<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a Value, RuleArgs<'a>) -> BoxFuture<'a, AsyncOutcome> + Send + Sync + 'static,
    {
        let mut def = Self::with_kind(KeywordKind::Validate(RuleFn::asynchronous(f)));
        def.is_async = true;
        def
    }

    pub fn compile<F>(f: F) -> Self
    where
        F: Fn(&Value, &Value, &Validator) -> Option<RuleFn> + Send + Sync + 'static,
    {
        Self::with_kind(KeywordKind::Compile {
            compile: Arc::new(f),
            validate: None,
        })
    }

    /// Sets the rule used when the keyword value is computed from data.
    ///
    /// Only meaningful for `Macro` and `Compile` definitions.
    pub fn with_data_validate(mut self, rule: RuleFn) -> Self {
        match &mut self.kind {
            KeywordKind::Macro { validate, .. } | KeywordKind::Compile { validate, .. } => {
                *validate = Some(rule)
            }
            KeywordKind::Code(_) | KeywordKind::Validate(_) => {}
        }
        self
    }

    pub fn with_schema_type(mut self, types: impl IntoIterator<Item = JsonType>) -> Self {
        self.schema_type = types.into_iter().collect();
        self
    }

    pub fn with_data_type(mut self, types: impl IntoIterator<Item = JsonType>) -> Self {
        self.data_type = types.into_iter().collect();
        self
    }

    pub fn data_dependent(mut self) -> Self {
        self.data_dependent = true;
        self
    }

    pub fn with_errors(mut self, errors: ErrorsMode) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_valid(mut self, valid: bool) -> Self {
        self.valid = Some(valid);
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_schema_validator(mut self, validator: SchemaValidator) -> Self {
        self.schema_validator = Some(validator);
        self
    }

    pub fn with_error(mut self, error: ErrorDescriptor) -> Self {
        self.error = Some(error);
        self
    }

    pub fn modifying(mut self) -> Self {
        self.modifying = true;
        self
    }

    /// Marks the external rule as awaited. The rule itself must be [`RuleFn::Async`].
    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// Stops passing the schema value to external rules.
    pub fn without_schema(mut self) -> Self {
        self.pass_schema = false;
        self
    }

    pub fn is_code(&self) -> bool {
        matches!(self.kind, KeywordKind::Code(_))
    }
}
