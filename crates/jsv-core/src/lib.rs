//! `jsv-core` compiles JSON schemas with user-defined keywords into validation procedures.
//!
//! Each keyword is compiled once, through one of four strategies: inline code emitted by the
//! keyword itself, macro expansion into another schema, or a call of an external rule that is
//! either given directly or produced from the schema at compile time.
//!
//! ## Examples
//!
//! ```rust
//! use jsv_core::{ErrorsMode, KeywordDefinition, Options, Validator};
//! use serde_json::json;
//!
//! let mut validator = Validator::new(Options::default());
//! validator
//!     .add_keyword(
//!         "isEven",
//!         KeywordDefinition::validate(|data, _| data.as_i64().is_some_and(|n| n % 2 == 0).into())
//!             .with_errors(ErrorsMode::None),
//!     )
//!     .unwrap();
//!
//! let compiled = validator
//!     .compile(&json!({"type": "integer", "isEven": true}))
//!     .unwrap();
//! assert!(compiled.validate(&mut json!(4)).unwrap().valid);
//!
//! let validation = compiled.validate(&mut json!(3)).unwrap();
//! assert_eq!(
//!     validation.errors[0].message.as_deref(),
//!     Some("should pass \"isEven\" keyword validation")
//! );
//! ```
mod arena;
pub mod codegen;
pub mod compile;
pub mod definition;
pub mod error;
pub mod options;
pub mod runtime;
pub mod validation;
mod validator;
mod vocab;

pub use compile::keyword::{Flow, KeywordCxt};
pub use compile::registry::{CustomRule, CustomRules, RuleRef};
pub use compile::subschema::Subschema;
pub use compile::{CompilationSession, SchemaCxt};
pub use definition::{
    AsyncOutcome, BoxFuture, Caller, DataCxt, ErrorCxt, ErrorDescriptor, ErrorParams,
    ErrorsMode, JsonType, KeywordDefinition, KeywordKind, RuleArgs, RuleFault, RuleFn,
    RuleOutcome, SchemaValidator,
};
pub use error::CompileError;
pub use error::runtime::RuntimeError;
pub use options::{ConfigError, Options, ValidateSchema};
pub use validation::{ErrorObject, Validation, errors_text};
pub use validator::{CompiledValidator, Validator};
