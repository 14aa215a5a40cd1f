//! Compiler configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// How schemas that fail their own checks are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidateSchema {
    /// Fail compilation.
    #[default]
    On,
    /// Skip the check.
    Off,
    /// Log the failure and continue.
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Collect every error instead of stopping at the first failure.
    pub all_errors: bool,
    /// Allow `{"$data": pointer}` keyword values.
    #[serde(rename = "$data")]
    pub data: bool,
    pub validate_schema: ValidateSchema,
    /// Pass the validation context to external rules as the caller.
    pub pass_context: bool,
    pub messages: bool,
    /// Include schema, parent schema and data in error records.
    pub verbose: bool,
    /// Reject unknown keywords.
    pub strict: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            all_errors: false,
            data: false,
            validate_schema: ValidateSchema::default(),
            pass_context: false,
            messages: true,
            verbose: false,
            strict: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid TOML options: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON options: {0}")]
    Json(#[from] serde_json::Error),
}

impl Options {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_json_value(value: Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn all_errors(mut self, all_errors: bool) -> Self {
        self.all_errors = all_errors;
        self
    }

    pub fn data(mut self, data: bool) -> Self {
        self.data = data;
        self
    }

    pub fn validate_schema(mut self, validate_schema: ValidateSchema) -> Self {
        self.validate_schema = validate_schema;
        self
    }

    pub fn pass_context(mut self, pass_context: bool) -> Self {
        self.pass_context = pass_context;
        self
    }

    pub fn messages(mut self, messages: bool) -> Self {
        self.messages = messages;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert!(!options.all_errors);
        assert!(options.messages);
        assert_eq!(options.validate_schema, ValidateSchema::On);
    }

    #[rstest]
    #[case("allErrors = true\n\"$data\" = true", Options::default().all_errors(true).data(true))]
    #[case("validateSchema = \"log\"", Options::default().validate_schema(ValidateSchema::Log))]
    #[case("", Options::default())]
    fn test_from_toml_str(#[case] input: &str, #[case] expected: Options) {
        assert_eq!(Options::from_toml_str(input).unwrap(), expected);
    }

    #[test]
    fn test_from_json_value() {
        let options =
            Options::from_json_value(json!({"passContext": true, "verbose": true})).unwrap();
        assert_eq!(options, Options::default().pass_context(true).verbose(true));
    }

    #[test]
    fn test_invalid_options() {
        assert!(matches!(
            Options::from_json_value(json!({"validateSchema": "sometimes"})),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            Options::from_toml_str("allErrors = 1"),
            Err(ConfigError::Toml(_))
        ));
    }
}
