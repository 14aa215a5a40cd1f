//! Error records produced by validation runs.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One structured validation error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorObject {
    pub keyword: String,
    pub instance_path: String,
    pub schema_path: String,
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Default::default()
        }
    }

    pub fn with_instance_path(mut self, instance_path: impl Into<String>) -> Self {
        self.instance_path = instance_path.into();
        self
    }

    pub fn with_schema_path(mut self, schema_path: impl Into<String>) -> Self {
        self.schema_path = schema_path.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// The result of one validation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<ErrorObject>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Formats errors as `data/path message` joined by `separator`.
pub fn errors_text(errors: &[ErrorObject], separator: &str, data_var: &str) -> String {
    if errors.is_empty() {
        return "No errors".to_string();
    }

    errors
        .iter()
        .map(|error| {
            format!(
                "{data_var}{} {}",
                error.instance_path,
                error.message.as_deref().unwrap_or_default()
            )
        })
        .join(separator)
}
