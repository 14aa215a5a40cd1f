use miette::Diagnostic;
use smol_str::SmolStr;

pub mod runtime;

/// Faults that abort compilation of a schema.
///
/// These are defects in the schema or in a keyword definition, never validation outcomes.
#[derive(Debug, thiserror::Error, Diagnostic, PartialEq)]
pub enum CompileError {
    #[error("{keyword} must be {expected}")]
    #[diagnostic(code(jsv::compile::schema_type))]
    SchemaTypeMismatch { keyword: SmolStr, expected: String },
    #[error("parent schema must have dependencies of {keyword}: {}", dependencies.join(","))]
    #[diagnostic(code(jsv::compile::missing_dependencies))]
    MissingDependencies {
        keyword: SmolStr,
        dependencies: Vec<SmolStr>,
    },
    #[error("keyword schema is invalid: {0}")]
    #[diagnostic(code(jsv::compile::invalid_keyword_schema))]
    InvalidKeywordSchema(String),
    #[error("async keyword in sync schema")]
    #[diagnostic(
        code(jsv::compile::async_in_sync),
        help("declare the root schema with \"$async\": true")
    )]
    AsyncKeywordInSyncSchema { keyword: SmolStr },
    #[error("custom keyword \"{0}\" failed to compile")]
    #[diagnostic(code(jsv::compile::keyword_compile_failed))]
    KeywordCompileFailed(SmolStr),
    #[error("this function can only be used in keyword")]
    #[diagnostic(code(jsv::compile::outside_keyword))]
    OutsideKeyword,
    #[error("schema is invalid: {0}")]
    #[diagnostic(code(jsv::compile::invalid_schema))]
    InvalidSchema(String),
    #[error("Invalid JSON-pointer: {0}")]
    #[diagnostic(code(jsv::compile::invalid_pointer))]
    InvalidDataPointer(String),
    #[error("Cannot access {target} {up} levels up, current level is {level}")]
    #[diagnostic(code(jsv::compile::pointer_out_of_range))]
    DataPointerOutOfRange {
        target: &'static str,
        up: usize,
        level: usize,
    },
    #[error("unknown keyword: \"{0}\"")]
    #[diagnostic(
        code(jsv::compile::unknown_keyword),
        help("register the keyword with `Validator::add_keyword` or disable strict mode")
    )]
    UnknownKeyword(SmolStr),
    #[error("Keyword {0} is already defined")]
    #[diagnostic(code(jsv::compile::duplicate_keyword))]
    DuplicateKeyword(SmolStr),
    #[error("Keyword {0} has invalid name")]
    #[diagnostic(code(jsv::compile::invalid_keyword_name))]
    InvalidKeywordName(SmolStr),
    #[error("invalid keyword meta-schema: {reason}")]
    #[diagnostic(code(jsv::compile::invalid_meta_schema))]
    InvalidKeywordMetaSchema { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        CompileError::SchemaTypeMismatch { keyword: "minLength".into(), expected: "\"number\"".to_string() },
        "minLength must be \"number\""
    )]
    #[case(
        CompileError::MissingDependencies {
            keyword: "range".into(),
            dependencies: vec!["minimum".into(), "maximum".into()],
        },
        "parent schema must have dependencies of range: minimum,maximum"
    )]
    #[case(CompileError::KeywordCompileFailed("even".into()), "custom keyword \"even\" failed to compile")]
    #[case(
        CompileError::AsyncKeywordInSyncSchema { keyword: "idExists".into() },
        "async keyword in sync schema"
    )]
    #[case(
        CompileError::DataPointerOutOfRange { target: "data", up: 3, level: 1 },
        "Cannot access data 3 levels up, current level is 1"
    )]
    fn test_compile_error_message(#[case] error: CompileError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_compile_error_code() {
        let code = CompileError::OutsideKeyword.code().map(|code| code.to_string());
        assert_eq!(code.as_deref(), Some("jsv::compile::outside_keyword"));
    }
}
