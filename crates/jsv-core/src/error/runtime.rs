use crate::definition::RuleFault;
use smol_str::SmolStr;
use thiserror::Error;

/// Faults that abort a validation run.
///
/// A rule rejecting data is a validation outcome and never surfaces here.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("keyword \"{keyword}\" failed: {source}")]
    RuleFault {
        keyword: SmolStr,
        #[source]
        source: RuleFault,
    },
    #[error("validator contains async keywords, use `validate_async`")]
    AsyncProcedure,
    #[error("{rule} is not a {expected}")]
    RuleKindMismatch {
        rule: String,
        expected: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_rule_fault_keeps_source() {
        let error = RuntimeError::RuleFault {
            keyword: "idExists".into(),
            source: "connection refused".into(),
        };
        assert_eq!(error.to_string(), "keyword \"idExists\" failed: connection refused");
        assert_eq!(
            error.source().map(|source| source.to_string()).as_deref(),
            Some("connection refused")
        );
    }
}
