//! Opaque values referenced from emitted procedures.
//!
//! Rules are appended while a schema compiles and addressed by the index they were given.
//! The finished table is frozen behind an `Arc` and shared by every run of the validator.

use crate::arena::{Arena, ArenaId};
use crate::definition::{AsyncValidateFn, RuleFn, SchemaValidator, ValidateFn};
use crate::error::CompileError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub enum CustomRule {
    Validate(ValidateFn),
    AsyncValidate(AsyncValidateFn),
    /// A keyword's own schema validator, run against computed keyword values.
    SchemaCheck(SchemaValidator),
    /// A schema produced by macro expansion.
    Schema(Arc<Value>),
}

impl CustomRule {
    pub fn kind(&self) -> &'static str {
        match self {
            CustomRule::Validate(_) => "validate",
            CustomRule::AsyncValidate(_) => "async validate",
            CustomRule::SchemaCheck(_) => "schema check",
            CustomRule::Schema(_) => "schema",
        }
    }
}

impl From<RuleFn> for CustomRule {
    fn from(rule: RuleFn) -> Self {
        match rule {
            RuleFn::Sync(f) => CustomRule::Validate(f),
            RuleFn::Async(f) => CustomRule::AsyncValidate(f),
        }
    }
}

impl fmt::Debug for CustomRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomRule::Schema(schema) => f.debug_tuple("Schema").field(schema).finish(),
            rule => write!(f, "CustomRule({})", rule.kind()),
        }
    }
}

/// Stable handle of a registered rule, rendered as `customRule<N>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleRef(ArenaId<CustomRule>);

impl RuleRef {
    pub fn index(self) -> usize {
        self.0.index()
    }
}

impl fmt::Display for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "customRule{}", self.0.index())
    }
}

#[derive(Debug, Default)]
pub struct CustomRules {
    rules: Arena<CustomRule>,
}

impl CustomRules {
    pub fn new() -> Self {
        Self {
            rules: Arena::new(8),
        }
    }

    /// Registers the value a keyword compiled to.
    ///
    /// `None` means the keyword produced nothing to call.
    pub fn add(
        &mut self,
        keyword: &str,
        rule: Option<impl Into<CustomRule>>,
    ) -> Result<RuleRef, CompileError> {
        let rule = rule.ok_or_else(|| CompileError::KeywordCompileFailed(keyword.into()))?;
        Ok(self.push(rule.into()))
    }

    pub fn push(&mut self, rule: CustomRule) -> RuleRef {
        RuleRef(self.rules.alloc(rule))
    }

    pub fn get(&self, rule: RuleRef) -> Option<&CustomRule> {
        self.rules.get(rule.0)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RuleRef, &CustomRule)> {
        self.rules.iter().map(|(id, rule)| (RuleRef(id), rule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn schema_rule(n: usize) -> CustomRule {
        CustomRule::Schema(Arc::new(json!({ "const": n })))
    }

    #[test]
    fn test_add_returns_sequential_handles() {
        let mut rules = CustomRules::new();
        let first = rules
            .add("isEven", Some(RuleFn::sync(|_, _| true.into())))
            .unwrap();
        let second = rules.add("range", Some(schema_rule(0))).unwrap();

        assert_eq!(first.to_string(), "customRule0");
        assert_eq!(second.to_string(), "customRule1");
        assert!(matches!(rules.get(first), Some(CustomRule::Validate(_))));
    }

    #[test]
    fn test_add_none_fails_to_compile() {
        let mut rules = CustomRules::new();
        let result = rules.add("even", None::<CustomRule>);
        assert_eq!(
            result,
            Err(CompileError::KeywordCompileFailed("even".into()))
        );
        assert!(rules.is_empty());
    }

    proptest! {
        #[test]
        fn test_handles_stay_resolvable(count in 1usize..64) {
            let mut rules = CustomRules::new();
            let handles = (0..count).map(|n| rules.push(schema_rule(n))).collect::<Vec<_>>();

            prop_assert_eq!(rules.len(), count);
            for (n, handle) in handles.into_iter().enumerate() {
                prop_assert_eq!(handle.index(), n);
                prop_assert_eq!(handle.to_string(), format!("customRule{n}"));
                match rules.get(handle) {
                    Some(CustomRule::Schema(schema)) => prop_assert_eq!(&**schema, &json!({ "const": n })),
                    other => prop_assert!(false, "unexpected rule {:?}", other),
                }
            }
        }
    }
}
