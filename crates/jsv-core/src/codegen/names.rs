//! Binding names used by emitted procedures.
//!
//! Every keyword compiler reads and updates the same reserved slots, so independently
//! compiled keywords compose into one validator.

use smol_str::SmolStr;
use std::fmt;

/// An identifier bound inside a procedure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(SmolStr);

impl Name {
    pub(crate) const fn reserved(name: &'static str) -> Self {
        Self(SmolStr::new_inline(name))
    }

    pub(crate) fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Running list of error records.
pub const V_ERRORS: Name = Name::reserved("vErrors");
/// Running count of error records.
pub const ERRORS: Name = Name::reserved("errors");
/// The instance location being validated at the top level.
pub const DATA: Name = Name::reserved("data");
pub const PARENT_DATA: Name = Name::reserved("parentData");
pub const PARENT_DATA_PROPERTY: Name = Name::reserved("parentDataProperty");
pub const ROOT_DATA: Name = Name::reserved("rootData");
