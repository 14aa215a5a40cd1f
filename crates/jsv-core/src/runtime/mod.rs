//! Execution of compiled validation procedures.
//!
//! Data bindings hold locations in the instance rather than copies, so a modifying rule that
//! replaces a value is observed by every keyword evaluated after it.

mod eval;
pub mod value;

pub(crate) use eval::{Evaluator, Frame};
pub use value::{InstancePath, PathSegment, Val};
