//! Code generation for validation procedures.
//!
//! # Architecture
//!
//! ```text
//! Schema
//!     ↓
//! Keyword compilers (compile::keyword)
//!     ↓
//! CodeGen (scope stack)
//!     ↓
//! Procedure (OpPool + body)
//!     ↓
//! runtime::Evaluator
//!     ↓
//! Validation
//! ```

mod builder;
pub mod debug;
mod instruction;
pub mod names;

pub use builder::CodeGen;
pub use debug::dump_procedure;
pub use instruction::{
    CmpOp, ErrorExtension, ErrorTemplate, Expr, Op, OpPool, OpRef, Procedure, RuleCall,
    TopSchemaRef, Verbose,
};
pub use names::Name;
