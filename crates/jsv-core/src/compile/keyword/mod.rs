//! Compilation of single keyword occurrences.
//!
//! The dispatcher builds a [`KeywordCxt`] and routes the keyword to exactly one strategy:
//! inline code, macro expansion, or an external rule call.

mod context;
mod func_rule;
mod macro_rule;
mod schema_check;

pub use context::{Flow, KeywordCxt};

use crate::compile::{CompilationSession, SchemaCxt};
use crate::definition::{CodeFn, JsonType, KeywordDefinition, KeywordKind, MacroFn};
use crate::error::CompileError;

enum Strategy<'d> {
    Code(&'d CodeFn),
    Macro(&'d MacroFn),
    Func,
}

impl Strategy<'_> {
    fn name(&self) -> &'static str {
        match self {
            Strategy::Code(_) => "code",
            Strategy::Macro(_) => "macro",
            Strategy::Func => "function rule",
        }
    }
}

/// Emits the checks of one keyword occurrence into its own block.
pub(crate) fn keyword_code(
    session: &mut CompilationSession<'_>,
    it: &SchemaCxt<'_>,
    keyword: &str,
    def: &KeywordDefinition,
    rule_type: Option<JsonType>,
) -> Result<(), CompileError> {
    let data_pointer = context::data_pointer(session.options(), it, keyword, def);
    let strategy = match &def.kind {
        KeywordKind::Code(emit) => Strategy::Code(emit),
        kind if data_pointer.is_some() && kind.validate_fn().is_some() => Strategy::Func,
        KeywordKind::Macro { expand, .. } => Strategy::Macro(expand),
        KeywordKind::Compile { .. } | KeywordKind::Validate(_) => Strategy::Func,
    };
    tracing::debug!(
        keyword,
        strategy = strategy.name(),
        path = %it.err_schema_path,
        "compiling keyword"
    );

    if matches!(strategy, Strategy::Func) && def.is_async && !session.is_async() {
        return Err(CompileError::AsyncKeywordInSyncSchema {
            keyword: keyword.into(),
        });
    }

    session.code.open_block();
    let result = KeywordCxt::new(session, it, keyword, def, data_pointer).and_then(|mut cxt| {
        match strategy {
            Strategy::Code(emit) => emit(&mut cxt, rule_type),
            Strategy::Macro(expand) => macro_rule::macro_keyword_code(&mut cxt, expand),
            Strategy::Func => func_rule::func_keyword_code(&mut cxt, def),
        }
    });
    session.code.close_block();
    result
}
