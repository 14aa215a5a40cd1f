use super::data::escape_json_pointer;
use super::{CompilationSession, SchemaCxt, schema_code};
use crate::codegen::{Expr, Name, Op, TopSchemaRef, names::ERRORS};
use crate::error::CompileError;
use serde_json::Value;
use smol_str::SmolStr;

/// A nested schema applied at the current or a child data location.
#[derive(Debug, Clone)]
pub struct Subschema<'a> {
    pub schema: &'a Value,
    /// Pointer of `schema` inside `top_schema_ref`.
    pub schema_path: String,
    pub err_schema_path: String,
    pub top_schema_ref: TopSchemaRef,
    /// Compile the schema to a single outcome; its own errors are discarded.
    pub composite_rule: bool,
    /// Property of the current data the schema applies to.
    pub data_prop: Option<SmolStr>,
}

/// Compiles `sub` and binds whether it passed to `valid`.
pub fn apply_subschema(
    session: &mut CompilationSession<'_>,
    it: &SchemaCxt<'_>,
    sub: Subschema<'_>,
    valid: &Name,
) -> Result<(), CompileError> {
    let errs_count = session.code.declare_const("_errs", Expr::var(&ERRORS));

    session.code.open_block();
    let mut child = SchemaCxt {
        schema: sub.schema,
        top_schema_ref: sub.top_schema_ref,
        schema_path: sub.schema_path,
        err_schema_path: sub.err_schema_path,
        composite_rule: it.composite_rule || sub.composite_rule,
        ..it.clone()
    };
    if let Some(prop) = sub.data_prop {
        let key = Expr::lit(prop.as_str());
        let data = session
            .code
            .declare_let("data", Expr::var(&it.data).member(key.clone()));
        child.parent_data = it.data.clone();
        child.parent_data_property = key.clone();
        child.data = data.clone();
        child.data_level += 1;
        child.data_names.push(data);
        child.data_path_arr.push(key);
    }
    let result = schema_code(session, &child);
    session.code.close_block();
    result?;

    session.code.declare_named(
        valid,
        Expr::var(&ERRORS).equals(Expr::var(&errs_count)),
    );
    if sub.composite_rule {
        session.code.emit(Op::ResetErrors(errs_count));
    }
    Ok(())
}

/// Schema path of the property `prop` below the keyword at `it`.
pub(crate) fn property_path(base: &str, keyword: &str, prop: &str) -> String {
    format!(
        "{base}/{}/{}",
        escape_json_pointer(keyword),
        escape_json_pointer(prop)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_path() {
        assert_eq!(property_path("", "properties", "a/b"), "/properties/a~1b");
        assert_eq!(property_path("#", "properties", "name"), "#/properties/name");
    }
}
