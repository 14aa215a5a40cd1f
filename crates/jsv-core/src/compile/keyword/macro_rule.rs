use super::KeywordCxt;
use crate::codegen::{Expr, TopSchemaRef};
use crate::compile::errors::report_extra_error;
use crate::compile::registry::CustomRule;
use crate::compile::subschema::Subschema;
use crate::definition::{ErrorDescriptor, MacroFn};
use crate::error::CompileError;
use crate::options::ValidateSchema;
use std::sync::Arc;

/// Compiles the schema a macro keyword expands to as one composite outcome.
///
/// A failing expansion reports the generic keyword error only; the errors of the expanded
/// schema are discarded.
pub(super) fn macro_keyword_code(
    cxt: &mut KeywordCxt<'_, '_>,
    expand: &MacroFn,
) -> Result<(), CompileError> {
    let host = cxt.host();
    let keyword = cxt.keyword();
    let macro_schema = Arc::new(expand(cxt.schema(), cxt.parent_schema(), host));
    let schema_ref = cxt
        .session
        .rules
        .add(keyword, Some(CustomRule::Schema(Arc::clone(&macro_schema))))?;
    if host.options().validate_schema != ValidateSchema::Off {
        host.validate_schema(&macro_schema, true)?;
    }

    let valid = cxt.code().name("valid");
    let sub = Subschema {
        schema: &macro_schema,
        schema_path: String::new(),
        err_schema_path: format!("{}/{keyword}", cxt.it().err_schema_path),
        top_schema_ref: TopSchemaRef::Rule(schema_ref),
        composite_rule: true,
        data_prop: None,
    };
    cxt.subschema(sub, &valid)?;

    cxt.fail_with(Some(Expr::var(&valid).not()), |cxt| {
        report_extra_error(cxt, &ErrorDescriptor::keyword_error());
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::compile::registry::CustomRule;
    use crate::definition::KeywordDefinition;
    use crate::error::CompileError;
    use crate::options::Options;
    use crate::validator::Validator;
    use serde_json::json;

    #[test]
    fn test_invalid_expansion_fails_to_compile() {
        let mut host = Validator::new(Options::default());
        host.add_keyword(
            "broken",
            KeywordDefinition::macro_(|_, _, _| json!({"type": 12})),
        )
        .unwrap();

        let result = host.compile(&json!({"broken": true}));
        assert!(matches!(result, Err(CompileError::InvalidSchema(_))));
    }

    #[test]
    fn test_expansion_registered_as_rule() {
        let mut host = Validator::new(Options::default());
        host.add_keyword(
            "text",
            KeywordDefinition::macro_(|_, _, _| json!({"type": "string"})),
        )
        .unwrap();

        let compiled = host.compile(&json!({"text": true})).unwrap();
        let rules = compiled.rules().iter().collect::<Vec<_>>();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].0.to_string(), "customRule0");
        assert!(
            matches!(rules[0].1, CustomRule::Schema(schema) if **schema == json!({"type": "string"}))
        );
    }
}
