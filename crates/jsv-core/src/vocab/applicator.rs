use crate::codegen::Expr;
use crate::compile::subschema::{Subschema, property_path};
use crate::definition::{JsonType, KeywordDefinition};

pub(super) fn keywords() -> Vec<(&'static str, KeywordDefinition)> {
    vec![("properties", properties_keyword())]
}

/// Applies each property schema to the property when it is present.
fn properties_keyword() -> KeywordDefinition {
    KeywordDefinition::code(|cxt, _| {
        let Some(properties) = cxt.schema().as_object() else {
            return Ok(());
        };
        let it = cxt.it();

        for (property, schema) in properties {
            let valid = cxt.code().name("valid");
            let present = Expr::var(&it.data)
                .member(Expr::lit(property.as_str()))
                .is_undefined()
                .not();

            cxt.code().if_(present);
            cxt.subschema(
                Subschema {
                    schema,
                    schema_path: property_path(&it.schema_path, "properties", property),
                    err_schema_path: property_path(&it.err_schema_path, "properties", property),
                    top_schema_ref: it.top_schema_ref,
                    composite_rule: false,
                    data_prop: Some(property.into()),
                },
                &valid,
            )?;
            if !cxt.all_errors() {
                cxt.code().else_();
                cxt.code().declare_named(&valid, Expr::lit(true));
            }
            cxt.code().end_if();
            cxt.ok(Expr::var(&valid))?;
        }
        Ok(())
    })
    .with_schema_type([JsonType::Object])
    .with_data_type([JsonType::Object])
}
