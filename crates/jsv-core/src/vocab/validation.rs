use crate::codegen::{CmpOp, Expr};
use crate::compile::keyword::KeywordCxt;
use crate::definition::{ErrorDescriptor, ErrorParams, JsonType, KeywordDefinition};
use crate::error::CompileError;
use serde_json::Value;

pub(super) fn keywords() -> Vec<(&'static str, KeywordDefinition)> {
    vec![
        ("type", type_keyword()),
        ("const", const_keyword()),
        ("required", required_keyword()),
        ("minLength", limit_length(CmpOp::Lt, "fewer")),
        ("maxLength", limit_length(CmpOp::Gt, "more")),
    ]
}

fn type_keyword() -> KeywordDefinition {
    KeywordDefinition::code(|cxt, _| {
        let types = schema_types(cxt.schema())?;
        let data = Expr::var(cxt.data()).deref();
        cxt.pass(data.has_type(types))?;
        Ok(())
    })
    .with_schema_type([JsonType::String, JsonType::Array])
    .with_error(ErrorDescriptor::new(
        |_| "should be {type}".to_string(),
        |cxt| {
            let types = match cxt.schema {
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
                other => other.as_str().unwrap_or_default().to_string(),
            };
            ErrorParams::new().with("type", Expr::lit(types))
        },
    ))
}

fn schema_types(schema: &Value) -> Result<Vec<JsonType>, CompileError> {
    let parse = |value: &Value| {
        value
            .as_str()
            .and_then(JsonType::parse)
            .ok_or_else(|| CompileError::InvalidSchema(format!("unknown type {value}")))
    };

    match schema {
        Value::Array(items) => items.iter().map(parse).collect(),
        single => Ok(vec![parse(single)?]),
    }
}

fn const_keyword() -> KeywordDefinition {
    KeywordDefinition::code(|cxt, _| {
        let equal = Expr::var(cxt.data())
            .deref()
            .equals(cxt.schema_code().clone());
        cxt.pass(equal)?;
        Ok(())
    })
    .with_error(ErrorDescriptor::new(
        |_| "should be equal to constant".to_string(),
        |cxt| ErrorParams::new().with("allowedValue", cxt.schema_code.clone()),
    ))
}

fn required_keyword() -> KeywordDefinition {
    KeywordDefinition::code(|cxt, _| {
        let properties = cxt.schema().as_array().cloned().unwrap_or_default();
        for property in properties {
            let Some(property) = property.as_str() else {
                return Err(CompileError::InvalidSchema(format!(
                    "required property {property} must be a string"
                )));
            };
            let missing = Expr::var(cxt.data())
                .member(Expr::lit(property))
                .is_undefined();
            cxt.error_params(
                ErrorParams::new().with("missingProperty", Expr::lit(property)),
                false,
            )?;
            cxt.fail(missing)?;
        }
        Ok(())
    })
    .with_schema_type([JsonType::Array])
    .with_data_type([JsonType::Object])
    .with_error(ErrorDescriptor::new(
        |_| "should have required property '{missingProperty}'".to_string(),
        |cxt| cxt.params.clone(),
    ))
}

fn limit_length(op: CmpOp, comparison: &'static str) -> KeywordDefinition {
    KeywordDefinition::code(move |cxt: &mut KeywordCxt<'_, '_>, _| {
        let length = Expr::var(cxt.data()).deref().length();
        let limit = cxt.schema_code().clone();
        cxt.fail_data(length.compare(op, limit))?;
        Ok(())
    })
    .with_schema_type([JsonType::Number])
    .with_data_type([JsonType::String])
    .data_dependent()
    .with_error(ErrorDescriptor::new(
        move |_| format!("should NOT have {comparison} than {{limit}} characters"),
        |cxt| ErrorParams::new().with("limit", cxt.schema_code.clone()),
    ))
}
