//! Resolution of keyword values: literal schema values and `$data` pointers.

use super::SchemaCxt;
use crate::codegen::{Expr, names::ROOT_DATA};
use crate::error::CompileError;
use serde_json::Value;

/// Escapes a reference token for use in a JSON pointer.
pub fn escape_json_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

pub fn unescape_json_pointer(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Returns an expression for the data location `pointer` refers to, as seen from `it`.
///
/// Absolute pointers (`/a/b`, or `""` for the root) start at the root data. Relative pointers
/// (`1/a`) first go up the given number of data levels; `N#` yields the property name or
/// index of the data N levels up instead of a location.
pub(crate) fn get_data(pointer: &str, it: &SchemaCxt<'_>) -> Result<Expr, CompileError> {
    if pointer.is_empty() {
        return Ok(Expr::var(&ROOT_DATA));
    }

    let (mut expr, json_pointer) = if pointer.starts_with('/') {
        if !is_json_pointer(pointer) {
            return Err(CompileError::InvalidDataPointer(pointer.to_string()));
        }
        (Expr::var(&ROOT_DATA), pointer)
    } else {
        let digits = pointer.bytes().take_while(u8::is_ascii_digit).count();
        let rest = &pointer[digits..];
        let up = pointer[..digits]
            .parse::<usize>()
            .ok()
            .filter(|_| rest.is_empty() || rest == "#" || is_json_pointer(rest))
            .ok_or_else(|| CompileError::InvalidDataPointer(pointer.to_string()))?;

        if rest == "#" {
            if up >= it.data_level {
                return Err(CompileError::DataPointerOutOfRange {
                    target: "property/index",
                    up,
                    level: it.data_level,
                });
            }
            return Ok(it.data_path_arr[it.data_level - up].clone());
        }
        if up > it.data_level {
            return Err(CompileError::DataPointerOutOfRange {
                target: "data",
                up,
                level: it.data_level,
            });
        }
        (Expr::var(&it.data_names[it.data_level - up]), rest)
    };

    for segment in json_pointer.split('/').filter(|segment| !segment.is_empty()) {
        expr = expr.member(Expr::lit(unescape_json_pointer(segment)));
    }
    Ok(expr)
}

fn is_json_pointer(pointer: &str) -> bool {
    pointer.starts_with('/')
        && pointer
            .match_indices('~')
            .all(|(i, _)| matches!(pointer.as_bytes().get(i + 1), Some(b'0' | b'1')))
}

/// Literal for primitive keyword values, a schema reference otherwise.
///
/// Values computed from data are always referenced, since the literal is the `$data` object.
pub(crate) fn schema_ref_or_val(it: &SchemaCxt<'_>, keyword: &str, dynamic: bool) -> Expr {
    match it.schema.get(keyword) {
        Some(value @ (Value::Number(_) | Value::Bool(_) | Value::String(_))) if !dynamic => {
            Expr::Lit(value.clone())
        }
        _ => Expr::Schema {
            top: it.top_schema_ref,
            pointer: format!("{}/{}", it.schema_path, escape_json_pointer(keyword)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{Name, names::DATA};
    use rstest::rstest;
    use serde_json::json;

    fn nested_cxt(schema: &Value) -> SchemaCxt<'_> {
        let mut it = SchemaCxt::root(schema);
        it.data_level = 1;
        it.data_names.push(Name::new("data0"));
        it.data_path_arr.push(Expr::lit("name"));
        it
    }

    #[rstest]
    #[case("", "rootData")]
    #[case("/a/b", "rootData[\"a\"][\"b\"]")]
    #[case("/a~1b/c~0d", "rootData[\"a/b\"][\"c~d\"]")]
    #[case("0", "data0")]
    #[case("1/limit", "data[\"limit\"]")]
    #[case("0#", "\"name\"")]
    fn test_get_data(#[case] pointer: &str, #[case] expected: &str) {
        let schema = json!({});
        let it = nested_cxt(&schema);
        assert_eq!(get_data(pointer, &it).unwrap().to_string(), expected);
    }

    #[rstest]
    #[case("a/b", CompileError::InvalidDataPointer("a/b".to_string()))]
    #[case("/a~2", CompileError::InvalidDataPointer("/a~2".to_string()))]
    #[case("1x", CompileError::InvalidDataPointer("1x".to_string()))]
    #[case(
        "2/limit",
        CompileError::DataPointerOutOfRange { target: "data", up: 2, level: 1 }
    )]
    #[case(
        "1#",
        CompileError::DataPointerOutOfRange { target: "property/index", up: 1, level: 1 }
    )]
    fn test_get_data_errors(#[case] pointer: &str, #[case] expected: CompileError) {
        let schema = json!({});
        let it = nested_cxt(&schema);
        assert_eq!(get_data(pointer, &it), Err(expected));
    }

    #[test]
    fn test_root_level_relative_pointer() {
        let schema = json!({});
        let it = SchemaCxt::root(&schema);
        assert_eq!(get_data("0/a", &it).unwrap(), Expr::var(&DATA).member(Expr::lit("a")));
    }

    #[test]
    fn test_schema_ref_or_val() {
        let schema = json!({"minLength": 2, "enum": [1, 2], "a/b": "x"});
        let it = SchemaCxt::root(&schema);

        assert_eq!(schema_ref_or_val(&it, "minLength", false), Expr::lit(2));
        assert_eq!(schema_ref_or_val(&it, "a/b", false), Expr::lit("x"));
        assert_eq!(
            schema_ref_or_val(&it, "enum", false).to_string(),
            "self.schema#/enum"
        );
        assert_eq!(
            schema_ref_or_val(&it, "minLength", true).to_string(),
            "self.schema#/minLength"
        );
    }
}
