use crate::compile::data::escape_json_pointer;
use crate::validation::ErrorObject;
use serde_json::Value;
use smallvec::SmallVec;
use smol_str::SmolStr;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(SmolStr),
    Index(usize),
}

impl PathSegment {
    /// The segment addressing `key` inside `parent`, if `key` can address anything there.
    pub fn for_key(parent: &Value, key: &Value) -> Option<Self> {
        match (parent, key) {
            (Value::Array(_), Value::Number(n)) => n.as_u64().map(|i| PathSegment::Index(i as usize)),
            (Value::Array(_), Value::String(s)) => s.parse().ok().map(PathSegment::Index),
            (Value::Object(_), Value::String(s)) => Some(PathSegment::Key(s.into())),
            (Value::Object(_), Value::Number(n)) => Some(PathSegment::Key(n.to_string().into())),
            _ => None,
        }
    }

    fn get<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        match (self, value) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key.as_str()),
            (PathSegment::Index(i), Value::Array(items)) => items.get(*i),
            _ => None,
        }
    }

    fn get_mut<'v>(&self, value: &'v mut Value) -> Option<&'v mut Value> {
        match (self, value) {
            (PathSegment::Key(key), Value::Object(map)) => map.get_mut(key.as_str()),
            (PathSegment::Index(i), Value::Array(items)) => items.get_mut(*i),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            PathSegment::Key(key) => Value::String(key.to_string()),
            PathSegment::Index(i) => Value::from(*i),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(&escape_json_pointer(key)),
            PathSegment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Location of a value inside the validated instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct InstancePath(SmallVec<[PathSegment; 8]>);

impl InstancePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, segment: PathSegment) -> Self {
        let mut path = self.clone();
        path.0.push(segment);
        path
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn resolve<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.0
            .iter()
            .try_fold(root, |value, segment| segment.get(value))
    }

    pub fn resolve_mut<'v>(&self, root: &'v mut Value) -> Option<&'v mut Value> {
        self.0
            .iter()
            .try_fold(root, |value, segment| segment.get_mut(value))
    }

    /// The path as a JSON pointer, `""` for the root.
    pub fn to_pointer(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0
            .iter()
            .try_for_each(|segment| write!(f, "/{segment}"))
    }
}

/// A runtime value bound in a procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Undefined,
    Json(Value),
    /// A location in the instance; reads go through to the current value there.
    Data(InstancePath),
    Count(usize),
    Errors(Vec<ErrorObject>),
}

impl Val {
    /// Reads the JSON value behind the binding.
    pub fn materialize(&self, root: &Value) -> Option<Value> {
        match self {
            Val::Undefined => None,
            Val::Json(value) => Some(value.clone()),
            Val::Data(path) => path.resolve(root).cloned(),
            Val::Count(n) => Some(Value::from(*n)),
            Val::Errors(errors) => serde_json::to_value(errors).ok(),
        }
    }

    /// JavaScript truthiness.
    pub fn is_truthy(&self, root: &Value) -> bool {
        match self {
            Val::Undefined => false,
            Val::Json(value) => json_truthy(value),
            Val::Data(path) => path.resolve(root).is_some_and(json_truthy),
            Val::Count(n) => *n != 0,
            Val::Errors(_) => true,
        }
    }

    pub fn as_count(&self) -> Option<usize> {
        match self {
            Val::Count(n) => Some(*n),
            Val::Json(value) => value.as_u64().map(|n| n as usize),
            _ => None,
        }
    }
}

fn json_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Deep equality where numbers compare by value, so `1` equals `1.0`.
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_resolve_and_pointer() {
        let root = json!({"a/b": [1, {"c": true}]});
        let path = InstancePath::root()
            .child(PathSegment::Key("a/b".into()))
            .child(PathSegment::Index(1))
            .child(PathSegment::Key("c".into()));

        assert_eq!(path.resolve(&root), Some(&json!(true)));
        assert_eq!(path.to_pointer(), "/a~1b/1/c");
        assert_eq!(InstancePath::root().to_pointer(), "");
    }

    #[test]
    fn test_resolve_mut_replaces_slot() {
        let mut root = json!({"name": "ABC"});
        let path = InstancePath::root().child(PathSegment::Key("name".into()));
        if let Some(slot) = path.resolve_mut(&mut root) {
            *slot = json!("abc");
        }
        assert_eq!(root, json!({"name": "abc"}));
    }

    #[rstest]
    #[case(json!([1, 2]), json!("1"), Some(PathSegment::Index(1)))]
    #[case(json!([1, 2]), json!(0), Some(PathSegment::Index(0)))]
    #[case(json!({"1": 2}), json!(1), Some(PathSegment::Key("1".into())))]
    #[case(json!("text"), json!("a"), None)]
    fn test_segment_for_key(
        #[case] parent: Value,
        #[case] key: Value,
        #[case] expected: Option<PathSegment>,
    ) {
        assert_eq!(PathSegment::for_key(&parent, &key), expected);
    }

    #[rstest]
    #[case(Val::Undefined, false)]
    #[case(Val::Json(json!(0)), false)]
    #[case(Val::Json(json!("")), false)]
    #[case(Val::Json(json!([])), true)]
    #[case(Val::Count(0), false)]
    #[case(Val::Data(InstancePath::root()), true)]
    #[case(Val::Data(InstancePath::root().child(PathSegment::Key("missing".into()))), false)]
    fn test_truthiness(#[case] val: Val, #[case] expected: bool) {
        let root = json!({"a": 1});
        assert_eq!(val.is_truthy(&root), expected);
    }

    #[test]
    fn test_json_equal() {
        assert!(json_equal(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
        assert!(!json_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!json_equal(&json!("1"), &json!(1)));
    }
}
