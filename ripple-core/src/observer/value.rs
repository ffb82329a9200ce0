//! Dynamic values.
//!
//! [`Value`] is the tree that the tracking layer observes. Scalars are stored
//! inline; objects and arrays are shared handles, so cloning a `Value` clones
//! a reference, never the container.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Number;

use super::observe::Observer;
use super::{Array, Object};

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Object(Object),
    Array(Array),
}

impl Value {
    /// Identity comparison: numbers by value (NaN never equals itself),
    /// strings by content, containers by handle.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Like [`strict_equals`](Self::strict_equals), except NaN equals NaN.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::Array(_) => true,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Whether this is an object or an array.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// The observer wrapping this value, if it is a wrapped container.
    pub fn observer(&self) -> Option<Arc<Observer>> {
        match self {
            Value::Object(obj) => obj.observer(),
            Value::Array(arr) => arr.observer(),
            _ => None,
        }
    }

    /// Property access as used by watch paths. Object keys go through the
    /// tracked getter; arrays answer `length` and numeric indices.
    pub fn property(&self, key: &str) -> Value {
        match self {
            Value::Object(obj) => obj.get(key),
            Value::Array(arr) if key == "length" => Value::Number(arr.len() as f64),
            Value::Array(arr) => key
                .parse::<usize>()
                .map(|index| arr.get(index))
                .unwrap_or(Value::Undefined),
            Value::String(s) if key == "length" => Value::Number(s.chars().count() as f64),
            _ => Value::Undefined,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
        }
    }

    /// Build a fresh, unwrapped value tree from JSON.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Snapshot the current tree as JSON without registering dependencies.
    ///
    /// `Undefined` and non-finite numbers become `null`, as does any
    /// container reached a second time along the current path.
    pub fn to_json(&self) -> serde_json::Value {
        let mut path = HashSet::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut HashSet<usize>) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Object(obj) => {
                if !path.insert(obj.addr()) {
                    return serde_json::Value::Null;
                }
                let map = obj
                    .keys()
                    .into_iter()
                    .map(|key| {
                        let value = obj.raw_get(&key).to_json_inner(path);
                        (key, value)
                    })
                    .collect();
                path.remove(&obj.addr());
                serde_json::Value::Object(map)
            }
            Value::Array(arr) => {
                if !path.insert(arr.addr()) {
                    return serde_json::Value::Null;
                }
                let items = arr.to_vec().iter().map(|item| item.to_json_inner(path)).collect();
                path.remove(&arr.addr());
                serde_json::Value::Array(items)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Object(obj) => fmt::Debug::fmt(obj, f),
            Value::Array(arr) => fmt::Debug::fmt(arr, f),
        }
    }
}

/// String conversion used for default array ordering.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.is_nan() => f.write_str("NaN"),
            Value::Number(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e21 => write!(f, "{:.0}", n + 0.0),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Array(arr) => f.write_str(&join_array(arr, &mut HashSet::new())),
        }
    }
}

/// Comma-joined element strings. An array reached again inside itself joins
/// as the empty string.
fn join_array(arr: &Array, path: &mut HashSet<usize>) -> String {
    if !path.insert(arr.addr()) {
        return String::new();
    }
    let parts: Vec<String> = arr
        .to_vec()
        .iter()
        .map(|item| match item {
            Value::Undefined | Value::Null => String::new(),
            Value::Array(inner) => join_array(inner, path),
            other => other.to_string(),
        })
        .collect();
    path.remove(&arr.addr());
    parts.join(",")
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj)
    }
}

impl From<Array> for Value {
    fn from(arr: Array) -> Self {
        Value::Array(arr)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nan_is_same_value_but_not_strictly_equal() {
        let nan = Value::Number(f64::NAN);
        assert!(!nan.strict_equals(&nan));
        assert!(nan.same_value(&Value::Number(f64::NAN)));
        assert!(!nan.same_value(&Value::Number(1.0)));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Object::new();
        let b = Object::new();
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::from(Array::new()).is_truthy());
    }

    #[test]
    fn json_conversion_preserves_shape() {
        let source = json!({ "a": { "b": [1, 2, "three"] }, "c": null, "d": true });
        let value = Value::from_json(source.clone());
        assert_eq!(value.to_json(), source);
    }

    #[test]
    fn to_json_cuts_cycles() {
        let obj = Object::new();
        obj.set("name", Value::from("root"));
        obj.set("me", Value::from(obj.clone()));
        assert_eq!(
            Value::from(obj).to_json(),
            json!({ "name": "root", "me": null })
        );
    }

    #[test]
    fn display_matches_default_sort_keys() {
        assert_eq!(Value::from(10).to_string(), "10");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
        let arr: Array = vec![Value::from(1), Value::Null, Value::from("x")].into_iter().collect();
        assert_eq!(Value::from(arr).to_string(), "1,,x");
    }
}
