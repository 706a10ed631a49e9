//! Values and named bindings.
//!
//! Every scalar a caller supplies becomes a named binding; the only values
//! that bypass binding are the fixed literal passthroughs [`Value::Now`] and
//! [`Value::Null`], which render as raw SQL where a value is expected.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value in a condition or a values map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Serialized to JSON text before binding; also the carrier for
    /// `IN`/`BETWEEN` operands.
    List(Vec<Value>),
    Bytes(Vec<u8>),
    /// Literal passthrough for the database-side current timestamp.
    Now,
}

impl Value {
    /// Whether this value is in the fixed literal-passthrough set.
    ///
    /// The set is exactly {`Now`, `Null`} and is deliberately not extensible:
    /// everything else is bound as a parameter.
    pub fn is_literal(&self) -> bool {
        matches!(self, Value::Now | Value::Null)
    }

    /// Collapse a list into its portable encoding (JSON text) for binding.
    pub(crate) fn encoded(self) -> Value {
        match self {
            Value::List(items) => {
                let json: Vec<serde_json::Value> = items
                    .into_iter()
                    .map(|v| serde_json::to_value(v).unwrap_or(serde_json::Value::Null))
                    .collect();
                Value::Text(serde_json::Value::Array(json).to_string())
            }
            other => other,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Now => write!(f, "NOW"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            // Arrays and objects travel as their JSON encoding.
            other => Value::Text(other.to_string()),
        }
    }
}

const SUFFIX_LEN: usize = 6;
const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Named placeholders and their values for one statement.
///
/// Names are derived from a human-readable label plus a random suffix, so
/// nested sub-expressions never need a shared counter. Uniqueness is scoped
/// to one statement: the map is taken when the statement is rendered.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Bindings {
    values: BTreeMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` under a fresh name derived from `label`.
    ///
    /// The label is reduced to a safe identifier character set (anything
    /// unsafe falls back to a generic label) and retried with a new suffix
    /// until unused. Returns the generated name, without the `:` sigil.
    pub fn add(&mut self, label: &str, value: Value) -> String {
        let base = sanitize_label(label);
        let mut rng = rand::rng();
        loop {
            let mut name = String::with_capacity(base.len() + 1 + SUFFIX_LEN);
            name.push_str(&base);
            name.push('_');
            for _ in 0..SUFFIX_LEN {
                let idx = rng.random_range(0..SUFFIX_CHARS.len());
                name.push(SUFFIX_CHARS[idx] as char);
            }
            if !self.values.contains_key(&name) {
                self.values.insert(name.clone(), value);
                return name;
            }
        }
    }

    /// Attach a caller-supplied binding under its exact name.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Merge another set of bindings (e.g. from a nested expression).
    pub fn merge(&mut self, other: Bindings) {
        self.values.extend(other.values);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IntoIterator for Bindings {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

fn sanitize_label(label: &str) -> String {
    let clean: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if clean.is_empty() || clean.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        "bind".to_string()
    } else {
        clean
    }
}
