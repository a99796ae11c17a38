//! The dynamic data tree carried by every [`crate::Event`] and every shared-state
//! snapshot.
//!
//! `Value` is a closed sum type, not a reflective object: callers pattern-match
//! or use the typed accessors below. There is no runtime type registry.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A tree-shaped value: `{null, bool, number, string, list, mapping}`.
///
/// `Int` and `Double` are kept distinct so numeric matchers (`§3` `gt`/`ge`/...)
/// can coerce strings that parse as numbers without losing integer precision
/// for the common case of counters and sequence numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Shorthand for an empty mapping, the common starting point for event data.
    #[must_use]
    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view, coercing strings that parse cleanly as f64. Returns `None`
    /// for anything else, matching the rules engine's "otherwise the matcher
    /// is false" fallback for numeric comparisons.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Dotted-path lookup into nested mappings (`"a.b.c"`). Returns `None` as
    /// soon as an intermediate segment is missing or not a mapping.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut cur = self;
        for part in path.split('.') {
            if part.is_empty() {
                return None;
            }
            cur = match cur {
                Value::Map(m) => m.get(part)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// Sets a dotted path, creating intermediate mappings as needed. Used by
    /// tests and by extensions assembling shared-state payloads.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let mut parts = path.split('.').peekable();
        let mut cur = self;
        while let Some(part) = parts.next() {
            if !matches!(cur, Value::Map(_)) {
                *cur = Value::map();
            }
            let Value::Map(m) = cur else { unreachable!() };
            if parts.peek().is_none() {
                m.insert(part.to_string(), value);
                return;
            }
            cur = m.entry(part.to_string()).or_insert_with(Value::map);
        }
    }

    /// Recursive merge. Maps merge key-by-key; lists and scalars are replaced
    /// wholesale according to `overwrite`.
    ///
    /// # Merge law
    /// With `overwrite = false`, every key present in `self` keeps its value
    /// (recursively); new keys from `other` are still added. With
    /// `overwrite = true`, every key present in `other` wins.
    #[must_use]
    pub fn merge(&self, other: &Value, overwrite: bool) -> Value {
        match (self, other) {
            (Value::Map(a), Value::Map(b)) => {
                let mut out = a.clone();
                for (k, vb) in b {
                    match out.get(k) {
                        Some(va) => {
                            let merged = va.merge(vb, overwrite);
                            out.insert(k.clone(), merged);
                        }
                        None => {
                            out.insert(k.clone(), vb.clone());
                        }
                    }
                }
                Value::Map(out)
            }
            _ => {
                if overwrite {
                    other.clone()
                } else {
                    self.clone()
                }
            }
        }
    }

    /// In-place variant of [`Value::merge`].
    pub fn merge_in_place(&mut self, other: &Value, overwrite: bool) {
        *self = self.merge(other, overwrite);
    }
}

impl fmt::Display for Value {
    /// String form used by the template renderer: empty for `Null`, otherwise
    /// the natural textual representation.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(_) | Value::Map(_) => match serde_json::to_string(self) {
                Ok(s) => write!(f, "{s}"),
                Err(_) => write!(f, ""),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
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
                    Value::Double(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
