//! The canonical mutable-array encoding.
//!
//! Arrays round-trip through string-valued arguments as JSON text. An array
//! read from a variable is tagged with the variable's name so mutating
//! subtags can write the result back; the tag is a weak reference (name
//! only), never a pointer into the store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A sequence of JSON-compatible values, optionally owned by a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagArray {
    pub name: Option<String>,
    pub values: Vec<Value>,
}

impl TagArray {
    pub fn new(values: Vec<Value>) -> Self {
        Self { name: None, values }
    }

    pub fn named(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: Some(name.into()),
            values,
        }
    }

    /// Parses the literal encodings: a JSON array, or the named form
    /// `{"n":"var","v":[...]}`. Returns `None` for anything else; resolving
    /// variable references is the execution context's job.
    pub fn parse(input: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(input.trim()).ok()?;
        Self::from_value(&value)
    }

    /// Interprets an already-parsed JSON value as a tag array.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self::new(items.clone())),
            Value::Object(map) => {
                let name = map.get("n")?.as_str()?;
                let values = map.get("v")?.as_array()?;
                Some(Self::named(name, values.clone()))
            }
            _ => None,
        }
    }

    /// The reversible text encoding. Named arrays keep their variable tag so
    /// a later deserialization can still write mutations back.
    pub fn encode(&self) -> String {
        match &self.name {
            Some(name) => serde_json::json!({ "n": name, "v": self.values }).to_string(),
            None => Value::Array(self.values.clone()).to_string(),
        }
    }

    /// The plain display form, without the ownership tag.
    pub fn display(&self) -> String {
        Value::Array(self.values.clone()).to_string()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sorts values numerically when both sides parse as numbers, otherwise
    /// lexicographically by display form.
    pub fn sort(&mut self, descending: bool) {
        self.values.sort_by(|a, b| {
            let ordering = match (as_number(a), as_number(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
                _ => crate::json::display(a).cmp(&crate::json::display(b)),
            };
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
