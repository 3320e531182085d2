use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named parameters of a user search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryVars(Map<String, Value>);

impl QueryVars {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds vars from a JSON object; any other JSON value yields empty vars.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Reads an integer given either as a JSON number or a numeric string.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// True only for an explicit JSON `true`.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Bool(true)))
    }

    /// Reads a list of identifiers.
    ///
    /// A string is split on commas; an array contributes its string elements.
    /// Entries are trimmed, empty entries dropped and duplicates removed.
    /// Any other value reads as an empty list.
    #[must_use]
    pub fn string_list(&self, key: &str) -> Vec<String> {
        let raw: Vec<&str> = match self.get(key) {
            Some(Value::String(s)) => s.split(',').collect(),
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };

        let mut out: Vec<String> = Vec::with_capacity(raw.len());
        for item in raw {
            let item = item.trim();
            if !item.is_empty() && !out.iter().any(|seen| seen == item) {
                out.push(item.to_string());
            }
        }
        out
    }
}
