//! Diagnostic bag attached to provider failures
//!
//! Every failure surfaced to an automation author carries one of these:
//! tenant/product/environment identifiers, the schema key of the failing node,
//! the path and the offending value. String values are truncated so a large
//! payload never ends up verbatim in an error message.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::MAX_DEBUG_VALUE_LENGTH;

/// Truncate `text` to at most `max` characters, marking the cut with "..."
pub fn truncate_for_debug(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Ordered key/value diagnostics for one failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugContext {
    #[serde(flatten)]
    entries: IndexMap<String, Value>,
    #[serde(skip)]
    max_value_length: usize,
}

impl DebugContext {
    /// Create an empty bag with the default value length limit
    pub fn new() -> Self {
        Self::with_max_value_length(MAX_DEBUG_VALUE_LENGTH)
    }

    /// Create an empty bag with a custom value length limit
    pub fn with_max_value_length(max_value_length: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            max_value_length,
        }
    }

    /// Insert an entry; long strings and serialized structures are truncated
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let value = match value.into() {
            Value::String(s) => Value::String(truncate_for_debug(&s, self.max_value_length)),
            structured @ (Value::Array(_) | Value::Object(_)) => {
                let rendered = structured.to_string();
                if rendered.chars().count() > self.max_value_length {
                    Value::String(truncate_for_debug(&rendered, self.max_value_length))
                } else {
                    structured
                }
            }
            other => other,
        };
        self.entries.insert(key.into(), value);
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy entries from `other` that are not already present
    pub fn merge(&mut self, other: &DebugContext) {
        for (key, value) in other.iter() {
            if !self.entries.contains_key(key) {
                self.entries.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.entries.clone().into_iter().collect())
    }
}

impl Default for DebugContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DebugContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.entries {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            match value {
                Value::String(s) => write!(f, "{}={}", key, s)?,
                other => write!(f, "{}={}", key, other)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate_for_debug("short", 10), "short");
        assert_eq!(truncate_for_debug("abcdefghijkl", 8), "abcde...");
        // Multi-byte characters are never split
        assert_eq!(truncate_for_debug("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_insert_truncates_long_values() {
        let ctx = DebugContext::with_max_value_length(10)
            .with("schemaKey", "objectPathLookupInteger")
            .with("count", 12)
            .with("payload", json!({ "a": "bbbbbbbbbbbbbbbbbbbb" }));

        assert_eq!(ctx.get("schemaKey").unwrap(), "objectP...");
        assert_eq!(ctx.get("count").unwrap(), 12);
        assert!(ctx.get("payload").unwrap().is_string());
    }

    #[test]
    fn test_merge_keeps_existing_entries() {
        let mut ctx = DebugContext::new().with("path", "/context/quote");
        ctx.merge(&DebugContext::new().with("path", "other").with("tenantId", "t-1"));
        assert_eq!(ctx.get("path").unwrap(), "/context/quote");
        assert_eq!(ctx.get("tenantId").unwrap(), "t-1");
        assert_eq!(ctx.to_string(), "path=/context/quote, tenantId=t-1");
    }
}
