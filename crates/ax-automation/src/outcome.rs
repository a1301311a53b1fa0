//! Recoverable outcome of a lookup
//!
//! Path lookups never raise for a missing or null value. They hand an
//! [`Outcome`] to the fallback chain, which decides between substitution
//! and escalation.

use ax_core::DebugContext;
use serde_json::Value;

use crate::data::{json_type_name, ValueKind};
use crate::error::ErrorKind;

/// Why a lookup or conversion did not produce a value
#[derive(Debug, Clone, PartialEq)]
pub struct FailureInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub details: DebugContext,
}

impl FailureInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>, details: DebugContext) -> Self {
        Self {
            kind,
            message: message.into(),
            details,
        }
    }

    pub fn path_not_found(path: &str, details: DebugContext) -> Self {
        Self::new(
            ErrorKind::PathNotFound,
            format!("path '{}' was not found", path),
            details.with("path", path),
        )
    }

    pub fn null_value(path: &str, details: DebugContext) -> Self {
        Self::new(
            ErrorKind::NullValue,
            format!("value at '{}' was null", path),
            details.with("path", path),
        )
    }

    /// `value` is recorded truncated in the details
    pub fn type_mismatch(value: &Value, target: ValueKind, details: DebugContext) -> Self {
        let observed = json_type_name(value);
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self::new(
            ErrorKind::TypeMismatch,
            format!("cannot convert {} value to {}", observed, target),
            details
                .with("observedType", observed)
                .with("targetType", target.as_str())
                .with("value", rendered),
        )
    }
}

/// Success or recoverable failure
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure(FailureInfo),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(info) => Some(info.kind),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(info) => Outcome::Failure(info),
        }
    }

    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_mismatch_truncates_value() {
        let long = "x".repeat(200);
        let info =
            FailureInfo::type_mismatch(&json!(long), ValueKind::Integer, DebugContext::new());
        let recorded = info.details.get("value").and_then(Value::as_str).unwrap();
        assert_eq!(recorded.chars().count(), 80);
        assert!(recorded.ends_with("..."));
        assert_eq!(info.details.get("observedType").unwrap(), "text");
    }

    #[test]
    fn test_outcome_map() {
        let outcome: Outcome<i64> = Outcome::Success(2);
        assert_eq!(outcome.map(|v| v * 2).success(), Some(4));

        let failed: Outcome<i64> =
            Outcome::Failure(FailureInfo::null_value("/context/x", DebugContext::new()));
        assert_eq!(failed.failure_kind(), Some(ErrorKind::NullValue));
    }
}
