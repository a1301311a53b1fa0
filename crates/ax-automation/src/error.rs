//! Error types for decoding and resolving providers

use ax_core::DebugContext;
use ax_service_registry::QueryError;
use std::fmt;
use thiserror::Error;

use crate::data::ValueKind;
use crate::outcome::FailureInfo;

/// Result type for configuration decoding
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Recognised failure kinds, shared by [`ProviderError`], [`DecodeError`] and [`FailureInfo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PathNotFound,
    NullValue,
    TypeMismatch,
    MissingRequiredParameter,
    ServiceProviderNotFound,
    ConfigurationDecoding,
    QueryFailed,
    Cancelled,
}

impl ErrorKind {
    /// Stable machine code surfaced to automation authors
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::PathNotFound => "path_not_found",
            ErrorKind::NullValue => "null_value",
            ErrorKind::TypeMismatch => "type_mismatch",
            ErrorKind::MissingRequiredParameter => "missing_required_parameter",
            ErrorKind::ServiceProviderNotFound => "service_provider_not_found",
            ErrorKind::ConfigurationDecoding => "configuration_decoding_error",
            ErrorKind::QueryFailed => "query_failed",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Hard failure escaping `Provider::resolve`
///
/// Each variant carries the diagnostic bag accumulated for the failing node.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("path '{path}' was not found ({schema_key}) [{debug}]")]
    PathNotFound {
        schema_key: &'static str,
        path: String,
        debug: DebugContext,
    },

    #[error("value at '{path}' was null ({schema_key}) [{debug}]")]
    NullValue {
        schema_key: &'static str,
        path: String,
        debug: DebugContext,
    },

    #[error("cannot convert {observed_type} value to {target_type} ({schema_key}) [{debug}]")]
    TypeMismatch {
        schema_key: &'static str,
        observed_type: String,
        target_type: &'static str,
        debug: DebugContext,
    },

    #[error("missing required parameter '{parameter}' ({schema_key}) [{debug}]")]
    MissingRequiredParameter {
        schema_key: &'static str,
        parameter: String,
        debug: DebugContext,
    },

    #[error("no {service} is available to this automation run [{debug}]")]
    ServiceProviderNotFound { service: String, debug: DebugContext },

    #[error("invalid provider configuration ({schema_key}): {message} [{debug}]")]
    Configuration {
        schema_key: &'static str,
        message: String,
        debug: DebugContext,
    },

    #[error("query failed ({schema_key}): {source} [{debug}]")]
    Query {
        schema_key: &'static str,
        #[source]
        source: QueryError,
        debug: DebugContext,
    },

    #[error("automation run was cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::PathNotFound { .. } => ErrorKind::PathNotFound,
            ProviderError::NullValue { .. } => ErrorKind::NullValue,
            ProviderError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            ProviderError::MissingRequiredParameter { .. } => ErrorKind::MissingRequiredParameter,
            ProviderError::ServiceProviderNotFound { .. } => ErrorKind::ServiceProviderNotFound,
            ProviderError::Configuration { .. } => ErrorKind::ConfigurationDecoding,
            ProviderError::Query { .. } => ErrorKind::QueryFailed,
            ProviderError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Diagnostics attached to this failure, if any
    pub fn debug_context(&self) -> Option<&DebugContext> {
        match self {
            ProviderError::PathNotFound { debug, .. }
            | ProviderError::NullValue { debug, .. }
            | ProviderError::TypeMismatch { debug, .. }
            | ProviderError::MissingRequiredParameter { debug, .. }
            | ProviderError::ServiceProviderNotFound { debug, .. }
            | ProviderError::Configuration { debug, .. }
            | ProviderError::Query { debug, .. } => Some(debug),
            ProviderError::Cancelled => None,
        }
    }

    /// Escalate a recoverable failure into a hard error for `schema_key`
    pub fn from_failure(failure: FailureInfo, schema_key: &'static str) -> Self {
        let FailureInfo {
            kind,
            message,
            details,
        } = failure;
        let path = details
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        match kind {
            ErrorKind::NullValue => ProviderError::NullValue {
                schema_key,
                path,
                debug: details,
            },
            ErrorKind::TypeMismatch => {
                let observed_type = details
                    .get("observedType")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                let target_type = ValueKind::from_name(
                    details
                        .get("targetType")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default(),
                )
                .map(|kind| kind.as_str())
                .unwrap_or("unknown");
                ProviderError::TypeMismatch {
                    schema_key,
                    observed_type,
                    target_type,
                    debug: details,
                }
            }
            ErrorKind::MissingRequiredParameter => ProviderError::MissingRequiredParameter {
                schema_key,
                parameter: message,
                debug: details,
            },
            ErrorKind::PathNotFound => ProviderError::PathNotFound {
                schema_key,
                path,
                debug: details,
            },
            ErrorKind::ServiceProviderNotFound => ProviderError::ServiceProviderNotFound {
                service: details
                    .get("service")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or(message),
                debug: details,
            },
            ErrorKind::ConfigurationDecoding => ProviderError::Configuration {
                schema_key,
                message,
                debug: details,
            },
            ErrorKind::QueryFailed => ProviderError::Query {
                schema_key,
                source: QueryError::Failed(message),
                debug: details,
            },
            ErrorKind::Cancelled => ProviderError::Cancelled,
        }
    }
}

/// Configuration could not be decoded into a builder tree
///
/// `pointer` is the JSON pointer of the offending node within the decoded document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{pointer}: no provider is registered for '{key}'")]
    UnknownProvider { pointer: String, key: String },

    #[error("{pointer}: a provider node must have exactly one property, found {count}")]
    InvalidNode { pointer: String, count: usize },

    #[error("{pointer}: '{key}' produces {found} but {expected} is required")]
    KindMismatch {
        pointer: String,
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("{pointer}: literal {value} cannot be used as {expected}")]
    InvalidLiteral {
        pointer: String,
        expected: ValueKind,
        value: String,
    },

    #[error("{pointer}: missing required property '{property}'")]
    MissingProperty { pointer: String, property: String },

    #[error("{pointer}: unknown property '{property}'")]
    UnknownProperty { pointer: String, property: String },

    #[error("{pointer}: expected {expected}")]
    InvalidShape { pointer: String, expected: String },

    #[error("{pointer}: {reason}")]
    InvalidValue { pointer: String, reason: String },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ConfigurationDecoding
    }

    /// JSON pointer of the node that failed to decode
    pub fn pointer(&self) -> &str {
        match self {
            DecodeError::UnknownProvider { pointer, .. }
            | DecodeError::InvalidNode { pointer, .. }
            | DecodeError::KindMismatch { pointer, .. }
            | DecodeError::InvalidLiteral { pointer, .. }
            | DecodeError::MissingProperty { pointer, .. }
            | DecodeError::UnknownProperty { pointer, .. }
            | DecodeError::InvalidShape { pointer, .. }
            | DecodeError::InvalidValue { pointer, .. } => pointer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_failure_keeps_path_and_kind() {
        let failure = FailureInfo::path_not_found(
            "/context/quote/total",
            DebugContext::new().with("tenantId", "t-1"),
        );
        let error = ProviderError::from_failure(failure, "objectPathLookupInteger");

        assert_eq!(error.kind(), ErrorKind::PathNotFound);
        match &error {
            ProviderError::PathNotFound {
                path, schema_key, ..
            } => {
                assert_eq!(path, "/context/quote/total");
                assert_eq!(*schema_key, "objectPathLookupInteger");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(
            error.debug_context().unwrap().get("tenantId").unwrap(),
            "t-1"
        );
    }

    #[test]
    fn test_from_failure_keeps_every_kind() {
        for kind in [
            ErrorKind::PathNotFound,
            ErrorKind::NullValue,
            ErrorKind::TypeMismatch,
            ErrorKind::MissingRequiredParameter,
            ErrorKind::ServiceProviderNotFound,
            ErrorKind::ConfigurationDecoding,
            ErrorKind::QueryFailed,
            ErrorKind::Cancelled,
        ] {
            let failure = FailureInfo::new(kind, "failed", DebugContext::new());
            let error = ProviderError::from_failure(failure, "queryResultObject");
            assert_eq!(error.kind(), kind);
        }
    }

    #[test]
    fn test_from_failure_service_name() {
        let failure = FailureInfo::new(
            ErrorKind::ServiceProviderNotFound,
            "unavailable",
            DebugContext::new().with("service", "query mediator"),
        );
        match ProviderError::from_failure(failure, "queryResultObject") {
            ProviderError::ServiceProviderNotFound { service, .. } => {
                assert_eq!(service, "query mediator")
            }
            other => panic!("unexpected error {other:?}"),
        }

        let failure = FailureInfo::new(
            ErrorKind::QueryFailed,
            "backend offline",
            DebugContext::new(),
        );
        match ProviderError::from_failure(failure, "queryResultObject") {
            ProviderError::Query { source, .. } => {
                assert_eq!(source, QueryError::Failed("backend offline".to_string()))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_type_mismatch_message() {
        let failure = FailureInfo::type_mismatch(
            &serde_json::json!(true),
            ValueKind::Integer,
            DebugContext::new(),
        );
        let error = ProviderError::from_failure(failure, "valueToInteger");
        assert_eq!(error.kind(), ErrorKind::TypeMismatch);
        assert!(error
            .to_string()
            .starts_with("cannot convert boolean value to integer (valueToInteger)"));
    }
}
