//! The fallback chain shared by every lookup-and-coerce provider
//!
//! Four ordered stages turn a raw lookup outcome into a typed value:
//!
//! 1. not found: raise, else `valueIfNotFound`, else `defaultValue`, else null
//! 2. null: raise, else `valueIfNull`, else `defaultValue`, else success(null).
//!    A substitute that is itself null is a terminal success(null).
//! 3. coercion to the target type: raise, else one attempt at coercing
//!    `valueIfTypeMismatch` (or `defaultValue`), else success(null)
//! 4. success
//!
//! Raise flags always win over substitutes.

use ax_service_registry::ServiceLocator;
use serde_json::{Map, Value};
use tracing::debug;

use crate::context::ProviderContext;
use crate::data::{Data, DataType};
use crate::decoder::ConfigDecoder;
use crate::error::{DecodeResult, ErrorKind, ProviderError};
use crate::outcome::{FailureInfo, Outcome};
use crate::provider::{build_optional, resolve_flag, ArcBuilder, ArcProvider, ProviderResult};

pub const VALUE_IF_NOT_FOUND: &str = "valueIfNotFound";
pub const RAISE_ERROR_IF_NOT_FOUND: &str = "raiseErrorIfNotFound";
pub const VALUE_IF_NULL: &str = "valueIfNull";
pub const RAISE_ERROR_IF_NULL: &str = "raiseErrorIfNull";
pub const VALUE_IF_TYPE_MISMATCH: &str = "valueIfTypeMismatch";
pub const RAISE_ERROR_IF_TYPE_MISMATCH: &str = "raiseErrorIfTypeMismatch";
pub const DEFAULT_VALUE: &str = "defaultValue";

/// Every fallback property a lookup node accepts
pub const FALLBACK_PROPERTIES: [&str; 7] = [
    VALUE_IF_NOT_FOUND,
    RAISE_ERROR_IF_NOT_FOUND,
    VALUE_IF_NULL,
    RAISE_ERROR_IF_NULL,
    VALUE_IF_TYPE_MISMATCH,
    RAISE_ERROR_IF_TYPE_MISMATCH,
    DEFAULT_VALUE,
];

/// Fallback properties accepted by conversion nodes
pub const CONVERSION_FALLBACK_PROPERTIES: [&str; 2] =
    [VALUE_IF_TYPE_MISMATCH, RAISE_ERROR_IF_TYPE_MISMATCH];

/// What an unset raise flag means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FallbackDefaults {
    pub raise_if_not_found: bool,
    pub raise_if_null: bool,
    /// Only applies while no `valueIfTypeMismatch` is configured
    pub raise_if_type_mismatch: bool,
}

impl FallbackDefaults {
    /// Path lookups never raise unless asked to
    pub const LOOKUP: FallbackDefaults = FallbackDefaults {
        raise_if_not_found: false,
        raise_if_null: false,
        raise_if_type_mismatch: false,
    };

    /// Conversions raise on a value they cannot convert
    pub const CONVERSION: FallbackDefaults = FallbackDefaults {
        raise_if_not_found: false,
        raise_if_null: false,
        raise_if_type_mismatch: true,
    };
}

/// Decoded fallback properties
///
/// Substitutes are decoded as object builders so their output goes through
/// the same coercion as a looked-up value.
#[derive(Debug, Clone, Default)]
pub struct FallbackBuilders {
    pub value_if_not_found: Option<ArcBuilder<Value>>,
    pub raise_error_if_not_found: Option<ArcBuilder<bool>>,
    pub value_if_null: Option<ArcBuilder<Value>>,
    pub raise_error_if_null: Option<ArcBuilder<bool>>,
    pub value_if_type_mismatch: Option<ArcBuilder<Value>>,
    pub raise_error_if_type_mismatch: Option<ArcBuilder<bool>>,
    pub default_value: Option<ArcBuilder<Value>>,
}

impl FallbackBuilders {
    /// Decode whichever fallback properties are present in a node body
    pub fn decode(
        decoder: &ConfigDecoder<'_>,
        body: &Map<String, Value>,
        pointer: &str,
    ) -> DecodeResult<Self> {
        Ok(Self {
            value_if_not_found: decoder.optional(body, VALUE_IF_NOT_FOUND, pointer)?,
            raise_error_if_not_found: decoder.optional(body, RAISE_ERROR_IF_NOT_FOUND, pointer)?,
            value_if_null: decoder.optional(body, VALUE_IF_NULL, pointer)?,
            raise_error_if_null: decoder.optional(body, RAISE_ERROR_IF_NULL, pointer)?,
            value_if_type_mismatch: decoder.optional(body, VALUE_IF_TYPE_MISMATCH, pointer)?,
            raise_error_if_type_mismatch: decoder.optional(
                body,
                RAISE_ERROR_IF_TYPE_MISMATCH,
                pointer,
            )?,
            default_value: decoder.optional(body, DEFAULT_VALUE, pointer)?,
        })
    }

    pub fn build(&self, services: &ServiceLocator, defaults: FallbackDefaults) -> FallbackChain {
        FallbackChain {
            value_if_not_found: build_optional(self.value_if_not_found.as_ref(), services),
            raise_error_if_not_found: build_optional(
                self.raise_error_if_not_found.as_ref(),
                services,
            ),
            value_if_null: build_optional(self.value_if_null.as_ref(), services),
            raise_error_if_null: build_optional(self.raise_error_if_null.as_ref(), services),
            value_if_type_mismatch: build_optional(self.value_if_type_mismatch.as_ref(), services),
            raise_error_if_type_mismatch: build_optional(
                self.raise_error_if_type_mismatch.as_ref(),
                services,
            ),
            default_value: build_optional(self.default_value.as_ref(), services),
            defaults,
        }
    }
}

/// Built fallback sub-providers plus their defaults
#[derive(Debug, Clone, Default)]
pub struct FallbackChain {
    value_if_not_found: Option<ArcProvider<Value>>,
    raise_error_if_not_found: Option<ArcProvider<bool>>,
    value_if_null: Option<ArcProvider<Value>>,
    raise_error_if_null: Option<ArcProvider<bool>>,
    value_if_type_mismatch: Option<ArcProvider<Value>>,
    raise_error_if_type_mismatch: Option<ArcProvider<bool>>,
    default_value: Option<ArcProvider<Value>>,
    defaults: FallbackDefaults,
}

/// Which substitute produced the candidate, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Lookup,
    Default,
}

impl FallbackChain {
    /// A chain with no substitutes
    pub fn new(defaults: FallbackDefaults) -> Self {
        Self {
            defaults,
            ..Self::default()
        }
    }

    /// Turn a raw lookup outcome into a typed result
    ///
    /// `path` is reported in diagnostics; conversions pass `None`.
    pub async fn resolve<T: DataType>(
        &self,
        ctx: &ProviderContext,
        schema_key: &'static str,
        path: Option<&str>,
        outcome: Outcome<Value>,
    ) -> ProviderResult<T> {
        let (candidate, source) = match outcome {
            Outcome::Success(value) => (value, Source::Lookup),
            Outcome::Failure(info) if info.kind == ErrorKind::PathNotFound => {
                self.not_found_stage(ctx, schema_key, path, info).await?
            }
            Outcome::Failure(info) => return Err(ProviderError::from_failure(info, schema_key)),
        };

        let candidate = match self.null_stage(ctx, schema_key, path, candidate, source).await? {
            Some(candidate) => candidate,
            None => return Ok(None),
        };

        self.coercion_stage(ctx, schema_key, path, candidate).await
    }

    async fn not_found_stage(
        &self,
        ctx: &ProviderContext,
        schema_key: &'static str,
        path: Option<&str>,
        info: FailureInfo,
    ) -> Result<(Value, Source), ProviderError> {
        let raise = resolve_flag(
            self.raise_error_if_not_found.as_ref(),
            ctx,
            self.defaults.raise_if_not_found,
        )
        .await?;
        if raise {
            return Err(ProviderError::from_failure(info, schema_key));
        }
        if let Some(substitute) = &self.value_if_not_found {
            self.note(ctx, schema_key, path, "valueIfNotFound used");
            return Ok((resolve_value(substitute, ctx).await?, Source::Lookup));
        }
        if let Some(default) = &self.default_value {
            self.note(ctx, schema_key, path, "defaultValue used for missing path");
            return Ok((resolve_value(default, ctx).await?, Source::Default));
        }
        Ok((Value::Null, Source::Lookup))
    }

    /// `None` means the final result is success(null)
    async fn null_stage(
        &self,
        ctx: &ProviderContext,
        schema_key: &'static str,
        path: Option<&str>,
        candidate: Value,
        source: Source,
    ) -> Result<Option<Value>, ProviderError> {
        if !candidate.is_null() {
            return Ok(Some(candidate));
        }
        let raise = resolve_flag(
            self.raise_error_if_null.as_ref(),
            ctx,
            self.defaults.raise_if_null,
        )
        .await?;
        if raise {
            let info =
                FailureInfo::null_value(path.unwrap_or_default(), ctx.debug_context(schema_key));
            return Err(ProviderError::from_failure(info, schema_key));
        }

        let substitute = if let Some(substitute) = &self.value_if_null {
            self.note(ctx, schema_key, path, "valueIfNull used");
            resolve_value(substitute, ctx).await?
        } else if let (Some(default), Source::Lookup) = (&self.default_value, source) {
            self.note(ctx, schema_key, path, "defaultValue used for null");
            resolve_value(default, ctx).await?
        } else {
            return Ok(None);
        };

        // A null substitute is terminal; it is not substituted again
        if substitute.is_null() {
            Ok(None)
        } else {
            Ok(Some(substitute))
        }
    }

    async fn coercion_stage<T: DataType>(
        &self,
        ctx: &ProviderContext,
        schema_key: &'static str,
        path: Option<&str>,
        candidate: Value,
    ) -> ProviderResult<T> {
        if let Some(value) = T::coerce(&candidate) {
            return Ok(Some(Data::new(value)));
        }

        let default_raise =
            self.defaults.raise_if_type_mismatch && self.value_if_type_mismatch.is_none();
        let raise = resolve_flag(self.raise_error_if_type_mismatch.as_ref(), ctx, default_raise)
            .await?;
        if raise {
            return Err(type_mismatch::<T>(ctx, schema_key, path, &candidate));
        }

        let substitute = if let Some(substitute) = &self.value_if_type_mismatch {
            self.note(ctx, schema_key, path, "valueIfTypeMismatch used");
            resolve_value(substitute, ctx).await?
        } else if let Some(default) = &self.default_value {
            self.note(ctx, schema_key, path, "defaultValue used for type mismatch");
            resolve_value(default, ctx).await?
        } else {
            return Ok(None);
        };

        // Exactly one substitution attempt
        if substitute.is_null() {
            return Ok(None);
        }
        match T::coerce(&substitute) {
            Some(value) => Ok(Some(Data::new(value))),
            None => Err(type_mismatch::<T>(ctx, schema_key, path, &substitute)),
        }
    }

    fn note(
        &self,
        ctx: &ProviderContext,
        schema_key: &'static str,
        path: Option<&str>,
        decision: &str,
    ) {
        debug!(schema_key, path = path.unwrap_or_default(), decision, "Fallback applied");
        ctx.record(schema_key, path, decision);
    }
}

async fn resolve_value(
    provider: &ArcProvider<Value>,
    ctx: &ProviderContext,
) -> Result<Value, ProviderError> {
    Ok(provider
        .resolve(ctx)
        .await?
        .map(Data::into_inner)
        .unwrap_or(Value::Null))
}

fn type_mismatch<T: DataType>(
    ctx: &ProviderContext,
    schema_key: &'static str,
    path: Option<&str>,
    value: &Value,
) -> ProviderError {
    let mut debug = ctx.debug_context(schema_key);
    if let Some(path) = path {
        debug.insert("path", path);
    }
    ProviderError::from_failure(FailureInfo::type_mismatch(value, T::KIND, debug), schema_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::static_value::StaticProvider;
    use ax_core::{AutomationData, DebugContext, DeploymentEnvironment};
    use serde_json::json;
    use std::sync::Arc;

    fn ctx() -> ProviderContext {
        ProviderContext::new(AutomationData::new("t-1", DeploymentEnvironment::Development))
    }

    fn missing() -> Outcome<Value> {
        Outcome::Failure(FailureInfo::path_not_found("context.x", DebugContext::new()))
    }

    fn value(v: Value) -> Option<ArcProvider<Value>> {
        Some(Arc::new(StaticProvider::new(Some(v))))
    }

    fn flag(v: bool) -> Option<ArcProvider<bool>> {
        Some(Arc::new(StaticProvider::new(Some(v))))
    }

    #[tokio::test]
    async fn test_missing_path_without_fallbacks_is_null() {
        let chain = FallbackChain::new(FallbackDefaults::LOOKUP);
        let result = chain
            .resolve::<i64>(&ctx(), "objectPathLookupInteger", Some("context.x"), missing())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_raise_wins_over_substitute() {
        let chain = FallbackChain {
            raise_error_if_not_found: flag(true),
            value_if_not_found: value(json!(5)),
            ..FallbackChain::new(FallbackDefaults::LOOKUP)
        };
        let err = chain
            .resolve::<i64>(&ctx(), "objectPathLookupInteger", Some("context.x"), missing())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathNotFound);
    }

    #[tokio::test]
    async fn test_not_found_substitute_is_coerced() {
        let chain = FallbackChain {
            value_if_not_found: value(json!("42")),
            ..FallbackChain::new(FallbackDefaults::LOOKUP)
        };
        let ctx = ctx();
        let result = chain
            .resolve::<i64>(&ctx, "objectPathLookupInteger", Some("context.x"), missing())
            .await
            .unwrap();
        assert_eq!(result.map(Data::into_inner), Some(42));
        assert_eq!(ctx.trace()[0].decision, "valueIfNotFound used");
    }

    #[tokio::test]
    async fn test_null_substitute_is_terminal() {
        let chain = FallbackChain {
            value_if_null: value(Value::Null),
            default_value: value(json!(1)),
            ..FallbackChain::new(FallbackDefaults::LOOKUP)
        };
        let result = chain
            .resolve::<i64>(&ctx(), "k", Some("context.x"), Outcome::Success(Value::Null))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_single_type_mismatch_substitution() {
        let chain = FallbackChain {
            value_if_type_mismatch: value(json!("still not a number")),
            ..FallbackChain::new(FallbackDefaults::LOOKUP)
        };
        let err = chain
            .resolve::<i64>(&ctx(), "k", Some("context.x"), Outcome::Success(json!(true)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[tokio::test]
    async fn test_conversion_defaults() {
        let chain = FallbackChain::new(FallbackDefaults::CONVERSION);
        let err = chain
            .resolve::<i64>(&ctx(), "valueToInteger", None, Outcome::Success(json!(true)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        let chain = FallbackChain {
            value_if_type_mismatch: value(json!(7)),
            ..FallbackChain::new(FallbackDefaults::CONVERSION)
        };
        let result = chain
            .resolve::<i64>(&ctx(), "valueToInteger", None, Outcome::Success(json!(true)))
            .await
            .unwrap();
        assert_eq!(result.map(Data::into_inner), Some(7));
    }
}
