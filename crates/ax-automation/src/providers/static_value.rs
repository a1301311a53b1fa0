//! Literal values
//!
//! Bare JSON literals in configuration are promoted to these, and each
//! family also has an explicit key (`{"staticInteger": 5}`).

use async_trait::async_trait;
use ax_service_registry::ServiceLocator;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::context::ProviderContext;
use crate::data::{Data, DataType, ValueKind};
use crate::decoder::{BuilderRegistry, ConfigDecoder};
use crate::error::{DecodeError, DecodeResult};
use crate::provider::{ArcBuilder, ArcProvider, Builder, Provider, ProviderResult};

/// Schema key of the literal provider for a value family
pub fn static_schema_key(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Text => "staticText",
        ValueKind::Integer => "staticInteger",
        ValueKind::Number => "staticNumber",
        ValueKind::Boolean => "staticBoolean",
        ValueKind::DateTime => "staticDateTime",
        ValueKind::Date => "staticDate",
        ValueKind::Time => "staticTime",
        ValueKind::List => "staticList",
        ValueKind::Object => "staticObject",
        ValueKind::Entity => "staticEntity",
    }
}

/// Builds a provider that always yields the same value
#[derive(Debug, Clone)]
pub struct StaticBuilder<T> {
    value: Option<T>,
}

impl<T: DataType> StaticBuilder<T> {
    pub fn new(value: T) -> Self {
        Self { value: Some(value) }
    }

    /// Always resolves to null
    pub fn null() -> Self {
        Self { value: None }
    }
}

impl<T: DataType> Builder<T> for StaticBuilder<T> {
    fn build(&self, _services: &ServiceLocator) -> ArcProvider<T> {
        Arc::new(StaticProvider::new(self.value.clone()))
    }
}

#[derive(Debug)]
pub struct StaticProvider<T> {
    value: Option<T>,
}

impl<T: DataType> StaticProvider<T> {
    pub fn new(value: Option<T>) -> Self {
        Self { value }
    }
}

#[async_trait]
impl<T: DataType> Provider<T> for StaticProvider<T> {
    async fn resolve(&self, _ctx: &ProviderContext) -> ProviderResult<T> {
        Ok(self.value.clone().map(Data::new))
    }

    fn schema_reference_key(&self) -> &'static str {
        static_schema_key(T::KIND)
    }
}

fn decode_literal<T: DataType>(
    body: &Value,
    _decoder: &ConfigDecoder<'_>,
    pointer: &str,
) -> DecodeResult<ArcBuilder<T>> {
    if body.is_null() {
        return Ok(Arc::new(StaticBuilder::<T>::null()));
    }
    match T::from_literal(body) {
        Some(value) => Ok(Arc::new(StaticBuilder::new(value))),
        None => Err(DecodeError::InvalidLiteral {
            pointer: pointer.to_string(),
            expected: T::KIND,
            value: body.to_string(),
        }),
    }
}

pub(crate) fn register(registry: &mut BuilderRegistry) {
    registry.register_typed(static_schema_key(ValueKind::Text), decode_literal::<String>);
    registry.register_typed(static_schema_key(ValueKind::Integer), decode_literal::<i64>);
    registry.register_typed(static_schema_key(ValueKind::Number), decode_literal::<f64>);
    registry.register_typed(static_schema_key(ValueKind::Boolean), decode_literal::<bool>);
    registry.register_typed(
        static_schema_key(ValueKind::DateTime),
        decode_literal::<DateTime<Utc>>,
    );
    registry.register_typed(static_schema_key(ValueKind::Date), decode_literal::<NaiveDate>);
    registry.register_typed(static_schema_key(ValueKind::Time), decode_literal::<NaiveTime>);
    registry.register_typed(static_schema_key(ValueKind::List), decode_literal::<Vec<Value>>);
    registry.register_typed(static_schema_key(ValueKind::Object), decode_literal::<Value>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_core::{AutomationData, DeploymentEnvironment};
    use serde_json::json;

    #[tokio::test]
    async fn test_explicit_static_nodes() {
        let registry = BuilderRegistry::with_defaults();
        let decoder = ConfigDecoder::new(&registry);
        let ctx =
            ProviderContext::new(AutomationData::new("t", DeploymentEnvironment::Development));
        let services = ServiceLocator::new();

        let builder = decoder
            .decode::<Value>(&json!({"staticObject": {"a": [1, 2]}}), "")
            .unwrap();
        let provider = builder.build(&services);
        assert_eq!(provider.schema_reference_key(), "staticObject");
        let value = provider.resolve(&ctx).await.unwrap().unwrap();
        assert_eq!(value.into_inner(), json!({"a": [1, 2]}));

        let builder = decoder
            .decode::<NaiveDate>(&json!({"staticDate": "2024-05-01"}), "")
            .unwrap();
        let value = builder.build(&services).resolve(&ctx).await.unwrap().unwrap();
        assert_eq!(*value.value(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());

        let err = decoder
            .decode::<i64>(&json!({"staticInteger": {"a": 1}}), "/n")
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidLiteral { ref pointer, .. } if pointer == "/n/staticInteger"
        ));
    }
}
