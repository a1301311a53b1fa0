//! `objectPathLookup*` providers
//!
//! Look a path up in the run context (or in an explicit `dataObject`) and
//! pass the raw outcome through the fallback chain for the target family.
//!
//! ```json
//! {"objectPathLookupInteger": "context.quote.total"}
//! {"objectPathLookupInteger": {"path": "/context/quote/total", "defaultValue": 0}}
//! ```

use async_trait::async_trait;
use ax_service_registry::ServiceLocator;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::ProviderContext;
use crate::data::{DataType, EntityValue, ValueKind};
use crate::decoder::{BuilderRegistry, ConfigDecoder};
use crate::error::{DecodeError, DecodeResult};
use crate::fallback::{FallbackBuilders, FallbackChain, FallbackDefaults, FALLBACK_PROPERTIES};
use crate::path::{ObjectPathLookup, PathExpression};
use crate::provider::{
    build_optional, resolve_optional, resolve_required, ArcBuilder, ArcProvider, Builder,
    Provider, ProviderResult,
};
use crate::providers::static_value::StaticBuilder;

const PATH: &str = "path";
const DATA_OBJECT: &str = "dataObject";

/// Schema key of the path lookup for a value family
pub fn lookup_schema_key(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Text => "objectPathLookupText",
        ValueKind::Integer => "objectPathLookupInteger",
        ValueKind::Number => "objectPathLookupNumber",
        ValueKind::Boolean => "objectPathLookupBoolean",
        ValueKind::DateTime => "objectPathLookupDateTime",
        ValueKind::Date => "objectPathLookupDate",
        ValueKind::Time => "objectPathLookupTime",
        ValueKind::List => "objectPathLookupList",
        ValueKind::Object => "objectPathLookupObject",
        ValueKind::Entity => "objectPathLookupEntity",
    }
}

#[derive(Debug)]
pub struct PathLookupBuilder<T> {
    path: ArcBuilder<String>,
    data_object: Option<ArcBuilder<Value>>,
    fallbacks: FallbackBuilders,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DataType> PathLookupBuilder<T> {
    pub fn new(path: ArcBuilder<String>) -> Self {
        Self {
            path,
            data_object: None,
            fallbacks: FallbackBuilders::default(),
            _marker: PhantomData,
        }
    }

    pub fn decode(
        body: &Value,
        decoder: &ConfigDecoder<'_>,
        pointer: &str,
    ) -> DecodeResult<ArcBuilder<T>> {
        if let Value::String(path) = body {
            decoder.record_path(path);
            let path: ArcBuilder<String> = Arc::new(StaticBuilder::new(path.clone()));
            return Ok(Arc::new(Self::new(path)));
        }
        if !body.is_object() {
            return Err(DecodeError::InvalidShape {
                pointer: pointer.to_string(),
                expected: "a path string or an object with a 'path' property".to_string(),
            });
        }

        let mut allowed = vec![PATH, DATA_OBJECT];
        allowed.extend_from_slice(&FALLBACK_PROPERTIES);
        let map = decoder.expect_object(body, pointer, &allowed)?;

        let path = decoder.required::<String>(map, PATH, pointer)?;
        let data_object = decoder.optional::<Value>(map, DATA_OBJECT, pointer)?;
        // Paths into an explicit data object say nothing about context entities
        if let (Some(Value::String(literal)), None) = (map.get(PATH), &data_object) {
            decoder.record_path(literal);
        }

        Ok(Arc::new(Self {
            path,
            data_object,
            fallbacks: FallbackBuilders::decode(decoder, map, pointer)?,
            _marker: PhantomData,
        }))
    }
}

impl<T: DataType> Builder<T> for PathLookupBuilder<T> {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<T> {
        Arc::new(PathLookupProvider::<T> {
            path: self.path.build(services),
            data_object: build_optional(self.data_object.as_ref(), services),
            chain: self.fallbacks.build(services, FallbackDefaults::LOOKUP),
            _marker: PhantomData,
        })
    }
}

#[derive(Debug)]
pub struct PathLookupProvider<T> {
    path: ArcProvider<String>,
    data_object: Option<ArcProvider<Value>>,
    chain: FallbackChain,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: DataType> Provider<T> for PathLookupProvider<T> {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<T> {
        let schema_key = self.schema_reference_key();
        let path = resolve_required(&self.path, ctx, schema_key, PATH).await?;
        let expression = PathExpression::parse(&path);

        let outcome = match &self.data_object {
            Some(data_object) => {
                let data = resolve_optional(Some(data_object), ctx)
                    .await?
                    .unwrap_or(Value::Null);
                ObjectPathLookup::lookup_in(ctx, &data, &expression, schema_key)
            }
            None => ObjectPathLookup::lookup(ctx, &expression, schema_key).await?,
        };

        self.chain
            .resolve::<T>(ctx, schema_key, Some(expression.as_str()), outcome)
            .await
    }

    fn schema_reference_key(&self) -> &'static str {
        lookup_schema_key(T::KIND)
    }
}

pub(crate) fn register(registry: &mut BuilderRegistry) {
    registry.register_typed(
        lookup_schema_key(ValueKind::Text),
        PathLookupBuilder::<String>::decode,
    );
    registry.register_typed(
        lookup_schema_key(ValueKind::Integer),
        PathLookupBuilder::<i64>::decode,
    );
    registry.register_typed(
        lookup_schema_key(ValueKind::Number),
        PathLookupBuilder::<f64>::decode,
    );
    registry.register_typed(
        lookup_schema_key(ValueKind::Boolean),
        PathLookupBuilder::<bool>::decode,
    );
    registry.register_typed(
        lookup_schema_key(ValueKind::DateTime),
        PathLookupBuilder::<DateTime<Utc>>::decode,
    );
    registry.register_typed(
        lookup_schema_key(ValueKind::Date),
        PathLookupBuilder::<NaiveDate>::decode,
    );
    registry.register_typed(
        lookup_schema_key(ValueKind::Time),
        PathLookupBuilder::<NaiveTime>::decode,
    );
    registry.register_typed(
        lookup_schema_key(ValueKind::List),
        PathLookupBuilder::<Vec<Value>>::decode,
    );
    registry.register_typed(
        lookup_schema_key(ValueKind::Object),
        PathLookupBuilder::<Value>::decode,
    );
    registry.register_typed(
        lookup_schema_key(ValueKind::Entity),
        PathLookupBuilder::<EntityValue>::decode,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ax_core::{AutomationData, DeploymentEnvironment, TriggerEvent};
    use serde_json::json;

    fn ctx() -> ProviderContext {
        ProviderContext::new(
            AutomationData::new("t-1", DeploymentEnvironment::Development)
                .with_variable("answers", json!({"age": "41", "smoker": false, "notes": null}))
                .with_trigger(
                    TriggerEvent::new("quoteSubmitted").with_payload(json!({"total": 12.5})),
                ),
        )
    }

    async fn resolve<T: DataType>(node: Value) -> ProviderResult<T> {
        let registry = BuilderRegistry::with_defaults();
        let decoder = ConfigDecoder::new(&registry);
        let provider = decoder.decode::<T>(&node, "").unwrap().build(&ServiceLocator::new());
        provider.resolve(&ctx()).await
    }

    #[tokio::test]
    async fn test_shorthand_lookup() {
        let age = resolve::<i64>(json!({"objectPathLookupInteger": "context.answers.age"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*age.value(), 41);

        let total = resolve::<f64>(json!({"objectPathLookupNumber": "/trigger/payload/total"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*total.value(), 12.5);

        let tenant = resolve::<String>(json!({"objectPathLookupText": "system.tenantId"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tenant.value(), "t-1");
    }

    #[tokio::test]
    async fn test_null_and_missing() {
        let notes = resolve::<String>(json!({"objectPathLookupText": "context.answers.notes"}))
            .await
            .unwrap();
        assert!(notes.is_none());

        let err = resolve::<String>(json!({"objectPathLookupText": {
            "path": "context.answers.notes",
            "raiseErrorIfNull": true
        }}))
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NullValue);

        let fallback = resolve::<bool>(json!({"objectPathLookupBoolean": {
            "path": "context.answers.missing",
            "valueIfNotFound": true
        }}))
        .await
        .unwrap()
        .unwrap();
        assert!(*fallback.value());
    }

    #[tokio::test]
    async fn test_data_object_lookup() {
        let value = resolve::<i64>(json!({"objectPathLookupInteger": {
            "path": "items.1.qty",
            "dataObject": {"staticObject": {"items": [{"qty": 1}, {"qty": 3}]}}
        }}))
        .await
        .unwrap()
        .unwrap();
        assert_eq!(*value.value(), 3);
    }

    #[test]
    fn test_hints_recorded_for_context_paths() {
        let registry = BuilderRegistry::with_defaults();
        let decoder = ConfigDecoder::new(&registry);
        decoder
            .decode::<String>(
                &json!({"objectPathLookupText": "context.quote.customer.fullName"}),
                "",
            )
            .unwrap();
        decoder
            .decode::<i64>(
                &json!({"objectPathLookupInteger": {"path": "quote.total", "dataObject": {}}}),
                "",
            )
            .unwrap_err();
        let hints = decoder.into_hints();
        assert_eq!(
            hints.sub_paths("quote").into_iter().collect::<Vec<_>>(),
            vec!["customer.fullName".to_string()]
        );
    }
}
