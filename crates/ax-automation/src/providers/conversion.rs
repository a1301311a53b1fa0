//! Conversion providers: `textTo*` and `valueTo*`
//!
//! The input is coerced with the same rules a path lookup uses. A value that
//! cannot be converted raises `TypeMismatch` unless `valueIfTypeMismatch`
//! supplies a replacement or `raiseErrorIfTypeMismatch` is false.
//!
//! ```json
//! {"valueToInteger": "1,234.00"}
//! {"textToDateTime": {"text": {"objectPathLookupText": "context.answers.start"}, "valueIfTypeMismatch": null}}
//! ```

use async_trait::async_trait;
use ax_service_registry::ServiceLocator;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::ProviderContext;
use crate::data::{Data, DataType};
use crate::decoder::{BuilderRegistry, ConfigDecoder};
use crate::error::DecodeResult;
use crate::fallback::{
    FallbackBuilders, FallbackChain, FallbackDefaults, CONVERSION_FALLBACK_PROPERTIES,
};
use crate::outcome::Outcome;
use crate::provider::{ArcBuilder, ArcProvider, Builder, Provider, ProviderResult};
use crate::providers::node_input;

/// Where the input comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    /// `text`, decoded as a text provider
    Text,
    /// `value`, decoded as any provider
    Value,
}

impl Input {
    fn property(&self) -> &'static str {
        match self {
            Input::Text => "text",
            Input::Value => "value",
        }
    }
}

#[derive(Debug)]
pub struct ConversionBuilder<T> {
    schema_key: &'static str,
    input: ArcBuilder<Value>,
    fallbacks: FallbackBuilders,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DataType> ConversionBuilder<T> {
    fn decode(
        schema_key: &'static str,
        input: Input,
        body: &Value,
        decoder: &ConfigDecoder<'_>,
        pointer: &str,
    ) -> DecodeResult<ArcBuilder<T>> {
        let parts = node_input(
            decoder,
            body,
            pointer,
            input.property(),
            &CONVERSION_FALLBACK_PROPERTIES,
        )?;
        let source = match input {
            Input::Text => {
                let text = decoder.decode::<String>(parts.node, &parts.pointer)?;
                String::into_any_builder(text).into_object()
            }
            Input::Value => decoder.decode::<Value>(parts.node, &parts.pointer)?,
        };
        let fallbacks = match parts.body {
            // `node_input` only admits the type mismatch properties
            Some(map) => FallbackBuilders::decode(decoder, map, pointer)?,
            None => FallbackBuilders::default(),
        };
        Ok(Arc::new(Self {
            schema_key,
            input: source,
            fallbacks,
            _marker: PhantomData,
        }))
    }
}

impl<T: DataType> Builder<T> for ConversionBuilder<T> {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<T> {
        Arc::new(ConversionProvider::<T> {
            schema_key: self.schema_key,
            input: self.input.build(services),
            chain: self.fallbacks.build(services, FallbackDefaults::CONVERSION),
            _marker: PhantomData,
        })
    }
}

#[derive(Debug)]
pub struct ConversionProvider<T> {
    schema_key: &'static str,
    input: ArcProvider<Value>,
    chain: FallbackChain,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: DataType> Provider<T> for ConversionProvider<T> {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<T> {
        let value = self
            .input
            .resolve(ctx)
            .await?
            .map(Data::into_inner)
            .unwrap_or(Value::Null);
        self.chain
            .resolve::<T>(ctx, self.schema_key, None, Outcome::Success(value))
            .await
    }

    fn schema_reference_key(&self) -> &'static str {
        self.schema_key
    }
}

fn register_conversion<T: DataType>(
    registry: &mut BuilderRegistry,
    schema_key: &'static str,
    input: Input,
) {
    registry.register_typed(schema_key, move |body, decoder, pointer| {
        ConversionBuilder::<T>::decode(schema_key, input, body, decoder, pointer)
    });
}

pub(crate) fn register(registry: &mut BuilderRegistry) {
    register_conversion::<DateTime<Utc>>(registry, "textToDateTime", Input::Text);
    register_conversion::<NaiveDate>(registry, "textToDate", Input::Text);
    register_conversion::<NaiveTime>(registry, "textToTime", Input::Text);
    register_conversion::<i64>(registry, "textToInteger", Input::Text);
    register_conversion::<f64>(registry, "textToNumber", Input::Text);
    register_conversion::<i64>(registry, "valueToInteger", Input::Value);
    register_conversion::<f64>(registry, "valueToNumber", Input::Value);
    register_conversion::<String>(registry, "valueToText", Input::Value);
    register_conversion::<bool>(registry, "valueToBoolean", Input::Value);
    register_conversion::<DateTime<Utc>>(registry, "valueToDateTime", Input::Value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, ErrorKind};
    use ax_core::{AutomationData, DeploymentEnvironment};
    use chrono::TimeZone;
    use serde_json::json;

    async fn resolve<T: DataType>(node: Value) -> ProviderResult<T> {
        let registry = BuilderRegistry::with_defaults();
        let decoder = ConfigDecoder::new(&registry);
        let provider = decoder
            .decode::<T>(&node, "")
            .unwrap()
            .build(&ServiceLocator::new());
        let ctx =
            ProviderContext::new(AutomationData::new("t-1", DeploymentEnvironment::Development));
        provider.resolve(&ctx).await
    }

    #[tokio::test]
    async fn test_text_to_date_time() {
        let value = resolve::<DateTime<Utc>>(json!({"textToDateTime": "2024-06-30T23:15:00+10:00"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            *value.value(),
            Utc.with_ymd_and_hms(2024, 6, 30, 13, 15, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_mismatch_raises_by_default() {
        let err = resolve::<DateTime<Utc>>(json!({"textToDateTime": "next tuesday"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        let debug = err.debug_context().unwrap();
        assert_eq!(debug.get("value").unwrap(), "next tuesday");
        assert_eq!(debug.get("schemaKey").unwrap(), "textToDateTime");
    }

    #[tokio::test]
    async fn test_mismatch_can_be_silenced() {
        let value = resolve::<i64>(json!({"textToInteger": {
            "text": "many",
            "raiseErrorIfTypeMismatch": false
        }}))
        .await
        .unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_value_to_text_and_boolean() {
        let text = resolve::<String>(json!({"valueToText": 12}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text.value(), "12");

        let flag = resolve::<bool>(json!({"valueToBoolean": "false"}))
            .await
            .unwrap()
            .unwrap();
        assert!(!*flag.value());
    }

    #[test]
    fn test_text_input_must_be_text() {
        let registry = BuilderRegistry::with_defaults();
        let decoder = ConfigDecoder::new(&registry);
        let err = decoder
            .decode::<i64>(&json!({"textToInteger": {"staticList": [1]}}), "")
            .unwrap_err();
        assert!(matches!(err, DecodeError::KindMismatch { .. }));
    }
}
