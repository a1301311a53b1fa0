//! Single-input providers that apply a pure function
//!
//! A null input resolves to null. A function returning `None` means the
//! input is outside the function's domain and raises `TypeMismatch`.

use async_trait::async_trait;
use ax_service_registry::ServiceLocator;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::context::ProviderContext;
use crate::data::{Data, DataType};
use crate::decoder::{BuilderRegistry, ConfigDecoder};
use crate::error::{DecodeResult, ProviderError};
use crate::outcome::FailureInfo;
use crate::provider::{ArcBuilder, ArcProvider, Builder, Provider, ProviderResult};
use crate::providers::node_input;

pub struct UnaryBuilder<I, O> {
    schema_key: &'static str,
    input: ArcBuilder<I>,
    apply: fn(&I) -> Option<O>,
}

impl<I: DataType, O: DataType> UnaryBuilder<I, O> {
    pub fn new(schema_key: &'static str, input: ArcBuilder<I>, apply: fn(&I) -> Option<O>) -> Self {
        Self {
            schema_key,
            input,
            apply,
        }
    }
}

impl<I: DataType, O: DataType> fmt::Debug for UnaryBuilder<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryBuilder")
            .field("schema_key", &self.schema_key)
            .field("input", &self.input)
            .finish()
    }
}

impl<I: DataType, O: DataType> Builder<O> for UnaryBuilder<I, O> {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<O> {
        Arc::new(UnaryProvider {
            schema_key: self.schema_key,
            input: self.input.build(services),
            apply: self.apply,
        })
    }
}

pub struct UnaryProvider<I, O> {
    schema_key: &'static str,
    input: ArcProvider<I>,
    apply: fn(&I) -> Option<O>,
}

impl<I: DataType, O: DataType> fmt::Debug for UnaryProvider<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryProvider")
            .field("schema_key", &self.schema_key)
            .field("input", &self.input)
            .finish()
    }
}

#[async_trait]
impl<I: DataType, O: DataType> Provider<O> for UnaryProvider<I, O> {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<O> {
        let Some(input) = self.input.resolve(ctx).await? else {
            return Ok(None);
        };
        match (self.apply)(input.value()) {
            Some(output) => Ok(Some(Data::new(output))),
            None => {
                let failure = FailureInfo::type_mismatch(
                    &input.value().to_json(),
                    O::KIND,
                    ctx.debug_context(self.schema_key),
                );
                Err(ProviderError::from_failure(failure, self.schema_key))
            }
        }
    }

    fn schema_reference_key(&self) -> &'static str {
        self.schema_key
    }
}

/// Register a single-input provider; the input sits under `property` in the long form
pub(crate) fn register_unary<I: DataType, O: DataType>(
    registry: &mut BuilderRegistry,
    schema_key: &'static str,
    property: &'static str,
    apply: fn(&I) -> Option<O>,
) {
    registry.register_typed(
        schema_key,
        move |body: &Value, decoder: &ConfigDecoder<'_>, pointer: &str| {
            decode_unary(schema_key, property, apply, body, decoder, pointer)
        },
    );
}

fn decode_unary<I: DataType, O: DataType>(
    schema_key: &'static str,
    property: &'static str,
    apply: fn(&I) -> Option<O>,
    body: &Value,
    decoder: &ConfigDecoder<'_>,
    pointer: &str,
) -> DecodeResult<ArcBuilder<O>> {
    let input = node_input(decoder, body, pointer, property, &[])?;
    let builder = decoder.decode::<I>(input.node, &input.pointer)?;
    Ok(Arc::new(UnaryBuilder::new(schema_key, builder, apply)))
}
