//! Text providers

use async_trait::async_trait;
use ax_service_registry::ServiceLocator;
use serde_json::Value;
use std::sync::Arc;

use crate::context::ProviderContext;
use crate::data::Data;
use crate::decoder::{BuilderRegistry, ConfigDecoder};
use crate::error::DecodeResult;
use crate::provider::{
    build_optional, resolve_optional, ArcBuilder, ArcProvider, Builder, Provider, ProviderResult,
};
use crate::providers::node_input;

const TEXT_CONCATENATION: &str = "textConcatenation";

/// `{"textConcatenation": {"texts": ["Dear ", {"objectPathLookupText": "context.customer.fullName"}], "separator": ""}}`
///
/// Null parts are skipped. The shorthand body is the list of parts.
#[derive(Debug)]
pub struct TextConcatenationBuilder {
    texts: Vec<ArcBuilder<String>>,
    separator: Option<ArcBuilder<String>>,
}

impl TextConcatenationBuilder {
    fn decode(
        body: &Value,
        decoder: &ConfigDecoder<'_>,
        pointer: &str,
    ) -> DecodeResult<ArcBuilder<String>> {
        let input = node_input(decoder, body, pointer, "texts", &["separator"])?;
        let separator = match input.body {
            Some(map) => decoder.optional(map, "separator", pointer)?,
            None => None,
        };
        Ok(Arc::new(Self {
            texts: decoder.decode_list(input.node, &input.pointer)?,
            separator,
        }))
    }
}

impl Builder<String> for TextConcatenationBuilder {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<String> {
        Arc::new(TextConcatenationProvider {
            texts: self.texts.iter().map(|text| text.build(services)).collect(),
            separator: build_optional(self.separator.as_ref(), services),
        })
    }
}

#[derive(Debug)]
pub struct TextConcatenationProvider {
    texts: Vec<ArcProvider<String>>,
    separator: Option<ArcProvider<String>>,
}

#[async_trait]
impl Provider<String> for TextConcatenationProvider {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<String> {
        let separator = resolve_optional(self.separator.as_ref(), ctx)
            .await?
            .unwrap_or_default();
        let mut parts = Vec::with_capacity(self.texts.len());
        for text in &self.texts {
            if let Some(part) = text.resolve(ctx).await? {
                parts.push(part.into_inner());
            }
        }
        Ok(Some(Data::new(parts.join(&separator))))
    }

    fn schema_reference_key(&self) -> &'static str {
        TEXT_CONCATENATION
    }
}

pub(crate) fn register(registry: &mut BuilderRegistry) {
    registry.register_typed(TEXT_CONCATENATION, TextConcatenationBuilder::decode);
}
