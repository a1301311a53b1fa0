//! Entity providers
//!
//! `contextEntity` hydrates an entity already present under a context key,
//! `dynamicEntity` loads any entity by type and id, and `contextEntityList`
//! materializes a list-typed context entry.

use async_trait::async_trait;
use ax_core::{roots, EntityKind, EntityReference};
use ax_service_registry::ServiceLocator;
use serde_json::Value;
use std::sync::Arc;

use crate::context::ProviderContext;
use crate::data::{Data, EntityValue};
use crate::decoder::{BuilderRegistry, ConfigDecoder};
use crate::error::{DecodeResult, ProviderError};
use crate::path::PathExpression;
use crate::provider::{resolve_required, ArcBuilder, ArcProvider, Builder, Provider, ProviderResult};
use crate::providers::node_input;

const CONTEXT_ENTITY: &str = "contextEntity";
const DYNAMIC_ENTITY: &str = "dynamicEntity";
const CONTEXT_ENTITY_LIST: &str = "contextEntityList";

/// Accept `quote`, `context.quote` or `/context/quote`
fn context_key(text: &str) -> String {
    let expression = PathExpression::parse(text);
    let segments = expression.segments();
    match segments {
        [root, key, ..] if root == roots::CONTEXT => key.clone(),
        [key, ..] => key.clone(),
        [] => String::new(),
    }
}

fn decode_key(
    body: &Value,
    decoder: &ConfigDecoder<'_>,
    pointer: &str,
) -> DecodeResult<ArcBuilder<String>> {
    let input = node_input(decoder, body, pointer, "key", &[])?;
    decoder.decode::<String>(input.node, &input.pointer)
}

#[derive(Debug)]
pub struct ContextEntityBuilder {
    key: ArcBuilder<String>,
}

impl ContextEntityBuilder {
    fn decode(
        body: &Value,
        decoder: &ConfigDecoder<'_>,
        pointer: &str,
    ) -> DecodeResult<ArcBuilder<EntityValue>> {
        Ok(Arc::new(Self {
            key: decode_key(body, decoder, pointer)?,
        }))
    }
}

impl Builder<EntityValue> for ContextEntityBuilder {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<EntityValue> {
        Arc::new(ContextEntityProvider {
            key: self.key.build(services),
        })
    }
}

/// Null when the key is absent or the entity does not exist
#[derive(Debug)]
pub struct ContextEntityProvider {
    key: ArcProvider<String>,
}

#[async_trait]
impl Provider<EntityValue> for ContextEntityProvider {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<EntityValue> {
        let key = resolve_required(&self.key, ctx, CONTEXT_ENTITY, "key").await?;
        let entity = ctx
            .entities()
            .entity(ctx, &context_key(&key), CONTEXT_ENTITY)
            .await?;
        Ok(entity.map(Data::new))
    }

    fn schema_reference_key(&self) -> &'static str {
        CONTEXT_ENTITY
    }
}

/// `{"dynamicEntity": {"entityType": "quote", "entityId": {"objectPathLookupText": "trigger.payload.quoteId"}}}`
#[derive(Debug)]
pub struct DynamicEntityBuilder {
    entity_type: ArcBuilder<String>,
    entity_id: ArcBuilder<String>,
}

impl DynamicEntityBuilder {
    fn decode(
        body: &Value,
        decoder: &ConfigDecoder<'_>,
        pointer: &str,
    ) -> DecodeResult<ArcBuilder<EntityValue>> {
        let map = decoder.expect_object(body, pointer, &["entityType", "entityId"])?;
        Ok(Arc::new(Self {
            entity_type: decoder.required(map, "entityType", pointer)?,
            entity_id: decoder.required(map, "entityId", pointer)?,
        }))
    }
}

impl Builder<EntityValue> for DynamicEntityBuilder {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<EntityValue> {
        Arc::new(DynamicEntityProvider {
            entity_type: self.entity_type.build(services),
            entity_id: self.entity_id.build(services),
        })
    }
}

/// Loads through the entity query service once per run; null when not found
#[derive(Debug)]
pub struct DynamicEntityProvider {
    entity_type: ArcProvider<String>,
    entity_id: ArcProvider<String>,
}

#[async_trait]
impl Provider<EntityValue> for DynamicEntityProvider {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<EntityValue> {
        let entity_type =
            resolve_required(&self.entity_type, ctx, DYNAMIC_ENTITY, "entityType").await?;
        let entity_id = resolve_required(&self.entity_id, ctx, DYNAMIC_ENTITY, "entityId").await?;
        let kind: EntityKind = entity_type.parse().map_err(|_| ProviderError::TypeMismatch {
            schema_key: DYNAMIC_ENTITY,
            observed_type: "text".to_string(),
            target_type: "entityType",
            debug: ctx
                .debug_context(DYNAMIC_ENTITY)
                .with("value", entity_type.as_str()),
        })?;
        let reference = EntityReference::new(kind, entity_id);
        let entity = ctx
            .entities()
            .load_dynamic(ctx, &reference, DYNAMIC_ENTITY)
            .await?;
        Ok(entity.map(Data::new))
    }

    fn schema_reference_key(&self) -> &'static str {
        DYNAMIC_ENTITY
    }
}

#[derive(Debug)]
pub struct ContextEntityListBuilder {
    key: ArcBuilder<String>,
}

impl ContextEntityListBuilder {
    fn decode(
        body: &Value,
        decoder: &ConfigDecoder<'_>,
        pointer: &str,
    ) -> DecodeResult<ArcBuilder<Vec<Value>>> {
        Ok(Arc::new(Self {
            key: decode_key(body, decoder, pointer)?,
        }))
    }
}

impl Builder<Vec<Value>> for ContextEntityListBuilder {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<Vec<Value>> {
        Arc::new(ContextEntityListProvider {
            key: self.key.build(services),
        })
    }
}

/// Null when the key holds no entity list
#[derive(Debug)]
pub struct ContextEntityListProvider {
    key: ArcProvider<String>,
}

#[async_trait]
impl Provider<Vec<Value>> for ContextEntityListProvider {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<Vec<Value>> {
        let key = resolve_required(&self.key, ctx, CONTEXT_ENTITY_LIST, "key").await?;
        let items = ctx
            .entities()
            .entity_list(ctx, &context_key(&key), CONTEXT_ENTITY_LIST)
            .await?;
        Ok(items.map(Data::new))
    }

    fn schema_reference_key(&self) -> &'static str {
        CONTEXT_ENTITY_LIST
    }
}

pub(crate) fn register(registry: &mut BuilderRegistry) {
    registry.register_typed(CONTEXT_ENTITY, ContextEntityBuilder::decode);
    registry.register_typed(DYNAMIC_ENTITY, DynamicEntityBuilder::decode);
    registry.register_typed(CONTEXT_ENTITY_LIST, ContextEntityListBuilder::decode);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_key_forms() {
        assert_eq!(context_key("quote"), "quote");
        assert_eq!(context_key("context.quote"), "quote");
        assert_eq!(context_key("/context/claims"), "claims");
        assert_eq!(context_key(""), "");
    }
}
