//! `queryResultObject`: a named query dispatched through the mediator
//!
//! ```json
//! {"queryResultObject": {"query": "authenticationMethod", "parameters": {"staticObject": {"id": "m-1"}}}}
//! ```

use async_trait::async_trait;
use ax_service_registry::ServiceLocator;
use serde_json::Value;
use std::sync::Arc;

use crate::context::ProviderContext;
use crate::data::Data;
use crate::decoder::{BuilderRegistry, ConfigDecoder};
use crate::error::{DecodeResult, ProviderError};
use crate::provider::{
    build_optional, resolve_optional, resolve_required, ArcBuilder, ArcProvider, Builder,
    Provider, ProviderResult,
};
use crate::providers::node_input;

const QUERY_RESULT_OBJECT: &str = "queryResultObject";

#[derive(Debug)]
pub struct QueryResultBuilder {
    query: ArcBuilder<String>,
    parameters: Option<ArcBuilder<Value>>,
}

impl QueryResultBuilder {
    fn decode(
        body: &Value,
        decoder: &ConfigDecoder<'_>,
        pointer: &str,
    ) -> DecodeResult<ArcBuilder<Value>> {
        let input = node_input(decoder, body, pointer, "query", &["parameters"])?;
        let parameters = match input.body {
            Some(map) => decoder.optional(map, "parameters", pointer)?,
            None => None,
        };
        Ok(Arc::new(Self {
            query: decoder.decode(input.node, &input.pointer)?,
            parameters,
        }))
    }
}

impl Builder<Value> for QueryResultBuilder {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<Value> {
        Arc::new(QueryResultProvider {
            query: self.query.build(services),
            parameters: build_optional(self.parameters.as_ref(), services),
        })
    }
}

#[derive(Debug)]
pub struct QueryResultProvider {
    query: ArcProvider<String>,
    parameters: Option<ArcProvider<Value>>,
}

#[async_trait]
impl Provider<Value> for QueryResultProvider {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<Value> {
        let query = resolve_required(&self.query, ctx, QUERY_RESULT_OBJECT, "query").await?;
        let parameters = resolve_optional(self.parameters.as_ref(), ctx)
            .await?
            .unwrap_or(Value::Null);
        let services = ctx.require_services("query mediator", QUERY_RESULT_OBJECT)?;

        let result = ctx
            .guard(async {
                services
                    .queries()
                    .dispatch(&query, parameters)
                    .await
                    .map_err(|source| ProviderError::Query {
                        schema_key: QUERY_RESULT_OBJECT,
                        source,
                        debug: ctx
                            .debug_context(QUERY_RESULT_OBJECT)
                            .with("query", query.as_str()),
                    })
            })
            .await?;

        Ok(match result {
            Value::Null => None,
            value => Some(Data::new(value)),
        })
    }

    fn schema_reference_key(&self) -> &'static str {
        QUERY_RESULT_OBJECT
    }
}

pub(crate) fn register(registry: &mut BuilderRegistry) {
    registry.register_typed(QUERY_RESULT_OBJECT, QueryResultBuilder::decode);
}
