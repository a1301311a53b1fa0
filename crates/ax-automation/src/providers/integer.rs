//! Integer providers

use async_trait::async_trait;
use ax_service_registry::ServiceLocator;
use futures::future::try_join_all;
use serde_json::Value;
use std::sync::Arc;

use crate::context::ProviderContext;
use crate::data::{Data, ValueKind};
use crate::decoder::{BuilderRegistry, ConfigDecoder};
use crate::error::{DecodeResult, ProviderError};
use crate::outcome::FailureInfo;
use crate::provider::{ArcBuilder, ArcProvider, Builder, Provider, ProviderResult};
use crate::providers::node_input;
use crate::providers::unary::register_unary;

const ADD_INTEGERS: &str = "addIntegers";

/// `{"addIntegers": [1, {"objectPathLookupInteger": "context.answers.extra"}]}`
///
/// Operands resolve concurrently. Any null operand makes the sum null.
#[derive(Debug)]
pub struct AddIntegersBuilder {
    operands: Vec<ArcBuilder<i64>>,
}

impl AddIntegersBuilder {
    fn decode(
        body: &Value,
        decoder: &ConfigDecoder<'_>,
        pointer: &str,
    ) -> DecodeResult<ArcBuilder<i64>> {
        let input = node_input(decoder, body, pointer, "integers", &[])?;
        Ok(Arc::new(Self {
            operands: decoder.decode_list(input.node, &input.pointer)?,
        }))
    }
}

impl Builder<i64> for AddIntegersBuilder {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<i64> {
        Arc::new(AddIntegersProvider {
            operands: self
                .operands
                .iter()
                .map(|operand| operand.build(services))
                .collect(),
        })
    }
}

#[derive(Debug)]
pub struct AddIntegersProvider {
    operands: Vec<ArcProvider<i64>>,
}

#[async_trait]
impl Provider<i64> for AddIntegersProvider {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<i64> {
        let values = try_join_all(self.operands.iter().map(|operand| operand.resolve(ctx))).await?;

        let mut total: i64 = 0;
        for value in values {
            let Some(value) = value else {
                return Ok(None);
            };
            total = match total.checked_add(*value.value()) {
                Some(total) => total,
                None => {
                    let failure = FailureInfo::type_mismatch(
                        &Value::String(format!("{} + {}", total, value.value())),
                        ValueKind::Integer,
                        ctx.debug_context(ADD_INTEGERS),
                    );
                    return Err(ProviderError::from_failure(failure, ADD_INTEGERS));
                }
            };
        }
        Ok(Some(Data::new(total)))
    }

    fn schema_reference_key(&self) -> &'static str {
        ADD_INTEGERS
    }
}

#[allow(clippy::ptr_arg)]
fn count_list_items(list: &Vec<Value>) -> Option<i64> {
    i64::try_from(list.len()).ok()
}

fn integer_to_text(value: &i64) -> Option<String> {
    Some(value.to_string())
}

pub(crate) fn register(registry: &mut BuilderRegistry) {
    registry.register_typed(ADD_INTEGERS, AddIntegersBuilder::decode);
    register_unary::<Vec<Value>, i64>(
        registry,
        "countListItemsInteger",
        "list",
        count_list_items,
    );
    register_unary::<i64, String>(registry, "integerToText", "integer", integer_to_text);
}
