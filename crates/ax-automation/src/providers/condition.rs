//! Condition providers
//!
//! Conditions resolve to booleans. `andCondition` and `orCondition`
//! short-circuit left to right and treat a null operand as false. A
//! comparison with a null side is false.

use async_trait::async_trait;
use ax_service_registry::ServiceLocator;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::context::ProviderContext;
use crate::data::{Data, DataType};
use crate::decoder::{BuilderRegistry, ConfigDecoder};
use crate::error::DecodeResult;
use crate::provider::{resolve_optional, ArcBuilder, ArcProvider, Builder, Provider, ProviderResult};
use crate::providers::node_input;
use crate::providers::unary::register_unary;

/// How a list of conditions is combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    All,
    Any,
}

impl Combinator {
    fn schema_key(&self) -> &'static str {
        match self {
            Combinator::All => "andCondition",
            Combinator::Any => "orCondition",
        }
    }
}

#[derive(Debug)]
pub struct CombinedConditionBuilder {
    combinator: Combinator,
    conditions: Vec<ArcBuilder<bool>>,
}

impl CombinedConditionBuilder {
    fn decode(
        combinator: Combinator,
        body: &Value,
        decoder: &ConfigDecoder<'_>,
        pointer: &str,
    ) -> DecodeResult<ArcBuilder<bool>> {
        let input = node_input(decoder, body, pointer, "conditions", &[])?;
        Ok(Arc::new(Self {
            combinator,
            conditions: decoder.decode_list(input.node, &input.pointer)?,
        }))
    }
}

impl Builder<bool> for CombinedConditionBuilder {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<bool> {
        Arc::new(CombinedConditionProvider {
            combinator: self.combinator,
            conditions: self
                .conditions
                .iter()
                .map(|condition| condition.build(services))
                .collect(),
        })
    }
}

#[derive(Debug)]
pub struct CombinedConditionProvider {
    combinator: Combinator,
    conditions: Vec<ArcProvider<bool>>,
}

#[async_trait]
impl Provider<bool> for CombinedConditionProvider {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<bool> {
        for condition in &self.conditions {
            let holds = condition
                .resolve(ctx)
                .await?
                .map(Data::into_inner)
                .unwrap_or(false);
            match (self.combinator, holds) {
                (Combinator::All, false) => return Ok(Some(Data::new(false))),
                (Combinator::Any, true) => return Ok(Some(Data::new(true))),
                _ => {}
            }
        }
        Ok(Some(Data::new(self.combinator == Combinator::All)))
    }

    fn schema_reference_key(&self) -> &'static str {
        self.combinator.schema_key()
    }
}

/// A binary comparison between two values of one family
pub struct Comparison<T> {
    schema_key: &'static str,
    subject: &'static str,
    operand: &'static str,
    holds: fn(&T, &T) -> bool,
}

impl<T> Clone for Comparison<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Comparison<T> {}

impl<T> fmt::Debug for Comparison<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparison")
            .field("schema_key", &self.schema_key)
            .field("subject", &self.subject)
            .field("operand", &self.operand)
            .finish()
    }
}

#[derive(Debug)]
pub struct ComparisonBuilder<T> {
    comparison: Comparison<T>,
    subject: ArcBuilder<T>,
    operand: ArcBuilder<T>,
}

impl<T: DataType> ComparisonBuilder<T> {
    fn decode(
        comparison: Comparison<T>,
        body: &Value,
        decoder: &ConfigDecoder<'_>,
        pointer: &str,
    ) -> DecodeResult<ArcBuilder<bool>> {
        let map = decoder.expect_object(body, pointer, &[comparison.subject, comparison.operand])?;
        Ok(Arc::new(Self {
            comparison,
            subject: decoder.required(map, comparison.subject, pointer)?,
            operand: decoder.required(map, comparison.operand, pointer)?,
        }))
    }
}

impl<T: DataType> Builder<bool> for ComparisonBuilder<T> {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<bool> {
        Arc::new(ComparisonProvider {
            comparison: self.comparison,
            subject: self.subject.build(services),
            operand: self.operand.build(services),
        })
    }
}

#[derive(Debug)]
pub struct ComparisonProvider<T> {
    comparison: Comparison<T>,
    subject: ArcProvider<T>,
    operand: ArcProvider<T>,
}

#[async_trait]
impl<T: DataType> Provider<bool> for ComparisonProvider<T> {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<bool> {
        let subject = resolve_optional(Some(&self.subject), ctx).await?;
        let operand = resolve_optional(Some(&self.operand), ctx).await?;
        let holds = match (subject, operand) {
            (Some(subject), Some(operand)) => (self.comparison.holds)(&subject, &operand),
            _ => false,
        };
        Ok(Some(Data::new(holds)))
    }

    fn schema_reference_key(&self) -> &'static str {
        self.comparison.schema_key
    }
}

fn register_comparison<T: DataType>(registry: &mut BuilderRegistry, comparison: Comparison<T>) {
    registry.register_typed(comparison.schema_key, move |body, decoder, pointer| {
        ComparisonBuilder::<T>::decode(comparison, body, decoder, pointer)
    });
}

fn negate(value: &bool) -> Option<bool> {
    Some(!value)
}

pub(crate) fn register(registry: &mut BuilderRegistry) {
    for combinator in [Combinator::All, Combinator::Any] {
        registry.register_typed(combinator.schema_key(), move |body, decoder, pointer| {
            CombinedConditionBuilder::decode(combinator, body, decoder, pointer)
        });
    }
    register_unary::<bool, bool>(registry, "notCondition", "condition", negate);

    register_comparison::<String>(
        registry,
        Comparison {
            schema_key: "textIsEqualToCondition",
            subject: "text",
            operand: "isEqualTo",
            holds: |a, b| a == b,
        },
    );
    register_comparison::<i64>(
        registry,
        Comparison {
            schema_key: "integerIsEqualToCondition",
            subject: "integer",
            operand: "isEqualTo",
            holds: |a, b| a == b,
        },
    );
    register_comparison::<i64>(
        registry,
        Comparison {
            schema_key: "integerIsGreaterThanCondition",
            subject: "integer",
            operand: "isGreaterThan",
            holds: |a, b| a > b,
        },
    );
    register_comparison::<i64>(
        registry,
        Comparison {
            schema_key: "integerIsLessThanCondition",
            subject: "integer",
            operand: "isLessThan",
            holds: |a, b| a < b,
        },
    );
    register_comparison::<DateTime<Utc>>(
        registry,
        Comparison {
            schema_key: "dateTimeIsBeforeCondition",
            subject: "dateTime",
            operand: "isBefore",
            holds: |a, b| a < b,
        },
    );
    register_comparison::<DateTime<Utc>>(
        registry,
        Comparison {
            schema_key: "dateTimeIsAfterCondition",
            subject: "dateTime",
            operand: "isAfter",
            holds: |a, b| a > b,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_core::{AutomationData, DeploymentEnvironment};
    use serde_json::json;

    async fn evaluate(node: Value) -> Option<bool> {
        let registry = BuilderRegistry::with_defaults();
        let decoder = ConfigDecoder::new(&registry);
        let provider = decoder
            .decode::<bool>(&node, "")
            .unwrap()
            .build(&ServiceLocator::new());
        let ctx = ProviderContext::new(
            AutomationData::new("t-1", DeploymentEnvironment::Development)
                .with_variable("age", json!(17))
                .with_variable("state", json!("VIC")),
        );
        provider.resolve(&ctx).await.unwrap().map(Data::into_inner)
    }

    #[tokio::test]
    async fn test_comparisons() {
        assert_eq!(
            evaluate(json!({"integerIsLessThanCondition": {
                "integer": {"objectPathLookupInteger": "context.age"},
                "isLessThan": 18
            }}))
            .await,
            Some(true)
        );
        assert_eq!(
            evaluate(json!({"textIsEqualToCondition": {
                "text": {"objectPathLookupText": "context.state"},
                "isEqualTo": "NSW"
            }}))
            .await,
            Some(false)
        );
        assert_eq!(
            evaluate(json!({"dateTimeIsBeforeCondition": {
                "dateTime": "2024-01-01T00:00:00Z",
                "isBefore": "2024-01-01T00:00:01Z"
            }}))
            .await,
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_null_side_is_false() {
        assert_eq!(
            evaluate(json!({"integerIsEqualToCondition": {
                "integer": {"objectPathLookupInteger": "context.missing"},
                "isEqualTo": 0
            }}))
            .await,
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_and_or_not() {
        assert_eq!(evaluate(json!({"andCondition": [true, true]})).await, Some(true));
        assert_eq!(evaluate(json!({"andCondition": [true, false]})).await, Some(false));
        assert_eq!(evaluate(json!({"andCondition": []})).await, Some(true));
        assert_eq!(evaluate(json!({"orCondition": [false, null]})).await, Some(false));
        assert_eq!(
            evaluate(json!({"orCondition": {"conditions": [false, {"notCondition": false}]}}))
                .await,
            Some(true)
        );
        assert_eq!(evaluate(json!({"notCondition": null})).await, None);
    }
}
