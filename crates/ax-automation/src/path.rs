//! Path expressions and the object path lookup
//!
//! Two equivalent spellings are accepted: `/context/quote/total` (JSON
//! pointer style, `~1` and `~0` escapes) and `context.quote.total`. The first
//! segment names a root: `context` (the entity manager), `trigger` (the
//! triggering event) or `system` (run identifiers).

use ax_core::roots;
use serde_json::Value;
use std::fmt;
use tracing::trace;

use crate::context::ProviderContext;
use crate::error::ProviderError;
use crate::outcome::{FailureInfo, Outcome};

/// A parsed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpression {
    raw: String,
    segments: Vec<String>,
}

impl PathExpression {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let segments = if let Some(pointer) = trimmed.strip_prefix('/') {
            pointer
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
                .collect()
        } else {
            trimmed
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect()
        };
        Self {
            raw: trimmed.to_string(),
            segments,
        }
    }

    /// The path as written in configuration
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn root(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Where walking a path stopped
#[derive(Debug, Clone, PartialEq)]
pub enum WalkResult {
    Found(Value),
    /// An intermediate or final value was null
    Null,
    /// The segment at this index did not exist
    Missing(usize),
}

/// Walk `segments` down from `value`
///
/// Array segments must be decimal indices. A null met before the end ends
/// the walk with `Null`, as does a null at the end.
pub fn walk(value: &Value, segments: &[String]) -> WalkResult {
    let mut current = value;
    for (index, segment) in segments.iter().enumerate() {
        let next = match current {
            Value::Null => return WalkResult::Null,
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|position| items.get(position)),
            _ => None,
        };
        match next {
            Some(next) => current = next,
            None => return WalkResult::Missing(index),
        }
    }
    if current.is_null() {
        WalkResult::Null
    } else {
        WalkResult::Found(current.clone())
    }
}

/// Resolves raw values at a path without knowledge of the target type
pub struct ObjectPathLookup;

impl ObjectPathLookup {
    /// Look a path up against the run's roots
    ///
    /// Missing paths and nulls are reported as failures for the fallback
    /// chain; only environment problems (no service locator, collaborator
    /// errors, cancellation) are returned as hard errors.
    pub async fn lookup(
        ctx: &ProviderContext,
        expression: &PathExpression,
        schema_key: &'static str,
    ) -> Result<Outcome<Value>, ProviderError> {
        let segments = expression.segments();
        let Some(root) = expression.root() else {
            return Ok(not_found(ctx, expression, schema_key));
        };
        trace!(path = %expression, "Looking up path");

        let walked = match root {
            roots::CONTEXT => {
                return ctx
                    .entities()
                    .value_at(ctx, &segments[1..], expression, schema_key)
                    .await;
            }
            roots::TRIGGER => match ctx.data().trigger.as_ref() {
                Some(trigger) => walk(&trigger.to_json(), &segments[1..]),
                None => WalkResult::Missing(0),
            },
            roots::SYSTEM => walk(&ctx.data().system_json(), &segments[1..]),
            _ => WalkResult::Missing(0),
        };
        Ok(outcome_from_walk(ctx, walked, expression, schema_key))
    }

    /// Look a path up inside an explicit data object
    ///
    /// The whole path is relative to `data`; a leading `context`, `trigger`
    /// or `system` segment is not treated specially.
    pub fn lookup_in(
        ctx: &ProviderContext,
        data: &Value,
        expression: &PathExpression,
        schema_key: &'static str,
    ) -> Outcome<Value> {
        let walked = walk(data, expression.segments());
        outcome_from_walk(ctx, walked, expression, schema_key)
    }
}

pub(crate) fn outcome_from_walk(
    ctx: &ProviderContext,
    walked: WalkResult,
    expression: &PathExpression,
    schema_key: &'static str,
) -> Outcome<Value> {
    match walked {
        WalkResult::Found(value) => Outcome::Success(value),
        WalkResult::Null => Outcome::Success(Value::Null),
        WalkResult::Missing(_) => not_found(ctx, expression, schema_key),
    }
}

pub(crate) fn not_found(
    ctx: &ProviderContext,
    expression: &PathExpression,
    schema_key: &'static str,
) -> Outcome<Value> {
    Outcome::Failure(FailureInfo::path_not_found(
        expression.as_str(),
        ctx.debug_context(schema_key),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segments(path: &str) -> Vec<String> {
        PathExpression::parse(path).segments().to_vec()
    }

    #[test]
    fn test_both_syntaxes_are_equivalent() {
        assert_eq!(
            segments("/context/quote/total"),
            segments("context.quote.total")
        );
        assert_eq!(segments("/context/a~1b/c~0d"), vec!["context", "a/b", "c~d"]);
        assert!(PathExpression::parse("  ").is_empty());
    }

    #[test]
    fn test_walk() {
        let data = json!({
            "quote": {"customer": null, "items": [{"amount": 10}], "total": 5}
        });

        assert_eq!(
            walk(&data, &segments("quote.total")),
            WalkResult::Found(json!(5))
        );
        assert_eq!(
            walk(&data, &segments("quote.items.0.amount")),
            WalkResult::Found(json!(10))
        );
        assert_eq!(
            walk(&data, &segments("quote.customer.fullName")),
            WalkResult::Null
        );
        assert_eq!(
            walk(&data, &segments("quote.missing")),
            WalkResult::Missing(1)
        );
        assert_eq!(
            walk(&data, &segments("quote.items.3")),
            WalkResult::Missing(2)
        );
        assert_eq!(
            walk(&data, &segments("quote.total.value")),
            WalkResult::Missing(2)
        );
    }
}
