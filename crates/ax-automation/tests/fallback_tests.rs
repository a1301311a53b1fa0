//! Fallback chain behaviour observed through configured path lookups
//!
//! Every case decodes a real configuration node and resolves it against a
//! context built from automation data variables.

use ax_automation::{
    ArcProvider, Builder, BuilderRegistry, ConfigDecoder, DataType, ErrorKind, Provider,
    ProviderContext, ProviderError,
};
use ax_core::{AutomationData, DeploymentEnvironment};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use ax_service_registry::ServiceLocator;

fn data() -> AutomationData {
    AutomationData::new("tenant-1", DeploymentEnvironment::Development)
        .with_variable(
            "answers",
            json!({
                "age": "42",
                "nickname": null,
                "start": "2024-03-01T09:30:00Z",
                "vehicles": ["car", "boat"]
            }),
        )
        .with_variable("strict", json!(true))
}

fn provider<T: DataType>(node: Value) -> ArcProvider<T> {
    let registry = BuilderRegistry::with_defaults();
    let decoder = ConfigDecoder::new(&registry);
    decoder
        .decode::<T>(&node, "")
        .unwrap()
        .build(&ServiceLocator::new())
}

async fn resolve_in<T: DataType>(
    ctx: &ProviderContext,
    node: Value,
) -> Result<Option<T>, ProviderError> {
    provider::<T>(node)
        .resolve(ctx)
        .await
        .map(|value| value.map(|data| data.into_inner()))
}

async fn resolve<T: DataType>(node: Value) -> Result<Option<T>, ProviderError> {
    resolve_in(&ProviderContext::new(data()), node).await
}

// ============================================================================
// Defaults
// ============================================================================

#[tokio::test]
async fn test_missing_path_never_raises_by_default() {
    assert_eq!(
        resolve::<i64>(json!({"objectPathLookupInteger": "context.answers.missing"}))
            .await
            .unwrap(),
        None
    );
    assert_eq!(
        resolve::<String>(json!({"objectPathLookupText": "context.nothing.here"}))
            .await
            .unwrap(),
        None
    );
    assert_eq!(
        resolve::<DateTime<Utc>>(json!({"objectPathLookupDateTime": "trigger.payload.when"}))
            .await
            .unwrap(),
        None
    );
    assert_eq!(
        resolve::<Vec<Value>>(json!({"objectPathLookupList": "system.missing"}))
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_null_and_mismatch_never_raise_by_default() {
    assert_eq!(
        resolve::<String>(json!({"objectPathLookupText": "context.answers.nickname"}))
            .await
            .unwrap(),
        None
    );
    assert_eq!(
        resolve::<i64>(json!({"objectPathLookupInteger": "context.answers.start"}))
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_found_value_is_coerced() {
    assert_eq!(
        resolve::<i64>(json!({"objectPathLookupInteger": "context.answers.age"}))
            .await
            .unwrap(),
        Some(42)
    );
    assert_eq!(
        resolve::<i64>(json!({"objectPathLookupInteger": "/context/answers/vehicles"}))
            .await
            .unwrap(),
        None
    );
    assert_eq!(
        resolve::<String>(json!({"objectPathLookupText": "context.answers.vehicles.1"}))
            .await
            .unwrap(),
        Some("boat".to_string())
    );
}

// ============================================================================
// Not found stage
// ============================================================================

#[tokio::test]
async fn test_value_if_not_found_is_used() {
    let result = resolve::<i64>(json!({
        "objectPathLookupInteger": {
            "path": "context.answers.missing",
            "valueIfNotFound": 7,
            "defaultValue": 99
        }
    }))
    .await
    .unwrap();
    assert_eq!(result, Some(7));
}

#[tokio::test]
async fn test_default_value_used_for_missing_path() {
    let result = resolve::<String>(json!({
        "objectPathLookupText": {
            "path": "context.answers.missing",
            "defaultValue": "n/a"
        }
    }))
    .await
    .unwrap();
    assert_eq!(result, Some("n/a".to_string()));
}

#[tokio::test]
async fn test_raise_if_not_found_wins_over_substitutes() {
    let err = resolve::<i64>(json!({
        "objectPathLookupInteger": {
            "path": "context.answers.missing",
            "raiseErrorIfNotFound": true,
            "valueIfNotFound": 7,
            "defaultValue": 99
        }
    }))
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PathNotFound);
    match err {
        ProviderError::PathNotFound {
            schema_key, path, ..
        } => {
            assert_eq!(schema_key, "objectPathLookupInteger");
            assert_eq!(path, "context.answers.missing");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_raise_flag_can_come_from_a_provider() {
    let err = resolve::<i64>(json!({
        "objectPathLookupInteger": {
            "path": "context.answers.missing",
            "raiseErrorIfNotFound": {"objectPathLookupBoolean": "context.strict"}
        }
    }))
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathNotFound);
}

// ============================================================================
// Null stage
// ============================================================================

#[tokio::test]
async fn test_raise_if_null() {
    let err = resolve::<String>(json!({
        "objectPathLookupText": {
            "path": "context.answers.nickname",
            "raiseErrorIfNull": true,
            "valueIfNull": "anonymous"
        }
    }))
    .await
    .unwrap_err();

    match err {
        ProviderError::NullValue { path, .. } => assert_eq!(path, "context.answers.nickname"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_value_if_null_is_used() {
    let result = resolve::<String>(json!({
        "objectPathLookupText": {
            "path": "context.answers.nickname",
            "valueIfNull": "anonymous",
            "defaultValue": "ignored"
        }
    }))
    .await
    .unwrap();
    assert_eq!(result, Some("anonymous".to_string()));
}

#[tokio::test]
async fn test_default_value_used_for_null() {
    let result = resolve::<String>(json!({
        "objectPathLookupText": {
            "path": "context.answers.nickname",
            "defaultValue": "fallback"
        }
    }))
    .await
    .unwrap();
    assert_eq!(result, Some("fallback".to_string()));
}

#[tokio::test]
async fn test_null_substitute_is_terminal() {
    let result = resolve::<String>(json!({
        "objectPathLookupText": {
            "path": "context.answers.nickname",
            "valueIfNull": null,
            "defaultValue": "never used"
        }
    }))
    .await
    .unwrap();
    assert_eq!(result, None);
}

#[tokio::test]
async fn test_not_found_substitute_that_is_null_goes_through_null_stage() {
    let result = resolve::<String>(json!({
        "objectPathLookupText": {
            "path": "context.answers.missing",
            "valueIfNotFound": {"objectPathLookupText": "context.answers.nickname"},
            "valueIfNull": "from null stage"
        }
    }))
    .await
    .unwrap();
    assert_eq!(result, Some("from null stage".to_string()));
}

// ============================================================================
// Type mismatch stage
// ============================================================================

#[tokio::test]
async fn test_raise_if_type_mismatch_carries_types() {
    let err = resolve::<i64>(json!({
        "objectPathLookupInteger": {
            "path": "context.answers.start",
            "raiseErrorIfTypeMismatch": true,
            "valueIfTypeMismatch": 0
        }
    }))
    .await
    .unwrap_err();

    match err {
        ProviderError::TypeMismatch {
            observed_type,
            target_type,
            schema_key,
            ..
        } => {
            assert_eq!(observed_type, "text");
            assert_eq!(target_type, "integer");
            assert_eq!(schema_key, "objectPathLookupInteger");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_type_mismatch_substitute_is_coerced_once() {
    let result = resolve::<i64>(json!({
        "objectPathLookupInteger": {
            "path": "context.answers.start",
            "valueIfTypeMismatch": "7"
        }
    }))
    .await
    .unwrap();
    assert_eq!(result, Some(7));

    let err = resolve::<i64>(json!({
        "objectPathLookupInteger": {
            "path": "context.answers.start",
            "valueIfTypeMismatch": "still not a number"
        }
    }))
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}

#[tokio::test]
async fn test_default_value_used_for_type_mismatch() {
    let result = resolve::<i64>(json!({
        "objectPathLookupInteger": {
            "path": "context.answers.start",
            "defaultValue": 3
        }
    }))
    .await
    .unwrap();
    assert_eq!(result, Some(3));
}

// ============================================================================
// Trace
// ============================================================================

#[tokio::test]
async fn test_decisions_are_traced() {
    let ctx = ProviderContext::new(data());
    let result = resolve_in::<i64>(
        &ctx,
        json!({
            "objectPathLookupInteger": {
                "path": "context.answers.missing",
                "valueIfNotFound": 1
            }
        }),
    )
    .await
    .unwrap();
    assert_eq!(result, Some(1));

    let trace = ctx.trace();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].schema_key, "objectPathLookupInteger");
    assert_eq!(trace[0].path.as_deref(), Some("context.answers.missing"));
    assert_eq!(trace[0].decision, "valueIfNotFound used");
}
