//! Provider and builder contracts
//!
//! A [`Builder`] is the decoded configuration node. It is immutable and
//! shared by every run. [`Builder::build`] composes the executable
//! [`Provider`] tree once per compilation; providers keep no per-run state,
//! so one tree serves concurrent runs each holding its own
//! [`ProviderContext`].

use async_trait::async_trait;
use ax_service_registry::ServiceLocator;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::context::ProviderContext;
use crate::data::{Data, DataType};
use crate::error::ProviderError;

/// Outcome of one resolution: `Ok(None)` is a resolved null
pub type ProviderResult<T> = Result<Option<Data<T>>, ProviderError>;

/// Shared provider handle
pub type ArcProvider<T> = Arc<dyn Provider<T>>;

/// Shared builder handle
pub type ArcBuilder<T> = Arc<dyn Builder<T>>;

/// An executable node resolving to a value of type `T`
#[async_trait]
pub trait Provider<T: DataType>: Send + Sync + fmt::Debug {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<T>;

    /// Machine name used in diagnostics
    fn schema_reference_key(&self) -> &'static str;
}

/// A decoded configuration node that constructs a provider
pub trait Builder<T: DataType>: Send + Sync + fmt::Debug {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<T>;
}

/// Resolve a child provider that the configuration must supply with a value
pub async fn resolve_required<T: DataType>(
    provider: &ArcProvider<T>,
    ctx: &ProviderContext,
    schema_key: &'static str,
    parameter: &str,
) -> Result<T, ProviderError> {
    match provider.resolve(ctx).await? {
        Some(data) => Ok(data.into_inner()),
        None => Err(ProviderError::MissingRequiredParameter {
            schema_key,
            parameter: parameter.to_string(),
            debug: ctx.debug_context(schema_key),
        }),
    }
}

/// Resolve an optional child provider, `None` when absent or null
pub async fn resolve_optional<T: DataType>(
    provider: Option<&ArcProvider<T>>,
    ctx: &ProviderContext,
) -> Result<Option<T>, ProviderError> {
    match provider {
        Some(provider) => Ok(provider.resolve(ctx).await?.map(Data::into_inner)),
        None => Ok(None),
    }
}

/// Resolve an optional boolean flag
pub async fn resolve_flag(
    provider: Option<&ArcProvider<bool>>,
    ctx: &ProviderContext,
    default: bool,
) -> Result<bool, ProviderError> {
    Ok(resolve_optional(provider, ctx).await?.unwrap_or(default))
}

/// Build an optional child builder
pub fn build_optional<T: DataType>(
    builder: Option<&ArcBuilder<T>>,
    services: &ServiceLocator,
) -> Option<ArcProvider<T>> {
    builder.map(|builder| builder.build(services))
}

/// Erases a typed builder into one producing raw JSON
#[derive(Debug)]
pub struct ObjectBuilderAdapter<T: DataType> {
    inner: ArcBuilder<T>,
}

impl<T: DataType> ObjectBuilderAdapter<T> {
    pub fn new(inner: ArcBuilder<T>) -> Self {
        Self { inner }
    }
}

impl<T: DataType> Builder<Value> for ObjectBuilderAdapter<T> {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<Value> {
        Arc::new(ObjectProviderAdapter {
            inner: self.inner.build(services),
        })
    }
}

#[derive(Debug)]
struct ObjectProviderAdapter<T: DataType> {
    inner: ArcProvider<T>,
}

#[async_trait]
impl<T: DataType> Provider<Value> for ObjectProviderAdapter<T> {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<Value> {
        let resolved = self.inner.resolve(ctx).await?;
        Ok(resolved.map(|data| Data::new(data.into_any().to_json())))
    }

    fn schema_reference_key(&self) -> &'static str {
        self.inner.schema_reference_key()
    }
}
