//! Automation Provider Engine
//!
//! Automations compute values (dates, integers, text, lists, entities) from a
//! tree of declaratively configured providers. Configuration is decoded once
//! into builders; builders construct stateless providers; providers are
//! resolved against a per-run [`ProviderContext`] that hydrates entities only
//! when a path actually dereferences them.
//!
//! # Architecture
//!
//! ```text
//! JSON ──ConfigDecoder──▶ Builder ──build(ServiceLocator)──▶ Provider ──resolve(ProviderContext)──▶ Data<T>
//! ```
//!
//! - [`ConfigDecoder`] selects builders by discriminator property via a [`BuilderRegistry`]
//! - [`FallbackChain`] is the shared not-found / null / type-mismatch / default policy
//! - [`EntityManager`] owns the per-run entity slots and their lazy hydration
//! - [`CompiledAutomation`] holds a whole configuration decoded once and evaluates it per run

pub mod automation;
pub mod context;
pub mod data;
pub mod decoder;
pub mod entity_manager;
pub mod error;
pub mod fallback;
pub mod outcome;
pub mod path;
pub mod provider;
pub mod providers;

pub use automation::{
    AutomationConfig, AutomationError, AutomationManager, AutomationResult, AutomationRun,
    CompiledAutomation,
};
pub use context::{ContextSettings, ProviderContext, TraceEntry};
pub use data::{AnyData, Data, DataType, EntityValue, ValueKind};
pub use decoder::{AnyBuilder, BuilderRegistry, ConfigDecoder, PathHints};
pub use entity_manager::{ContextEntry, ContextKey, EntityListSlot, EntityManager, EntitySlot};
pub use error::{DecodeError, DecodeResult, ErrorKind, ProviderError};
pub use fallback::{FallbackBuilders, FallbackChain, FallbackDefaults};
pub use outcome::{FailureInfo, Outcome};
pub use path::{ObjectPathLookup, PathExpression};
pub use provider::{ArcBuilder, ArcProvider, Builder, Provider, ProviderResult};
