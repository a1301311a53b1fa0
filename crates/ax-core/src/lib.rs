//! Core types for automation evaluation
//!
//! This crate provides the fundamental types shared by the automation engine
//! and its collaborators: entity kinds and references, trigger events and
//! their relationships, the per-run automation data and the diagnostic bag
//! attached to every failure.

mod automation_data;
mod debug;
mod entity;
mod event;

pub use automation_data::{AutomationData, DeploymentEnvironment};
pub use debug::{truncate_for_debug, DebugContext};
pub use entity::{EntityKind, EntityKindError, EntityListReference, EntityReference};
pub use event::{Relationship, RelationshipType, TriggerEvent};

/// Default maximum length of a value recorded in a [`DebugContext`]
pub const MAX_DEBUG_VALUE_LENGTH: usize = 80;

/// Well-known top-level roots of a path expression
pub mod roots {
    /// Entities and ad hoc values of the current run
    pub const CONTEXT: &str = "context";

    /// Payload of the triggering event
    pub const TRIGGER: &str = "trigger";

    /// Tenant, organisation, product and environment identifiers
    pub const SYSTEM: &str = "system";
}
