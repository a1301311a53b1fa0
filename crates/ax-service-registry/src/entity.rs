//! Collaborator contracts for loading entities

use async_trait::async_trait;
use ax_core::{EntityKind, EntityListReference};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors reported by collaborator services
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("query not found: {0}")]
    NotFound(String),

    #[error("query failed: {0}")]
    Failed(String),

    #[error("invalid query parameters: {0}")]
    InvalidParameters(String),
}

/// Request to hydrate a single entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityQuery {
    pub tenant_id: String,
    pub kind: EntityKind,
    pub id: String,
    /// Related properties to join into the projection (e.g. "customer.fullName")
    ///
    /// Additive only: gathered from static paths at compile time, so it never
    /// lists what `contextEntity` or a computed path will read. Services must
    /// still return the entity's own properties when it is empty.
    pub include: BTreeSet<String>,
}

/// Loads the full projection of an entity by type and id
#[async_trait]
pub trait EntityQueryService: Send + Sync {
    /// Returns `Ok(None)` when no entity with that id exists
    async fn load_entity(&self, query: EntityQuery) -> Result<Option<Value>, QueryError>;
}

/// Materializes a list-typed entity reference
#[async_trait]
pub trait EntityListQueryService: Send + Sync {
    async fn load_entity_list(
        &self,
        tenant_id: &str,
        reference: &EntityListReference,
        related_paths: &BTreeSet<String>,
        max_items: usize,
    ) -> Result<Vec<Value>, QueryError>;
}
