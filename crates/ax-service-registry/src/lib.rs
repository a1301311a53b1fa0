//! Service locator for the automation engine
//!
//! Builders receive a [`ServiceLocator`] when they construct providers, and
//! every provider context holds one for on-demand entity hydration. The
//! locator bundles the collaborator contracts the engine consumes: entity
//! loading, entity list materialization, a clock and the query mediator.

mod clock;
mod entity;
mod memory;
mod registry;

use std::sync::Arc;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::{EntityListQueryService, EntityQuery, EntityQueryService, QueryError};
pub use memory::InMemoryEntityStore;
pub use registry::{QueryFuture, QueryHandler, QueryRegistry, QueryResult};

/// Collaborators available to builders and provider contexts
#[derive(Clone)]
pub struct ServiceLocator {
    entities: Option<Arc<dyn EntityQueryService>>,
    entity_lists: Option<Arc<dyn EntityListQueryService>>,
    clock: Arc<dyn Clock>,
    queries: Arc<QueryRegistry>,
}

impl ServiceLocator {
    /// Create a locator with the system clock and no entity services
    pub fn new() -> Self {
        Self {
            entities: None,
            entity_lists: None,
            clock: Arc::new(SystemClock),
            queries: Arc::new(QueryRegistry::new()),
        }
    }

    pub fn with_entity_service(mut self, service: Arc<dyn EntityQueryService>) -> Self {
        self.entities = Some(service);
        self
    }

    pub fn with_entity_list_service(mut self, service: Arc<dyn EntityListQueryService>) -> Self {
        self.entity_lists = Some(service);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_queries(mut self, queries: Arc<QueryRegistry>) -> Self {
        self.queries = queries;
        self
    }

    /// Register the same store as both entity and entity list service
    pub fn with_store(self, store: Arc<InMemoryEntityStore>) -> Self {
        self.with_entity_service(store.clone())
            .with_entity_list_service(store)
    }

    pub fn entity_service(&self) -> Option<&Arc<dyn EntityQueryService>> {
        self.entities.as_ref()
    }

    pub fn entity_list_service(&self) -> Option<&Arc<dyn EntityListQueryService>> {
        self.entity_lists.as_ref()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn queries(&self) -> &Arc<QueryRegistry> {
        &self.queries
    }
}

impl Default for ServiceLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceLocator")
            .field("entities", &self.entities.is_some())
            .field("entity_lists", &self.entity_lists.is_some())
            .field("queries", &self.queries.query_count())
            .finish()
    }
}

/// Thread-safe shared locator
pub type SharedServiceLocator = Arc<ServiceLocator>;
