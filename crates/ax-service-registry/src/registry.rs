//! Query mediator with async handlers
//!
//! Cross-cutting lookups that are not entity loads (e.g. resolving an
//! authentication method by id) are dispatched by name to a registered
//! handler. The engine treats handlers as opaque read-only collaborators.

use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::QueryError;

/// Result type for query dispatch
pub type QueryResult = Result<Value, QueryError>;

/// Future type for async query handlers
pub type QueryFuture = Pin<Box<dyn Future<Output = QueryResult> + Send>>;

/// Query handler function type
pub type QueryHandler = Arc<dyn Fn(Value) -> QueryFuture + Send + Sync>;

/// The query registry routes named queries to their handlers
pub struct QueryRegistry {
    handlers: DashMap<String, QueryHandler>,
}

impl QueryRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register a handler for a query name, replacing any previous one
    #[instrument(skip(self, name, handler))]
    pub fn register<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryResult> + Send + 'static,
    {
        let name = name.into();
        debug!(query = %name, "Registering query handler");

        let handler: QueryHandler =
            Arc::new(move |params| Box::pin(handler(params)) as QueryFuture);
        self.handlers.insert(name, handler);
    }

    /// Dispatch a query to its handler
    #[instrument(skip(self, parameters))]
    pub async fn dispatch(&self, name: &str, parameters: Value) -> QueryResult {
        let handler = self
            .handlers
            .get(name)
            .map(|h| h.clone())
            .ok_or_else(|| {
                warn!(query = %name, "Query not found");
                QueryError::NotFound(name.to_string())
            })?;

        debug!(query = %name, "Dispatching query");
        handler(parameters).await
    }

    /// Check if a query has a handler
    pub fn has_query(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Names of all registered queries, sorted
    pub fn query_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.iter().map(|h| h.key().clone()).collect();
        names.sort();
        names
    }

    /// Unregister a query
    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    /// Get total number of registered queries
    pub fn query_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_dispatch() {
        let registry = QueryRegistry::new();

        registry.register("echo", |params: Value| async move { Ok(params) });

        let result = registry
            .dispatch("echo", json!({"msg": "hello"}))
            .await
            .unwrap();

        assert_eq!(result, json!({"msg": "hello"}));
    }

    #[tokio::test]
    async fn test_query_not_found() {
        let registry = QueryRegistry::new();

        let result = registry.dispatch("nonexistent", json!({})).await;

        assert!(matches!(result, Err(QueryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_handler_error() {
        let registry = QueryRegistry::new();

        registry.register("fail", |_: Value| async move {
            Err(QueryError::Failed("intentional failure".to_string()))
        });

        let result = registry.dispatch("fail", json!({})).await;

        assert!(matches!(result, Err(QueryError::Failed(_))));
    }

    #[test]
    fn test_query_names_and_unregister() {
        let registry = QueryRegistry::new();

        registry.register("b", |_: Value| async { Ok(Value::Null) });
        registry.register("a", |_: Value| async { Ok(Value::Null) });

        assert_eq!(registry.query_names(), vec!["a", "b"]);
        assert!(registry.has_query("a"));
        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a")); // Already removed
        assert_eq!(registry.query_count(), 1);
    }
}
