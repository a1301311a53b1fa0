//! In-memory entity store
//!
//! Implements both entity collaborator contracts over a map of JSON
//! projections. Every call is counted so callers can verify how many
//! hydrations a run actually performed.

use async_trait::async_trait;
use ax_core::{EntityKind, EntityListReference};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::trace;

use crate::{EntityListQueryService, EntityQuery, EntityQueryService, QueryError};

/// Entity projections keyed by kind and id
#[derive(Default)]
pub struct InMemoryEntityStore {
    entities: DashMap<(EntityKind, String), Value>,
    entity_loads: AtomicUsize,
    list_loads: AtomicUsize,
    queries: Mutex<Vec<EntityQuery>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entity projection
    pub fn insert(&self, kind: EntityKind, id: impl Into<String>, data: Value) {
        self.entities.insert((kind, id.into()), data);
    }

    /// Builder-style insert
    pub fn with_entity(self, kind: EntityKind, id: impl Into<String>, data: Value) -> Self {
        self.insert(kind, id, data);
        self
    }

    /// Number of single-entity loads served
    pub fn entity_load_count(&self) -> usize {
        self.entity_loads.load(Ordering::SeqCst)
    }

    /// Number of entity list loads served
    pub fn list_load_count(&self) -> usize {
        self.list_loads.load(Ordering::SeqCst)
    }

    /// Every single-entity query received, in order
    pub fn received_queries(&self) -> Vec<EntityQuery> {
        self.queries
            .lock()
            .map(|queries| queries.clone())
            .unwrap_or_default()
    }

    /// Whether an entity relates to `reference.related_to` by its `<kind>Id` field
    fn is_related(data: &Value, reference: &EntityListReference) -> bool {
        let Some(related) = &reference.related_to else {
            return true;
        };
        let field = format!("{}Id", related.kind.as_str());
        data.get(&field).and_then(Value::as_str) == Some(related.id.as_str())
    }

    fn matches_filters(data: &Value, reference: &EntityListReference) -> bool {
        reference
            .filters
            .iter()
            .all(|(key, expected)| data.get(key) == Some(expected))
    }
}

#[async_trait]
impl EntityQueryService for InMemoryEntityStore {
    async fn load_entity(&self, query: EntityQuery) -> Result<Option<Value>, QueryError> {
        self.entity_loads.fetch_add(1, Ordering::SeqCst);
        trace!(kind = %query.kind, id = %query.id, "Loading entity from memory");

        let found = self
            .entities
            .get(&(query.kind, query.id.clone()))
            .map(|entry| entry.value().clone());

        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query);
        }

        Ok(found)
    }
}

#[async_trait]
impl EntityListQueryService for InMemoryEntityStore {
    async fn load_entity_list(
        &self,
        _tenant_id: &str,
        reference: &EntityListReference,
        _related_paths: &BTreeSet<String>,
        max_items: usize,
    ) -> Result<Vec<Value>, QueryError> {
        self.list_loads.fetch_add(1, Ordering::SeqCst);

        let mut items: Vec<(String, Value)> = self
            .entities
            .iter()
            .filter(|entry| entry.key().0 == reference.kind)
            .filter(|entry| Self::is_related(entry.value(), reference))
            .filter(|entry| Self::matches_filters(entry.value(), reference))
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect();

        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items
            .into_iter()
            .take(max_items)
            .map(|(_, data)| data)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_core::EntityReference;
    use serde_json::json;

    fn store() -> InMemoryEntityStore {
        InMemoryEntityStore::new()
            .with_entity(EntityKind::Claim, "c-2", json!({"id": "c-2", "customerId": "cu-1"}))
            .with_entity(EntityKind::Claim, "c-1", json!({"id": "c-1", "customerId": "cu-1"}))
            .with_entity(EntityKind::Claim, "c-3", json!({"id": "c-3", "customerId": "cu-2"}))
    }

    #[tokio::test]
    async fn test_load_entity_counts_calls() {
        let store = store();
        let query = EntityQuery {
            tenant_id: "t-1".to_string(),
            kind: EntityKind::Claim,
            id: "c-1".to_string(),
            include: BTreeSet::new(),
        };

        let found = store.load_entity(query.clone()).await.unwrap();
        assert_eq!(found.unwrap()["id"], "c-1");

        let missing = store
            .load_entity(EntityQuery {
                id: "nope".to_string(),
                ..query
            })
            .await
            .unwrap();
        assert!(missing.is_none());
        assert_eq!(store.entity_load_count(), 2);
        assert_eq!(store.received_queries().len(), 2);
    }

    #[tokio::test]
    async fn test_list_filters_by_relation() {
        let store = store();
        let reference = EntityListReference::new(EntityKind::Claim)
            .related_to(EntityReference::new(EntityKind::Customer, "cu-1"));

        let items = store
            .load_entity_list("t-1", &reference, &BTreeSet::new(), 100)
            .await
            .unwrap();

        let ids: Vec<_> = items.iter().map(|i| i["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["c-1", "c-2"]);
        assert_eq!(store.list_load_count(), 1);
    }

    #[tokio::test]
    async fn test_list_respects_max_items() {
        let store = store();
        let reference = EntityListReference::new(EntityKind::Claim);
        let items = store
            .load_entity_list("t-1", &reference, &BTreeSet::new(), 2)
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }
}
