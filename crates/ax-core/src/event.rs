//! Trigger events and the entity relationships they carry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntityKind, EntityReference};

/// How an entity is related to the event that triggered an automation
///
/// Each relationship type populates exactly one context key with exactly one
/// entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipType {
    OrganisationEvent,
    ProductEvent,
    PortalEvent,
    QuoteEvent,
    QuoteVersionEvent,
    PolicyEvent,
    PolicyTransactionEvent,
    ClaimEvent,
    ClaimVersionEvent,
    CustomerEvent,
    PersonEvent,
    UserEvent,
    DocumentEvent,
    EmailMessageEvent,
    PerformingUserEvent,
}

impl RelationshipType {
    /// The context key and entity kind this relationship populates
    pub fn target(&self) -> (&'static str, EntityKind) {
        match self {
            RelationshipType::OrganisationEvent => ("organisation", EntityKind::Organisation),
            RelationshipType::ProductEvent => ("product", EntityKind::Product),
            RelationshipType::PortalEvent => ("portal", EntityKind::Portal),
            RelationshipType::QuoteEvent => ("quote", EntityKind::Quote),
            RelationshipType::QuoteVersionEvent => ("quoteVersion", EntityKind::QuoteVersion),
            RelationshipType::PolicyEvent => ("policy", EntityKind::Policy),
            RelationshipType::PolicyTransactionEvent => {
                ("policyTransaction", EntityKind::PolicyTransaction)
            }
            RelationshipType::ClaimEvent => ("claim", EntityKind::Claim),
            RelationshipType::ClaimVersionEvent => ("claimVersion", EntityKind::ClaimVersion),
            RelationshipType::CustomerEvent => ("customer", EntityKind::Customer),
            RelationshipType::PersonEvent => ("person", EntityKind::Person),
            RelationshipType::UserEvent => ("user", EntityKind::User),
            RelationshipType::DocumentEvent => ("document", EntityKind::Document),
            RelationshipType::EmailMessageEvent => ("emailMessage", EntityKind::EmailMessage),
            RelationshipType::PerformingUserEvent => ("performingUser", EntityKind::User),
        }
    }
}

/// A relationship between the triggering event and an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub relationship_type: RelationshipType,
    pub entity_id: String,
}

impl Relationship {
    /// Create a new relationship
    pub fn new(relationship_type: RelationshipType, entity_id: impl Into<String>) -> Self {
        Self {
            relationship_type,
            entity_id: entity_id.into(),
        }
    }

    /// Context key populated by this relationship
    pub fn context_key(&self) -> &'static str {
        self.relationship_type.target().0
    }

    /// Stub reference for the related entity
    pub fn to_reference(&self) -> EntityReference {
        EntityReference::new(self.relationship_type.target().1, self.entity_id.clone())
    }
}

/// The business event an automation run was triggered by
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    /// Event type (e.g. "quoteSubmitted")
    pub event_type: String,

    /// Entities related to the event
    #[serde(default)]
    pub relationships: Vec<Relationship>,

    /// Free-form event payload, exposed under the `trigger` path root
    #[serde(default)]
    pub payload: serde_json::Value,

    /// When the event happened
    pub time_fired: DateTime<Utc>,
}

impl TriggerEvent {
    /// Create a new event with current timestamp
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            relationships: Vec::new(),
            payload: serde_json::Value::Null,
            time_fired: Utc::now(),
        }
    }

    /// Attach a related entity
    pub fn with_relationship(
        mut self,
        relationship_type: RelationshipType,
        entity_id: impl Into<String>,
    ) -> Self {
        self.relationships
            .push(Relationship::new(relationship_type, entity_id));
        self
    }

    /// Set the event payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// JSON exposed under the `trigger` path root
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "eventType": self.event_type,
            "timeFired": self.time_fired.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            "payload": self.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_targets() {
        let relationship = Relationship::new(RelationshipType::PolicyEvent, "p-1");
        assert_eq!(relationship.context_key(), "policy");
        assert_eq!(
            relationship.to_reference(),
            EntityReference::new(EntityKind::Policy, "p-1")
        );

        let (key, kind) = RelationshipType::PerformingUserEvent.target();
        assert_eq!(key, "performingUser");
        assert_eq!(kind, EntityKind::User);
    }

    #[test]
    fn test_event_deserialize() {
        let event: TriggerEvent = serde_json::from_value(serde_json::json!({
            "eventType": "claimLodged",
            "relationships": [
                { "relationshipType": "claimEvent", "entityId": "c-9" }
            ],
            "timeFired": "2024-03-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(event.relationships.len(), 1);
        assert_eq!(event.relationships[0].context_key(), "claim");
        assert!(event.payload.is_null());
    }
}
