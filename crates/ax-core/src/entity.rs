//! Entity kinds and the identity-only references that point at them

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for unrecognised entity types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityKindError {
    #[error("entity type cannot be empty")]
    Empty,

    #[error("unknown entity type '{0}'")]
    Unknown(String),
}

/// The closed set of domain entities an automation can reference
///
/// Adding a kind here forces every exhaustive match over it (context keys,
/// relationship targets) to be updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Tenant,
    Organisation,
    Product,
    Portal,
    Quote,
    QuoteVersion,
    Policy,
    PolicyTransaction,
    Claim,
    ClaimVersion,
    Customer,
    Person,
    User,
    Document,
    EmailMessage,
    Report,
}

impl EntityKind {
    /// Every entity kind, in declaration order
    pub const ALL: [EntityKind; 16] = [
        EntityKind::Tenant,
        EntityKind::Organisation,
        EntityKind::Product,
        EntityKind::Portal,
        EntityKind::Quote,
        EntityKind::QuoteVersion,
        EntityKind::Policy,
        EntityKind::PolicyTransaction,
        EntityKind::Claim,
        EntityKind::ClaimVersion,
        EntityKind::Customer,
        EntityKind::Person,
        EntityKind::User,
        EntityKind::Document,
        EntityKind::EmailMessage,
        EntityKind::Report,
    ];

    /// Machine name, also the default context key for an entity of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Tenant => "tenant",
            EntityKind::Organisation => "organisation",
            EntityKind::Product => "product",
            EntityKind::Portal => "portal",
            EntityKind::Quote => "quote",
            EntityKind::QuoteVersion => "quoteVersion",
            EntityKind::Policy => "policy",
            EntityKind::PolicyTransaction => "policyTransaction",
            EntityKind::Claim => "claim",
            EntityKind::ClaimVersion => "claimVersion",
            EntityKind::Customer => "customer",
            EntityKind::Person => "person",
            EntityKind::User => "user",
            EntityKind::Document => "document",
            EntityKind::EmailMessage => "emailMessage",
            EntityKind::Report => "report",
        }
    }

    /// Default context key for a list of entities of this kind
    pub fn list_key(&self) -> &'static str {
        match self {
            EntityKind::Tenant => "tenants",
            EntityKind::Organisation => "organisations",
            EntityKind::Product => "products",
            EntityKind::Portal => "portals",
            EntityKind::Quote => "quotes",
            EntityKind::QuoteVersion => "quoteVersions",
            EntityKind::Policy => "policies",
            EntityKind::PolicyTransaction => "policyTransactions",
            EntityKind::Claim => "claims",
            EntityKind::ClaimVersion => "claimVersions",
            EntityKind::Customer => "customers",
            EntityKind::Person => "people",
            EntityKind::User => "users",
            EntityKind::Document => "documents",
            EntityKind::EmailMessage => "emailMessages",
            EntityKind::Report => "reports",
        }
    }
}

impl FromStr for EntityKind {
    type Err = EntityKindError;

    /// Parses the machine name, ignoring case (`quoteVersion`, `QuoteVersion`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(EntityKindError::Empty);
        }
        EntityKind::ALL
            .iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(trimmed))
            .copied()
            .ok_or_else(|| EntityKindError::Unknown(trimmed.to_string()))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a single entity: its kind and id, without any loaded data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityReference {
    #[serde(rename = "entityType")]
    pub kind: EntityKind,
    pub id: String,
}

impl EntityReference {
    /// Create a new reference
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// The identity projection exposed for a stub that was never hydrated
    pub fn to_json(&self) -> Value {
        json!({ "id": self.id, "entityType": self.kind })
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// "All entities of a kind related to another entity"
///
/// Resolved only when enumerated, by a list query collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityListReference {
    #[serde(rename = "entityType")]
    pub kind: EntityKind,

    /// The entity the listed entities relate to (e.g. the customer owning the claims)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_to: Option<EntityReference>,

    /// Opaque filters forwarded to the list query collaborator
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub filters: IndexMap<String, Value>,
}

impl EntityListReference {
    /// Create a list reference over every entity of a kind
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            related_to: None,
            filters: IndexMap::new(),
        }
    }

    /// Restrict the list to entities related to `related_to`
    pub fn related_to(mut self, related_to: EntityReference) -> Self {
        self.related_to = Some(related_to);
        self
    }

    /// Add a filter
    pub fn with_filter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.filters.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity_kind() {
        assert_eq!("quote".parse::<EntityKind>().unwrap(), EntityKind::Quote);
        assert_eq!(
            "PolicyTransaction".parse::<EntityKind>().unwrap(),
            EntityKind::PolicyTransaction
        );
        assert_eq!(
            " emailMessage ".parse::<EntityKind>().unwrap(),
            EntityKind::EmailMessage
        );
    }

    #[test]
    fn test_parse_entity_kind_errors() {
        assert_eq!("".parse::<EntityKind>().unwrap_err(), EntityKindError::Empty);
        assert_eq!(
            "spaceship".parse::<EntityKind>().unwrap_err(),
            EntityKindError::Unknown("spaceship".to_string())
        );
    }

    #[test]
    fn test_names_round_trip_through_serde() {
        for kind in EntityKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, Value::String(kind.as_str().to_string()));
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_reference_json() {
        let reference = EntityReference::new(EntityKind::Quote, "q-1");
        assert_eq!(
            reference.to_json(),
            json!({ "id": "q-1", "entityType": "quote" })
        );
        assert_eq!(reference.to_string(), "quote/q-1");
    }
}
