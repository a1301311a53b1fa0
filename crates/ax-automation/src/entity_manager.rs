//! Context entities and lazy hydration
//!
//! The manager owns every entity reachable under the `context` root for one
//! run. Well-known keys live in fixed slots; anything else an automation
//! adds goes to an open extension map. Entities start as identity-only stubs
//! and are hydrated in place the first time a path reads a property other
//! than `id`. A slot is hydrated at most once per run.

use ax_core::{AutomationData, EntityKind, EntityListReference, EntityReference};
use ax_service_registry::EntityQuery;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use crate::context::ProviderContext;
use crate::data::EntityValue;
use crate::error::ProviderError;
use crate::outcome::Outcome;
use crate::path::{not_found, outcome_from_walk, walk, PathExpression};
use ax_core::roots;

const ENTITY_SERVICE: &str = "entity query service";
const ENTITY_LIST_SERVICE: &str = "entity list query service";

/// The context keys with a dedicated slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
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
    PerformingUser,
    Document,
    EmailMessage,
}

impl ContextKey {
    pub const ALL: [ContextKey; 16] = [
        ContextKey::Tenant,
        ContextKey::Organisation,
        ContextKey::Product,
        ContextKey::Portal,
        ContextKey::Quote,
        ContextKey::QuoteVersion,
        ContextKey::Policy,
        ContextKey::PolicyTransaction,
        ContextKey::Claim,
        ContextKey::ClaimVersion,
        ContextKey::Customer,
        ContextKey::Person,
        ContextKey::User,
        ContextKey::PerformingUser,
        ContextKey::Document,
        ContextKey::EmailMessage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKey::Tenant => "tenant",
            ContextKey::Organisation => "organisation",
            ContextKey::Product => "product",
            ContextKey::Portal => "portal",
            ContextKey::Quote => "quote",
            ContextKey::QuoteVersion => "quoteVersion",
            ContextKey::Policy => "policy",
            ContextKey::PolicyTransaction => "policyTransaction",
            ContextKey::Claim => "claim",
            ContextKey::ClaimVersion => "claimVersion",
            ContextKey::Customer => "customer",
            ContextKey::Person => "person",
            ContextKey::User => "user",
            ContextKey::PerformingUser => "performingUser",
            ContextKey::Document => "document",
            ContextKey::EmailMessage => "emailMessage",
        }
    }

    /// The entity kind a slot holds
    pub fn kind(&self) -> EntityKind {
        match self {
            ContextKey::Tenant => EntityKind::Tenant,
            ContextKey::Organisation => EntityKind::Organisation,
            ContextKey::Product => EntityKind::Product,
            ContextKey::Portal => EntityKind::Portal,
            ContextKey::Quote => EntityKind::Quote,
            ContextKey::QuoteVersion => EntityKind::QuoteVersion,
            ContextKey::Policy => EntityKind::Policy,
            ContextKey::PolicyTransaction => EntityKind::PolicyTransaction,
            ContextKey::Claim => EntityKind::Claim,
            ContextKey::ClaimVersion => EntityKind::ClaimVersion,
            ContextKey::Customer => EntityKind::Customer,
            ContextKey::Person => EntityKind::Person,
            ContextKey::User | ContextKey::PerformingUser => EntityKind::User,
            ContextKey::Document => EntityKind::Document,
            ContextKey::EmailMessage => EntityKind::EmailMessage,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

/// Add `id` and `entityType` to a loaded projection when it lacks them
fn with_identity(reference: &EntityReference, data: Value) -> Value {
    match data {
        Value::Object(mut map) => {
            map.entry("id")
                .or_insert_with(|| Value::String(reference.id.clone()));
            map.entry("entityType")
                .or_insert_with(|| Value::String(reference.kind.as_str().to_string()));
            Value::Object(map)
        }
        other => other,
    }
}

/// A single entity: a stub until hydrated
pub struct EntitySlot {
    reference: EntityReference,
    /// `Some(None)` records that the entity does not exist
    loaded: OnceCell<Option<Value>>,
}

impl EntitySlot {
    /// Identity-only reference
    pub fn stub(reference: EntityReference) -> Self {
        Self {
            reference,
            loaded: OnceCell::new(),
        }
    }

    /// Entity whose data is already known
    pub fn hydrated(reference: EntityReference, data: Value) -> Self {
        let data = with_identity(&reference, data);
        Self {
            reference,
            loaded: OnceCell::new_with(Some(Some(data))),
        }
    }

    pub fn reference(&self) -> &EntityReference {
        &self.reference
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.loaded.get(), Some(Some(_)))
    }

    /// Loaded data, or the identity projection for a stub
    pub fn snapshot(&self) -> Value {
        match self.loaded.get() {
            Some(Some(data)) => data.clone(),
            _ => self.reference.to_json(),
        }
    }

    /// Load the full projection once; `None` when the entity does not exist
    #[instrument(skip(self, ctx), fields(kind = %self.reference.kind, id = %self.reference.id))]
    async fn hydrate(
        &self,
        ctx: &ProviderContext,
        key: &str,
        schema_key: &'static str,
    ) -> Result<Option<&Value>, ProviderError> {
        if let Some(loaded) = self.loaded.get() {
            return Ok(loaded.as_ref());
        }
        let loaded = self
            .loaded
            .get_or_try_init(|| async {
                let query = EntityQuery {
                    tenant_id: ctx.data().tenant_id.clone(),
                    kind: self.reference.kind,
                    id: self.reference.id.clone(),
                    include: ctx.hints().sub_paths(key),
                };
                debug!(include = ?query.include, "Hydrating context entity");
                let found = load_entity(ctx, query, schema_key).await?;
                Ok::<_, ProviderError>(found.map(|data| with_identity(&self.reference, data)))
            })
            .await?;
        Ok(loaded.as_ref())
    }
}

impl fmt::Debug for EntitySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySlot")
            .field("reference", &self.reference)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// A list-typed entity reference, materialized on first enumeration
pub struct EntityListSlot {
    reference: EntityListReference,
    items: OnceCell<Vec<Value>>,
}

impl EntityListSlot {
    pub fn new(reference: EntityListReference) -> Self {
        Self {
            reference,
            items: OnceCell::new(),
        }
    }

    pub fn reference(&self) -> &EntityListReference {
        &self.reference
    }

    pub fn is_loaded(&self) -> bool {
        self.items.initialized()
    }

    fn snapshot(&self) -> Value {
        match self.items.get() {
            Some(items) => Value::Array(items.clone()),
            None => serde_json::to_value(&self.reference).unwrap_or(Value::Null),
        }
    }

    #[instrument(skip(self, ctx), fields(kind = %self.reference.kind))]
    async fn materialize(
        &self,
        ctx: &ProviderContext,
        key: &str,
        schema_key: &'static str,
    ) -> Result<&Vec<Value>, ProviderError> {
        self.items
            .get_or_try_init(|| async {
                let services = ctx.require_services(ENTITY_LIST_SERVICE, schema_key)?;
                let service = services.entity_list_service().ok_or_else(|| {
                    ProviderError::ServiceProviderNotFound {
                        service: ENTITY_LIST_SERVICE.to_string(),
                        debug: ctx.debug_context(schema_key),
                    }
                })?;
                let related_paths = ctx.hints().sub_paths(key);
                debug!(related = ?related_paths, "Materializing entity list");
                let kind = self.reference.kind;
                ctx.guard(async {
                    service
                        .load_entity_list(
                            &ctx.data().tenant_id,
                            &self.reference,
                            &related_paths,
                            ctx.settings().max_list_size,
                        )
                        .await
                        .map(|items| {
                            items
                                .into_iter()
                                .map(|item| match item {
                                    Value::Object(mut map) => {
                                        map.entry("entityType").or_insert_with(|| {
                                            Value::String(kind.as_str().to_string())
                                        });
                                        Value::Object(map)
                                    }
                                    other => other,
                                })
                                .collect::<Vec<_>>()
                        })
                        .map_err(|source| ProviderError::Query {
                            schema_key,
                            source,
                            debug: ctx.debug_context(schema_key),
                        })
                })
                .await
            })
            .await
    }
}

impl fmt::Debug for EntityListSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityListSlot")
            .field("reference", &self.reference)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// An entry under a key outside the fixed slots
#[derive(Debug)]
pub enum ContextEntry {
    Entity(EntitySlot),
    EntityList(EntityListSlot),
    Value(Value),
}

/// Load one entity through the entity query service
async fn load_entity(
    ctx: &ProviderContext,
    query: EntityQuery,
    schema_key: &'static str,
) -> Result<Option<Value>, ProviderError> {
    let services = ctx.require_services(ENTITY_SERVICE, schema_key)?;
    let service = services
        .entity_service()
        .ok_or_else(|| ProviderError::ServiceProviderNotFound {
            service: ENTITY_SERVICE.to_string(),
            debug: ctx.debug_context(schema_key),
        })?;
    ctx.guard(async {
        service
            .load_entity(query)
            .await
            .map_err(|source| ProviderError::Query {
                schema_key,
                source,
                debug: ctx.debug_context(schema_key),
            })
    })
    .await
}

/// Entities and values available under the `context` root
#[derive(Default)]
pub struct EntityManager {
    tenant: Option<EntitySlot>,
    organisation: Option<EntitySlot>,
    product: Option<EntitySlot>,
    portal: Option<EntitySlot>,
    quote: Option<EntitySlot>,
    quote_version: Option<EntitySlot>,
    policy: Option<EntitySlot>,
    policy_transaction: Option<EntitySlot>,
    claim: Option<EntitySlot>,
    claim_version: Option<EntitySlot>,
    customer: Option<EntitySlot>,
    person: Option<EntitySlot>,
    user: Option<EntitySlot>,
    performing_user: Option<EntitySlot>,
    document: Option<EntitySlot>,
    email_message: Option<EntitySlot>,
    extra: IndexMap<String, ContextEntry>,
    dynamic: Mutex<HashMap<EntityReference, Arc<OnceCell<Option<Value>>>>>,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate stubs from the run's automation data
    ///
    /// Tenant is always present; organisation, product and performing user
    /// when known; then one stub per relationship of the triggering event.
    pub fn from_data(data: &AutomationData) -> Self {
        let mut manager = Self::new();
        manager.set_stub(
            ContextKey::Tenant,
            EntityReference::new(EntityKind::Tenant, data.tenant_id.clone()),
        );
        if let Some(id) = &data.organisation_id {
            manager.set_stub(
                ContextKey::Organisation,
                EntityReference::new(EntityKind::Organisation, id.clone()),
            );
        }
        if let Some(id) = &data.product_id {
            manager.set_stub(
                ContextKey::Product,
                EntityReference::new(EntityKind::Product, id.clone()),
            );
        }
        if let Some(id) = &data.performing_user_id {
            manager.set_stub(
                ContextKey::PerformingUser,
                EntityReference::new(EntityKind::User, id.clone()),
            );
        }
        if let Some(trigger) = &data.trigger {
            for relationship in &trigger.relationships {
                let reference = relationship.to_reference();
                match ContextKey::from_name(relationship.context_key()) {
                    Some(key) => manager.set_stub(key, reference),
                    None => manager.insert(
                        relationship.context_key(),
                        ContextEntry::Entity(EntitySlot::stub(reference)),
                    ),
                }
            }
        }
        for (key, value) in &data.variables {
            manager.insert(key.clone(), ContextEntry::Value(value.clone()));
        }
        for (key, list) in &data.entity_lists {
            manager.insert(
                key.clone(),
                ContextEntry::EntityList(EntityListSlot::new(list.clone())),
            );
        }
        manager
    }

    fn slot(&self, key: ContextKey) -> &Option<EntitySlot> {
        match key {
            ContextKey::Tenant => &self.tenant,
            ContextKey::Organisation => &self.organisation,
            ContextKey::Product => &self.product,
            ContextKey::Portal => &self.portal,
            ContextKey::Quote => &self.quote,
            ContextKey::QuoteVersion => &self.quote_version,
            ContextKey::Policy => &self.policy,
            ContextKey::PolicyTransaction => &self.policy_transaction,
            ContextKey::Claim => &self.claim,
            ContextKey::ClaimVersion => &self.claim_version,
            ContextKey::Customer => &self.customer,
            ContextKey::Person => &self.person,
            ContextKey::User => &self.user,
            ContextKey::PerformingUser => &self.performing_user,
            ContextKey::Document => &self.document,
            ContextKey::EmailMessage => &self.email_message,
        }
    }

    fn slot_mut(&mut self, key: ContextKey) -> &mut Option<EntitySlot> {
        match key {
            ContextKey::Tenant => &mut self.tenant,
            ContextKey::Organisation => &mut self.organisation,
            ContextKey::Product => &mut self.product,
            ContextKey::Portal => &mut self.portal,
            ContextKey::Quote => &mut self.quote,
            ContextKey::QuoteVersion => &mut self.quote_version,
            ContextKey::Policy => &mut self.policy,
            ContextKey::PolicyTransaction => &mut self.policy_transaction,
            ContextKey::Claim => &mut self.claim,
            ContextKey::ClaimVersion => &mut self.claim_version,
            ContextKey::Customer => &mut self.customer,
            ContextKey::Person => &mut self.person,
            ContextKey::User => &mut self.user,
            ContextKey::PerformingUser => &mut self.performing_user,
            ContextKey::Document => &mut self.document,
            ContextKey::EmailMessage => &mut self.email_message,
        }
    }

    /// Put an identity-only stub in a fixed slot
    pub fn set_stub(&mut self, key: ContextKey, reference: EntityReference) {
        *self.slot_mut(key) = Some(EntitySlot::stub(reference));
    }

    /// Put an already loaded entity in a fixed slot
    pub fn set_hydrated(&mut self, key: ContextKey, reference: EntityReference, data: Value) {
        *self.slot_mut(key) = Some(EntitySlot::hydrated(reference, data));
    }

    /// Add an entry under a key; fixed slot names are routed to their slot
    pub fn insert(&mut self, key: impl Into<String>, entry: ContextEntry) {
        let key = key.into();
        match (ContextKey::from_name(&key), entry) {
            (Some(fixed), ContextEntry::Entity(slot)) => *self.slot_mut(fixed) = Some(slot),
            (_, entry) => {
                self.extra.insert(key, entry);
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entry(key).is_some()
    }

    /// Every populated key, fixed slots first
    pub fn keys(&self) -> Vec<String> {
        ContextKey::ALL
            .iter()
            .filter(|key| self.slot(**key).is_some())
            .map(|key| key.as_str().to_string())
            .chain(self.extra.keys().cloned())
            .collect()
    }

    /// Whether the entity or list under `key` has been loaded
    pub fn is_loaded(&self, key: &str) -> bool {
        match self.entry(key) {
            Some(EntryRef::Entity(slot)) => slot.is_loaded(),
            Some(EntryRef::EntityList(slot)) => slot.is_loaded(),
            Some(EntryRef::Value(_)) => true,
            None => false,
        }
    }

    pub fn reference(&self, key: &str) -> Option<&EntityReference> {
        match self.entry(key)? {
            EntryRef::Entity(slot) => Some(slot.reference()),
            _ => None,
        }
    }

    fn entry(&self, key: &str) -> Option<EntryRef<'_>> {
        if let Some(fixed) = ContextKey::from_name(key) {
            if let Some(slot) = self.slot(fixed) {
                return Some(EntryRef::Entity(slot));
            }
        }
        match self.extra.get(key)? {
            ContextEntry::Entity(slot) => Some(EntryRef::Entity(slot)),
            ContextEntry::EntityList(slot) => Some(EntryRef::EntityList(slot)),
            ContextEntry::Value(value) => Some(EntryRef::Value(value)),
        }
    }

    /// Current state of every entry without loading anything
    pub fn snapshot(&self) -> Value {
        let mut map = Map::new();
        for key in self.keys() {
            let value = match self.entry(&key) {
                Some(EntryRef::Entity(slot)) => slot.snapshot(),
                Some(EntryRef::EntityList(slot)) => slot.snapshot(),
                Some(EntryRef::Value(value)) => value.clone(),
                None => continue,
            };
            map.insert(key, value);
        }
        Value::Object(map)
    }

    /// Hydrate the single entity a `context` path dereferences, if needed
    ///
    /// No-op when the path is outside `context`, names an unknown key or a
    /// non-entity entry, or reads nothing but `id`.
    pub async fn load_entity_at_path(
        &self,
        ctx: &ProviderContext,
        path: &PathExpression,
        schema_key: &'static str,
    ) -> Result<(), ProviderError> {
        let segments = path.segments();
        if segments.len() < 2 || segments[0] != roots::CONTEXT {
            return Ok(());
        }
        let rest = &segments[2..];
        if rest.len() == 1 && rest[0] == "id" {
            return Ok(());
        }
        if let Some(EntryRef::Entity(slot)) = self.entry(&segments[1]) {
            slot.hydrate(ctx, &segments[1], schema_key).await?;
        }
        Ok(())
    }

    /// Raw value at a path below the `context` root
    ///
    /// `segments` excludes the leading `context`.
    pub async fn value_at(
        &self,
        ctx: &ProviderContext,
        segments: &[String],
        expression: &PathExpression,
        schema_key: &'static str,
    ) -> Result<Outcome<Value>, ProviderError> {
        let Some((key, rest)) = segments.split_first() else {
            return Ok(Outcome::Success(self.snapshot()));
        };
        let walked = match self.entry(key) {
            None => return Ok(not_found(ctx, expression, schema_key)),
            Some(EntryRef::Value(value)) => walk(value, rest),
            Some(EntryRef::Entity(slot)) => {
                if rest.len() == 1 && rest[0] == "id" {
                    return Ok(Outcome::Success(Value::String(slot.reference.id.clone())));
                }
                match slot.hydrate(ctx, key, schema_key).await? {
                    Some(data) => walk(data, rest),
                    None => return Ok(not_found(ctx, expression, schema_key)),
                }
            }
            Some(EntryRef::EntityList(slot)) => {
                let items = slot.materialize(ctx, key, schema_key).await?;
                if rest.is_empty() {
                    return Ok(Outcome::Success(Value::Array(items.clone())));
                }
                match rest[0].parse::<usize>().ok().and_then(|index| items.get(index)) {
                    Some(item) => walk(item, &rest[1..]),
                    None => return Ok(not_found(ctx, expression, schema_key)),
                }
            }
        };
        Ok(outcome_from_walk(ctx, walked, expression, schema_key))
    }

    /// The hydrated entity under a context key, `None` when absent or missing
    pub async fn entity(
        &self,
        ctx: &ProviderContext,
        key: &str,
        schema_key: &'static str,
    ) -> Result<Option<EntityValue>, ProviderError> {
        let Some(EntryRef::Entity(slot)) = self.entry(key) else {
            return Ok(None);
        };
        let reference = slot.reference().clone();
        Ok(slot
            .hydrate(ctx, key, schema_key)
            .await?
            .map(|data| EntityValue::new(Some(reference.kind), reference.id, data.clone())))
    }

    /// The materialized list under a context key, `None` when the key holds no list
    pub async fn entity_list(
        &self,
        ctx: &ProviderContext,
        key: &str,
        schema_key: &'static str,
    ) -> Result<Option<Vec<Value>>, ProviderError> {
        let Some(EntryRef::EntityList(slot)) = self.entry(key) else {
            return Ok(None);
        };
        Ok(Some(slot.materialize(ctx, key, schema_key).await?.clone()))
    }

    /// Load an entity that is not part of the context, once per run
    #[instrument(skip(self, ctx, reference), fields(reference = %reference))]
    pub async fn load_dynamic(
        &self,
        ctx: &ProviderContext,
        reference: &EntityReference,
        schema_key: &'static str,
    ) -> Result<Option<EntityValue>, ProviderError> {
        let cell = match self.dynamic.lock() {
            Ok(mut cache) => cache.entry(reference.clone()).or_default().clone(),
            Err(_) => Arc::new(OnceCell::new()),
        };
        let loaded = cell
            .get_or_try_init(|| async {
                let query = EntityQuery {
                    tenant_id: ctx.data().tenant_id.clone(),
                    kind: reference.kind,
                    id: reference.id.clone(),
                    include: Default::default(),
                };
                debug!("Loading dynamic entity");
                let found = load_entity(ctx, query, schema_key).await?;
                Ok::<_, ProviderError>(found.map(|data| with_identity(reference, data)))
            })
            .await?;
        Ok(loaded
            .clone()
            .map(|data| EntityValue::new(Some(reference.kind), reference.id.clone(), data)))
    }
}

impl fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityManager")
            .field("keys", &self.keys())
            .finish()
    }
}

enum EntryRef<'a> {
    Entity(&'a EntitySlot),
    EntityList(&'a EntityListSlot),
    Value(&'a Value),
}
