//! Per-run execution environment

use ax_core::{AutomationData, DebugContext, MAX_DEBUG_VALUE_LENGTH};
use ax_service_registry::ServiceLocator;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::decoder::PathHints;
use crate::entity_manager::EntityManager;
use crate::error::ProviderError;

/// Limits applied during one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSettings {
    /// Longest string kept in a diagnostic bag
    pub max_debug_value_length: usize,
    /// Most items materialized for one entity list
    pub max_list_size: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_debug_value_length: MAX_DEBUG_VALUE_LENGTH,
            max_list_size: 1000,
        }
    }
}

/// One fallback decision taken during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub schema_key: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub decision: String,
}

/// Everything one evaluation run needs
///
/// Created at the start of a run and dropped at its end. Never shared
/// between runs, so it is the only place per-run state may live.
pub struct ProviderContext {
    data: AutomationData,
    entities: EntityManager,
    services: Option<Arc<ServiceLocator>>,
    hints: Arc<PathHints>,
    cancellation: CancellationToken,
    settings: ContextSettings,
    now: Option<DateTime<Utc>>,
    trace: Mutex<Vec<TraceEntry>>,
}

impl ProviderContext {
    /// Create a context without services; hydration will fail with `ServiceProviderNotFound`
    pub fn new(data: AutomationData) -> Self {
        let entities = EntityManager::from_data(&data);
        Self {
            data,
            entities,
            services: None,
            hints: Arc::new(PathHints::new()),
            cancellation: CancellationToken::new(),
            settings: ContextSettings::default(),
            now: None,
            trace: Mutex::new(Vec::new()),
        }
    }

    pub fn with_services(mut self, services: Arc<ServiceLocator>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn with_path_hints(mut self, hints: Arc<PathHints>) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_settings(mut self, settings: ContextSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Pin the current time for this run
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Replace the entity manager, e.g. to seed already loaded entities
    pub fn with_entities(mut self, entities: EntityManager) -> Self {
        self.entities = entities;
        self
    }

    pub fn data(&self) -> &AutomationData {
        &self.data
    }

    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityManager {
        &mut self.entities
    }

    pub fn services(&self) -> Option<&Arc<ServiceLocator>> {
        self.services.as_ref()
    }

    /// The service locator, or `ServiceProviderNotFound` naming `service`
    pub fn require_services(
        &self,
        service: &'static str,
        schema_key: &'static str,
    ) -> Result<&Arc<ServiceLocator>, ProviderError> {
        self.services
            .as_ref()
            .ok_or_else(|| ProviderError::ServiceProviderNotFound {
                service: service.to_string(),
                debug: self.debug_context(schema_key),
            })
    }

    pub fn hints(&self) -> &PathHints {
        &self.hints
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Current time: the pinned time, else the locator's clock, else the system clock
    pub fn now(&self) -> DateTime<Utc> {
        if let Some(now) = self.now {
            return now;
        }
        match &self.services {
            Some(services) => services.clock().now(),
            None => Utc::now(),
        }
    }

    /// Fresh diagnostic bag identifying this run and the failing node
    pub fn debug_context(&self, schema_key: &'static str) -> DebugContext {
        let mut debug = DebugContext::with_max_value_length(self.settings.max_debug_value_length);
        debug.insert("tenantId", self.data.tenant_id.as_str());
        if let Some(organisation_id) = &self.data.organisation_id {
            debug.insert("organisationId", organisation_id.as_str());
        }
        if let Some(product_id) = &self.data.product_id {
            debug.insert("productId", product_id.as_str());
        }
        debug.insert("environment", self.data.environment.as_str());
        debug.insert("runId", self.data.run_id.as_str());
        debug.insert("schemaKey", schema_key);
        debug
    }

    /// Append a fallback decision to the run trace
    pub fn record(
        &self,
        schema_key: &'static str,
        path: Option<&str>,
        decision: impl Into<String>,
    ) {
        if let Ok(mut trace) = self.trace.lock() {
            trace.push(TraceEntry {
                schema_key,
                path: path.map(str::to_string),
                decision: decision.into(),
            });
        }
    }

    /// Decisions recorded so far
    pub fn trace(&self) -> Vec<TraceEntry> {
        self.trace
            .lock()
            .map(|trace| trace.clone())
            .unwrap_or_default()
    }

    /// Run a suspending operation, giving up as soon as the run is cancelled
    pub async fn guard<T, F>(&self, operation: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(ProviderError::Cancelled),
            result = operation => result,
        }
    }
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("run_id", &self.data.run_id)
            .field("tenant_id", &self.data.tenant_id)
            .field("entities", &self.entities)
            .field("has_services", &self.services.is_some())
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_core::DeploymentEnvironment;
    use ax_service_registry::FixedClock;
    use chrono::TimeZone;

    fn data() -> AutomationData {
        AutomationData::new("t-1", DeploymentEnvironment::Production).with_product("motor")
    }

    #[test]
    fn test_debug_context_identifies_run() {
        let ctx = ProviderContext::new(data());
        let debug = ctx.debug_context("staticText");
        assert_eq!(debug.get("tenantId").unwrap(), "t-1");
        assert_eq!(debug.get("productId").unwrap(), "motor");
        assert_eq!(debug.get("environment").unwrap(), "production");
        assert_eq!(debug.get("schemaKey").unwrap(), "staticText");
        assert!(debug.get("organisationId").is_none());
    }

    #[test]
    fn test_now_prefers_pinned_time() {
        let clock_time = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let pinned = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let services = Arc::new(ServiceLocator::new().with_clock(Arc::new(FixedClock(clock_time))));

        let ctx = ProviderContext::new(data()).with_services(services);
        assert_eq!(ctx.now(), clock_time);

        let ctx = ctx.with_now(pinned);
        assert_eq!(ctx.now(), pinned);
    }

    #[tokio::test]
    async fn test_guard_observes_cancellation() {
        let token = CancellationToken::new();
        let ctx = ProviderContext::new(data()).with_cancellation(token.clone());

        let ok: Result<i32, ProviderError> = ctx.guard(async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);

        token.cancel();
        let cancelled: Result<i32, ProviderError> =
            ctx.guard(std::future::pending::<Result<i32, ProviderError>>()).await;
        assert!(matches!(cancelled, Err(ProviderError::Cancelled)));
    }

    #[test]
    fn test_trace_records_decisions() {
        let ctx = ProviderContext::new(data());
        ctx.record("objectPathLookupText", Some("context.x"), "defaultValue used");
        let trace = ctx.trace();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].decision, "defaultValue used");
    }
}
