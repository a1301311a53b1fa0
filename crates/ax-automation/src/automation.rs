//! Automation documents: compiled once, evaluated per run

use ax_core::AutomationData;
use ax_service_registry::ServiceLocator;
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::{ContextSettings, ProviderContext, TraceEntry};
use crate::decoder::{child_pointer, BuilderRegistry, ConfigDecoder, PathHints};
use crate::error::{DecodeError, ErrorKind, ProviderError};
use crate::provider::ArcProvider;

/// Errors that can occur while managing or evaluating automations
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Automation not found: {0}")]
    NotFound(String),

    #[error("Automation already registered: {0}")]
    AlreadyExists(String),

    #[error("Invalid automation config: {0}")]
    InvalidConfig(String),

    #[error("Automation is disabled: {0}")]
    Disabled(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Output '{output}' of automation {automation} failed: {source}")]
    Output {
        automation: String,
        output: String,
        #[source]
        source: ProviderError,
    },
}

impl AutomationError {
    /// Taxonomy kind, when the error came from decoding or a provider
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AutomationError::Decode(_) => Some(ErrorKind::ConfigurationDecoding),
            AutomationError::Output { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

pub type AutomationResult<T> = Result<T, AutomationError>;

/// An automation document as authored
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationConfig {
    /// Automation ID (generated when absent)
    #[serde(default)]
    pub id: Option<String>,

    /// Human-readable name
    #[serde(default)]
    pub alias: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Named provider nodes, evaluated in declaration order
    #[serde(default)]
    pub outputs: IndexMap<String, Value>,
}

fn default_enabled() -> bool {
    true
}

/// Result of evaluating every output of an automation once
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRun {
    pub automation_id: String,
    pub run_id: String,
    pub outputs: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<TraceEntry>,
}

/// An automation whose provider trees have been decoded and built
///
/// Immutable apart from the enabled flag, so one instance serves any number
/// of concurrent runs.
#[derive(Debug)]
pub struct CompiledAutomation {
    id: String,
    alias: Option<String>,
    description: Option<String>,
    enabled: AtomicBool,
    outputs: IndexMap<String, ArcProvider<Value>>,
    hints: Arc<PathHints>,
    services: Arc<ServiceLocator>,
    settings: ContextSettings,
}

impl CompiledAutomation {
    /// Decode every output and build its provider tree
    ///
    /// Any decoding failure rejects the whole automation.
    pub fn compile(
        config: &AutomationConfig,
        registry: &BuilderRegistry,
        services: Arc<ServiceLocator>,
    ) -> AutomationResult<Self> {
        let id = config
            .id
            .clone()
            .unwrap_or_else(|| ulid::Ulid::new().to_string());

        if config.outputs.is_empty() {
            return Err(AutomationError::InvalidConfig(format!(
                "automation {} declares no outputs",
                id
            )));
        }

        let decoder = ConfigDecoder::new(registry);
        let outputs_pointer = child_pointer("", "outputs");
        let mut builders = Vec::with_capacity(config.outputs.len());
        for (name, node) in &config.outputs {
            let builder = decoder
                .decode_any(node, &child_pointer(&outputs_pointer, name))?
                .into_object();
            builders.push((name.clone(), builder));
        }

        let hints = Arc::new(decoder.into_hints());
        debug!(automation = %id, hints = hints.len(), "Compiled automation outputs");

        let outputs = builders
            .into_iter()
            .map(|(name, builder)| (name, builder.build(&services)))
            .collect();

        Ok(Self {
            id,
            alias: config.alias.clone(),
            description: config.description.clone(),
            enabled: AtomicBool::new(config.enabled),
            outputs,
            hints,
            services,
            settings: ContextSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: ContextSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the display name (alias or ID)
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.id)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    /// Context paths the outputs reference
    pub fn hints(&self) -> &PathHints {
        &self.hints
    }

    /// Fresh context for one run of this automation
    pub fn context(&self, data: AutomationData) -> ProviderContext {
        ProviderContext::new(data)
            .with_services(self.services.clone())
            .with_path_hints(self.hints.clone())
            .with_settings(self.settings.clone())
    }

    /// Evaluate every output against a fresh context
    pub async fn evaluate(&self, data: AutomationData) -> AutomationResult<AutomationRun> {
        let ctx = self.context(data);
        self.evaluate_with(&ctx).await
    }

    /// Evaluate with a cancellation token owned by the caller
    pub async fn evaluate_cancellable(
        &self,
        data: AutomationData,
        cancellation: CancellationToken,
    ) -> AutomationResult<AutomationRun> {
        let ctx = self.context(data).with_cancellation(cancellation);
        self.evaluate_with(&ctx).await
    }

    /// Evaluate every output against a caller-built context
    ///
    /// Outputs resolve in declaration order; the first hard failure ends the run.
    pub async fn evaluate_with(&self, ctx: &ProviderContext) -> AutomationResult<AutomationRun> {
        if !self.is_enabled() {
            return Err(AutomationError::Disabled(self.id.clone()));
        }

        let mut outputs = IndexMap::with_capacity(self.outputs.len());
        for (name, provider) in &self.outputs {
            match provider.resolve(ctx).await {
                Ok(value) => {
                    let value = value.map(|data| data.into_inner()).unwrap_or(Value::Null);
                    outputs.insert(name.clone(), value);
                }
                Err(e) => {
                    warn!(
                        automation = %self.id,
                        run_id = %ctx.data().run_id,
                        output = %name,
                        kind = %e.kind(),
                        debug = ?e.debug_context(),
                        "Automation output failed: {}",
                        e
                    );
                    return Err(AutomationError::Output {
                        automation: self.id.clone(),
                        output: name.clone(),
                        source: e,
                    });
                }
            }
        }

        Ok(AutomationRun {
            automation_id: self.id.clone(),
            run_id: ctx.data().run_id.clone(),
            outputs,
            trace: ctx.trace(),
        })
    }
}

/// Registry of compiled automations shared across concurrent runs
pub struct AutomationManager {
    automations: DashMap<String, Arc<CompiledAutomation>>,
    registry: Arc<BuilderRegistry>,
    services: Arc<ServiceLocator>,
    settings: ContextSettings,
}

impl AutomationManager {
    pub fn new(registry: Arc<BuilderRegistry>, services: Arc<ServiceLocator>) -> Self {
        Self {
            automations: DashMap::new(),
            registry,
            services,
            settings: ContextSettings::default(),
        }
    }

    /// Settings applied to automations compiled from now on
    pub fn with_settings(mut self, settings: ContextSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &BuilderRegistry {
        &self.registry
    }

    /// Compile a configuration without registering it
    pub fn compile(&self, config: &AutomationConfig) -> AutomationResult<CompiledAutomation> {
        CompiledAutomation::compile(config, &self.registry, self.services.clone())
            .map(|automation| automation.with_settings(self.settings.clone()))
    }

    /// Replace all automations
    ///
    /// Every configuration is compiled before anything is replaced, so a
    /// faulty document leaves the current set untouched.
    pub fn load(&self, configs: &[AutomationConfig]) -> AutomationResult<usize> {
        let mut compiled = Vec::with_capacity(configs.len());
        for config in configs {
            let automation = self.compile(config)?;
            if compiled
                .iter()
                .any(|existing: &CompiledAutomation| existing.id == automation.id)
            {
                return Err(AutomationError::AlreadyExists(automation.id));
            }
            compiled.push(automation);
        }

        self.automations.clear();
        for automation in compiled {
            info!(
                "Loaded automation: {} ({})",
                automation.display_name(),
                automation.id
            );
            self.automations
                .insert(automation.id.clone(), Arc::new(automation));
        }

        Ok(self.automations.len())
    }

    /// Compile and register a single automation
    pub fn add(&self, config: &AutomationConfig) -> AutomationResult<String> {
        let automation = self.compile(config)?;
        let id = automation.id.clone();
        match self.automations.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(AutomationError::AlreadyExists(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                info!("Added automation: {} ({})", automation.display_name(), id);
                slot.insert(Arc::new(automation));
                Ok(id)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<CompiledAutomation>> {
        self.automations.get(id).map(|entry| entry.value().clone())
    }

    pub fn all(&self) -> Vec<Arc<CompiledAutomation>> {
        self.automations.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Registered IDs, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .automations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn count(&self) -> usize {
        self.automations.len()
    }

    pub fn enable(&self, id: &str) -> AutomationResult<()> {
        let automation = self
            .get(id)
            .ok_or_else(|| AutomationError::NotFound(id.to_string()))?;
        automation.set_enabled(true);
        info!("Enabled automation: {}", id);
        Ok(())
    }

    pub fn disable(&self, id: &str) -> AutomationResult<()> {
        let automation = self
            .get(id)
            .ok_or_else(|| AutomationError::NotFound(id.to_string()))?;
        automation.set_enabled(false);
        info!("Disabled automation: {}", id);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> AutomationResult<Arc<CompiledAutomation>> {
        self.automations
            .remove(id)
            .map(|(_, automation)| {
                info!("Removed automation: {}", id);
                automation
            })
            .ok_or_else(|| AutomationError::NotFound(id.to_string()))
    }

    /// Evaluate a registered automation once
    pub async fn evaluate(
        &self,
        id: &str,
        data: AutomationData,
    ) -> AutomationResult<AutomationRun> {
        // Clone the handle out so no map shard stays locked across awaits
        let automation = self
            .get(id)
            .ok_or_else(|| AutomationError::NotFound(id.to_string()))?;
        automation.evaluate(data).await
    }
}

impl Default for AutomationManager {
    fn default() -> Self {
        Self::new(
            Arc::new(BuilderRegistry::with_defaults()),
            Arc::new(ServiceLocator::new()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_manager::ContextKey;
    use ax_core::{DeploymentEnvironment, EntityKind, EntityReference};
    use ax_service_registry::InMemoryEntityStore;
    use serde_json::json;

    fn config(value: Value) -> AutomationConfig {
        serde_json::from_value(value).unwrap()
    }

    fn data() -> AutomationData {
        AutomationData::new("tenant-1", DeploymentEnvironment::Development)
            .with_variable("amount", json!(42))
    }

    #[test]
    fn test_config_defaults() {
        let config = config(json!({
            "outputs": { "greeting": "hello" }
        }));
        assert!(config.enabled);
        assert!(config.id.is_none());
        assert_eq!(config.outputs.len(), 1);
    }

    #[test]
    fn test_compile_generates_id_and_display_name() {
        let registry = BuilderRegistry::with_defaults();
        let automation = CompiledAutomation::compile(
            &config(json!({ "outputs": { "greeting": "hello" } })),
            &registry,
            Arc::new(ServiceLocator::new()),
        )
        .unwrap();
        assert_eq!(automation.id().len(), 26);
        assert_eq!(automation.display_name(), automation.id());

        let named = CompiledAutomation::compile(
            &config(json!({ "id": "a1", "alias": "Renewal", "outputs": { "x": 1 } })),
            &registry,
            Arc::new(ServiceLocator::new()),
        )
        .unwrap();
        assert_eq!(named.display_name(), "Renewal");
    }

    #[test]
    fn test_compile_rejects_unknown_provider() {
        let registry = BuilderRegistry::with_defaults();
        let err = CompiledAutomation::compile(
            &config(json!({ "outputs": { "x": { "noSuchProvider": 1 } } })),
            &registry,
            Arc::new(ServiceLocator::new()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ConfigurationDecoding));
        match err {
            AutomationError::Decode(decode) => assert_eq!(decode.pointer(), "/outputs/x"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_compile_rejects_empty_outputs() {
        let registry = BuilderRegistry::with_defaults();
        let err = CompiledAutomation::compile(
            &config(json!({ "id": "empty" })),
            &registry,
            Arc::new(ServiceLocator::new()),
        )
        .unwrap_err();
        assert!(matches!(err, AutomationError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_evaluate_outputs_in_order() {
        let registry = BuilderRegistry::with_defaults();
        let automation = CompiledAutomation::compile(
            &config(json!({
                "id": "ordered",
                "outputs": {
                    "amount": { "objectPathLookupInteger": "context.amount" },
                    "missing": { "objectPathLookupText": "context.nothing" },
                    "label": "fixed"
                }
            })),
            &registry,
            Arc::new(ServiceLocator::new()),
        )
        .unwrap();

        let run = automation.evaluate(data()).await.unwrap();
        let names: Vec<&str> = run.outputs.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["amount", "missing", "label"]);
        assert_eq!(run.outputs["amount"], json!(42));
        assert_eq!(run.outputs["missing"], Value::Null);
        assert_eq!(run.outputs["label"], json!("fixed"));
        assert_eq!(run.automation_id, "ordered");
    }

    #[tokio::test]
    async fn test_evaluate_surfaces_output_failure() {
        let registry = BuilderRegistry::with_defaults();
        let automation = CompiledAutomation::compile(
            &config(json!({
                "id": "strict",
                "outputs": {
                    "amount": {
                        "objectPathLookupInteger": {
                            "path": "context.nothing",
                            "raiseErrorIfNotFound": true
                        }
                    }
                }
            })),
            &registry,
            Arc::new(ServiceLocator::new()),
        )
        .unwrap();

        let err = automation.evaluate(data()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::PathNotFound));
    }

    #[tokio::test]
    async fn test_compile_collects_hints() {
        let store = Arc::new(InMemoryEntityStore::new().with_entity(
            EntityKind::Quote,
            "q1",
            json!({ "customer": { "fullName": "Ada" } }),
        ));
        let services = Arc::new(ServiceLocator::new().with_store(store.clone()));
        let registry = BuilderRegistry::with_defaults();
        let automation = CompiledAutomation::compile(
            &config(json!({
                "outputs": {
                    "name": { "objectPathLookupText": "context.quote.customer.fullName" }
                }
            })),
            &registry,
            services,
        )
        .unwrap();

        assert!(automation
            .hints()
            .sub_paths("quote")
            .contains("customer.fullName"));

        let mut ctx = automation.context(data());
        ctx.entities_mut().set_stub(
            ContextKey::Quote,
            EntityReference::new(EntityKind::Quote, "q1"),
        );
        let run = automation.evaluate_with(&ctx).await.unwrap();
        assert_eq!(run.outputs["name"], json!("Ada"));
        assert_eq!(store.entity_load_count(), 1);
    }

    #[tokio::test]
    async fn test_manager_lifecycle() {
        let manager = AutomationManager::default();
        let id = manager
            .add(&config(json!({ "id": "a1", "outputs": { "x": 1 } })))
            .unwrap();
        assert_eq!(id, "a1");
        assert_eq!(manager.count(), 1);

        assert!(matches!(
            manager.add(&config(json!({ "id": "a1", "outputs": { "x": 2 } }))),
            Err(AutomationError::AlreadyExists(_))
        ));

        manager.disable("a1").unwrap();
        assert!(matches!(
            manager.evaluate("a1", data()).await,
            Err(AutomationError::Disabled(_))
        ));

        manager.enable("a1").unwrap();
        let run = manager.evaluate("a1", data()).await.unwrap();
        assert_eq!(run.outputs["x"], json!(1));

        manager.remove("a1").unwrap();
        assert!(matches!(
            manager.evaluate("a1", data()).await,
            Err(AutomationError::NotFound(_))
        ));
    }

    #[test]
    fn test_manager_load_is_all_or_nothing() {
        let manager = AutomationManager::default();
        manager
            .load(&[config(json!({ "id": "keep", "outputs": { "x": 1 } }))])
            .unwrap();

        let result = manager.load(&[
            config(json!({ "id": "good", "outputs": { "x": 1 } })),
            config(json!({ "id": "bad", "outputs": { "x": { "unknownKey": {} } } })),
        ]);
        assert!(result.is_err());
        assert_eq!(manager.ids(), vec!["keep".to_string()]);

        let count = manager
            .load(&[
                config(json!({ "id": "b", "outputs": { "x": 1 } })),
                config(json!({ "id": "a", "outputs": { "x": 2 } })),
            ])
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(manager.ids(), vec!["a".to_string(), "b".to_string()]);
    }
}
