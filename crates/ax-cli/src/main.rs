//! ax-eval
//!
//! Loads an automation document and a fixture file, evaluates every output
//! once against an in-memory entity store and prints the result as JSON.

use anyhow::{bail, Context, Result};
use ax_automation::{
    AutomationConfig, BuilderRegistry, CompiledAutomation, ContextEntry, ContextKey, EntitySlot,
};
use ax_config::{load_automations, load_document, EngineSettings};
use ax_core::{AutomationData, EntityKind, EntityReference};
use ax_service_registry::{FixedClock, InMemoryEntityStore, ServiceLocator};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Evaluate automation documents against fixture data
#[derive(Parser, Debug)]
#[command(name = "ax-eval", version, about, long_about = None)]
struct Cli {
    /// Automation document (YAML or JSON)
    automation: PathBuf,

    /// Fixture holding the automation data and the entities to serve
    #[arg(short, long)]
    fixture: PathBuf,

    /// Engine settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Evaluate only the automation with this id when the document holds several
    #[arg(long)]
    id: Option<String>,

    /// Fixed current time (RFC 3339) for `currentDateTime`
    #[arg(long)]
    now: Option<DateTime<Utc>>,

    /// Include the fallback trace in the output
    #[arg(long)]
    trace: bool,

    /// Pretty-print the JSON result
    #[arg(long)]
    pretty: bool,
}

/// Data for one run plus the entities the in-memory store serves
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fixture {
    data: AutomationData,

    /// Extra context entries: context key to entity reference
    #[serde(default)]
    context: BTreeMap<String, FixtureReference>,

    #[serde(default)]
    entities: Vec<FixtureEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixtureReference {
    #[serde(default)]
    entity_type: Option<EntityKind>,
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixtureEntity {
    entity_type: EntityKind,
    id: String,
    #[serde(default)]
    data: Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => EngineSettings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => EngineSettings::default(),
    };

    let config = select_automation(
        load_automations(&cli.automation)
            .with_context(|| format!("loading automation from {}", cli.automation.display()))?,
        cli.id.as_deref(),
    )?;

    let fixture: Fixture = serde_json::from_value(
        load_document(&cli.fixture)
            .with_context(|| format!("loading fixture from {}", cli.fixture.display()))?,
    )
    .context("fixture must hold `data`, and optionally `context` and `entities`")?;

    let store = Arc::new(InMemoryEntityStore::new());
    for entity in &fixture.entities {
        store.insert(entity.entity_type, entity.id.clone(), entity.data.clone());
    }
    debug!(entities = fixture.entities.len(), "Seeded entity store");

    let mut services = ServiceLocator::new().with_store(store.clone());
    if let Some(now) = cli.now {
        services = services.with_clock(Arc::new(FixedClock(now)));
    }

    let registry = BuilderRegistry::with_defaults();
    let automation = CompiledAutomation::compile(&config, &registry, Arc::new(services))?
        .with_settings(settings.context_settings());
    info!(
        "Evaluating automation: {} ({})",
        automation.display_name(),
        automation.id()
    );

    let mut ctx = automation.context(fixture.data);
    for (key, reference) in fixture.context {
        let kind = match (reference.entity_type, ContextKey::from_name(&key)) {
            (Some(kind), _) => kind,
            (None, Some(fixed)) => fixed.kind(),
            (None, None) => bail!("context entry '{}' needs an entityType", key),
        };
        ctx.entities_mut().insert(
            key,
            ContextEntry::Entity(EntitySlot::stub(EntityReference::new(kind, reference.id))),
        );
    }

    let mut run = automation.evaluate_with(&ctx).await?;
    if !cli.trace {
        run.trace.clear();
    }
    info!(
        entity_loads = store.entity_load_count(),
        list_loads = store.list_load_count(),
        "Evaluation finished"
    );

    let output = if cli.pretty {
        serde_json::to_string_pretty(&run)?
    } else {
        serde_json::to_string(&run)?
    };
    println!("{}", output);

    Ok(())
}

fn select_automation(configs: Vec<AutomationConfig>, id: Option<&str>) -> Result<AutomationConfig> {
    match id {
        Some(id) => configs
            .into_iter()
            .find(|config| config.id.as_deref() == Some(id))
            .with_context(|| format!("no automation with id '{}'", id)),
        None => {
            let count = configs.len();
            let mut configs = configs.into_iter();
            match (configs.next(), count) {
                (Some(config), 1) => Ok(config),
                (None, _) => bail!("document holds no automation"),
                _ => bail!("document holds {} automations; choose one with --id", count),
            }
        }
    }
}
