//! Data describing one automation run: who, where and why

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::{EntityListReference, TriggerEvent};

/// Deployment environment an automation runs in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl DeploymentEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentEnvironment::Development => "development",
            DeploymentEnvironment::Staging => "staging",
            DeploymentEnvironment::Production => "production",
        }
    }
}

impl FromStr for DeploymentEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" => Ok(DeploymentEnvironment::Development),
            "staging" => Ok(DeploymentEnvironment::Staging),
            "production" => Ok(DeploymentEnvironment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

impl fmt::Display for DeploymentEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an automation run knows before any entity is loaded
///
/// Tenant is always present. Organisation, product, performing user and the
/// triggering event are optional. Each run gets a fresh ULID so log lines and
/// diagnostics from concurrent runs can be told apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationData {
    /// Unique identifier for this run (ULID)
    #[serde(default = "new_run_id")]
    pub run_id: String,

    pub tenant_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organisation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    #[serde(default)]
    pub environment: DeploymentEnvironment,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performing_user_id: Option<String>,

    /// The event that triggered this run, if event driven
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerEvent>,

    /// Ad hoc values placed under the `context` root
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, serde_json::Value>,

    /// List-typed entity references placed under the `context` root
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub entity_lists: IndexMap<String, EntityListReference>,
}

fn new_run_id() -> String {
    Ulid::new().to_string()
}

impl AutomationData {
    /// Create automation data for a tenant
    pub fn new(tenant_id: impl Into<String>, environment: DeploymentEnvironment) -> Self {
        Self {
            run_id: new_run_id(),
            tenant_id: tenant_id.into(),
            organisation_id: None,
            product_id: None,
            environment,
            performing_user_id: None,
            trigger: None,
            variables: IndexMap::new(),
            entity_lists: IndexMap::new(),
        }
    }

    pub fn with_organisation(mut self, organisation_id: impl Into<String>) -> Self {
        self.organisation_id = Some(organisation_id.into());
        self
    }

    pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    pub fn with_performing_user(mut self, user_id: impl Into<String>) -> Self {
        self.performing_user_id = Some(user_id.into());
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerEvent) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Add an ad hoc value under `context.<key>`
    pub fn with_variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    /// Add a list-typed entity reference under `context.<key>`
    pub fn with_entity_list(mut self, key: impl Into<String>, list: EntityListReference) -> Self {
        self.entity_lists.insert(key.into(), list);
        self
    }

    /// JSON exposed under the `system` path root
    pub fn system_json(&self) -> serde_json::Value {
        serde_json::json!({
            "runId": self.run_id,
            "tenantId": self.tenant_id,
            "organisationId": self.organisation_id,
            "productId": self.product_id,
            "environment": self.environment,
            "performingUserId": self.performing_user_id,
        })
    }
}
