//! Automation document and engine settings loading
//!
//! Documents are YAML or JSON with the shape
//! `{ id?, alias?, description?, enabled?, outputs: { name: <provider node> } }`.
//! YAML documents support custom tags:
//!
//! - `!include path` - Include another YAML or JSON file
//! - `!include_dir_list dir` - Include every document in a directory as a list
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use ax_config::{load_automations, EngineSettings};
//!
//! let settings = EngineSettings::load("/etc/ax/engine.yaml")?;
//! let automations = load_automations("/etc/ax/automations")?;
//! ```

mod error;
mod loader;
mod settings;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_automations, load_document, DocumentLoader};
pub use settings::EngineSettings;
