//! Automation document loader with custom tag support
//!
//! YAML documents may use:
//! - `!include path` - Include another YAML or JSON file
//! - `!include_dir_list dir` - Include every document in a directory as a list
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! JSON documents are read as-is.

use crate::error::{ConfigError, ConfigResult};
use ax_automation::AutomationConfig;
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Loads YAML or JSON documents, resolving includes relative to the including file
pub struct DocumentLoader {
    /// Base directory for resolving relative paths
    base_dir: PathBuf,
    /// Files currently being loaded, to detect circular includes
    include_stack: HashSet<PathBuf>,
}

impl DocumentLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            include_stack: HashSet::new(),
        }
    }

    /// Load a document file and return it as JSON
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<serde_json::Value> {
        let path = self.resolve_path(path.as_ref());
        let value = self.load_value(&path)?;
        to_json(value, &path)
    }

    /// Load YAML from a string; includes resolve against `source_path`'s directory
    pub fn load_string(
        &mut self,
        content: &str,
        source_path: &Path,
    ) -> ConfigResult<serde_json::Value> {
        let value = self.parse_yaml(content, source_path)?;
        to_json(value, source_path)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn load_value(&mut self, path: &Path) -> ConfigResult<Value> {
        debug!("Loading document: {:?}", path);

        if self.include_stack.contains(path) {
            return Err(ConfigError::CircularInclude {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        if is_json(path) {
            let json: serde_json::Value =
                serde_json::from_str(&content).map_err(|e| ConfigError::ParseJson {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            return serde_yaml::to_value(json).map_err(|e| ConfigError::ParseYaml {
                path: path.to_path_buf(),
                source: e,
            });
        }

        self.include_stack.insert(path.to_path_buf());
        let result = self.parse_yaml(&content, path);
        self.include_stack.remove(path);

        result
    }

    fn parse_yaml(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    let processed = self.process_value(v, source_path)?;
                    result.insert(k, processed);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => {
                let result: ConfigResult<Vec<Value>> = seq
                    .into_iter()
                    .map(|v| self.process_value(v, source_path))
                    .collect();
                Ok(Value::Sequence(result?))
            }
            _ => Ok(value),
        }
    }

    fn process_tagged(
        &mut self,
        tagged: serde_yaml::value::TaggedValue,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!("Processing tag '{}' with value {:?}", tag, tagged.value);

        match tag.as_str() {
            "!include" => {
                let path = self.value_to_path(&tagged.value, source_path)?;
                debug!("Including file: {:?}", path);
                self.load_value(&path)
            }
            "!include_dir_list" => {
                let dir = self.value_to_path(&tagged.value, source_path)?;
                debug!("Including directory as list: {:?}", dir);
                let items: ConfigResult<Vec<Value>> = document_files(&dir)?
                    .iter()
                    .map(|file| self.load_value(file))
                    .collect();
                Ok(Value::Sequence(items?))
            }
            "!env_var" => process_env_var(tagged.value),
            other => Err(ConfigError::InvalidValue {
                key: other.to_string(),
                reason: "unsupported tag".to_string(),
            }),
        }
    }

    /// Convert a YAML value to a path, resolving relative to the source file
    fn value_to_path(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let path_str = match value {
            Value::String(s) => s.clone(),
            _ => {
                return Err(ConfigError::InvalidIncludePath {
                    path: format!("{:?}", value),
                    reason: "path must be a string".to_string(),
                })
            }
        };

        let base_dir = source_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(&self.base_dir);
        let path = Path::new(&path_str);
        Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        })
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

/// `!env_var NAME` or `!env_var NAME default`
fn process_env_var(value: Value) -> ConfigResult<Value> {
    let argument = match value {
        Value::String(s) => s,
        _ => {
            return Err(ConfigError::InvalidValue {
                key: "!env_var".to_string(),
                reason: "environment variable name must be a string".to_string(),
            })
        }
    };

    let mut parts = argument.trim().splitn(2, char::is_whitespace);
    let var_name = parts.next().unwrap_or_default().to_string();
    let default = parts.next().map(|d| d.trim().to_string());

    match (std::env::var(&var_name), default) {
        (Ok(value), _) => {
            debug!("Substituted env var: {}", var_name);
            Ok(Value::String(value))
        }
        (Err(_), Some(default)) => {
            debug!("Env var {} not set, using default", var_name);
            Ok(Value::String(default))
        }
        (Err(_), None) => Err(ConfigError::EnvVarNotFound { var: var_name }),
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().map(|ext| ext == "json").unwrap_or(false)
}

fn to_json(value: Value, path: &Path) -> ConfigResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ConfigError::InvalidValue {
        key: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Every YAML or JSON file in a directory, sorted by name
fn document_files(dir: &Path) -> ConfigResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ConfigError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| ConfigError::ReadFile {
            path: dir.to_path_buf(),
            source: e,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext == "yaml" || ext == "yml" || ext == "json")
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Load the automations in a file or directory
///
/// A file may hold one automation or a list of them. A directory is read
/// file by file in name order.
pub fn load_automations(path: impl AsRef<Path>) -> ConfigResult<Vec<AutomationConfig>> {
    let path = path.as_ref();
    let files = if path.is_dir() {
        document_files(path)?
    } else {
        vec![path.to_path_buf()]
    };

    let mut configs = Vec::new();
    for file in files {
        let base_dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        let document = DocumentLoader::new(base_dir).load_file(&file)?;
        let documents = match document {
            serde_json::Value::Array(items) => items,
            single => vec![single],
        };
        for document in documents {
            let config = serde_json::from_value(document).map_err(|e| {
                ConfigError::InvalidDocument {
                    path: file.clone(),
                    source: e,
                }
            })?;
            configs.push(config);
        }
    }

    debug!("Loaded {} automation documents from {:?}", configs.len(), path);
    Ok(configs)
}

/// Load a single document file as JSON
pub fn load_document(path: impl AsRef<Path>) -> ConfigResult<serde_json::Value> {
    let path = path.as_ref();
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    DocumentLoader::new(base_dir).load_file(path)
}
