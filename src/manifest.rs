//! Project manifest (`opencode.json`)
//!
//! Only the `plugin` array is managed here. Every other key is kept as it
//! was read, in its original order.

use crate::error::ManifestError;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Schema URL written into a new manifest
pub const SCHEMA_URL: &str = "https://opencode.ai/config.json";

const PLUGIN_KEY: &str = "plugin";

type Result<T> = std::result::Result<T, ManifestError>;

/// A loaded project manifest
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectManifest {
    path: PathBuf,
    document: Map<String, Value>,
}

impl ProjectManifest {
    /// Read the manifest at `path`; a missing file yields a fresh document
    pub async fn load(path: &Path) -> Result<Self> {
        let document = match fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(document)) => document,
                Ok(_) => {
                    return Err(ManifestError::Parse {
                        path: path.to_path_buf(),
                        message: "expected a JSON object".to_string(),
                    })
                }
                Err(e) => {
                    return Err(ManifestError::Parse {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No manifest at {:?}, starting a new one", path);
                let mut document = Map::new();
                document.insert("$schema".to_string(), Value::String(SCHEMA_URL.to_string()));
                document
            }
            Err(source) => {
                return Err(ManifestError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries of the `plugin` array that are strings
    pub fn plugins(&self) -> Result<Vec<String>> {
        match self.document.get(PLUGIN_KEY) {
            None => Ok(vec![]),
            Some(Value::Array(items)) => Ok(items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()),
            Some(_) => Err(ManifestError::InvalidField(PLUGIN_KEY.to_string())),
        }
    }

    /// Append `package` unless an entry for the same package exists.
    ///
    /// Returns whether the list changed.
    pub fn add_plugin(&mut self, package: &str) -> Result<bool> {
        let items = self.plugin_array()?;
        let name = package_name(package);
        if items
            .iter()
            .filter_map(Value::as_str)
            .any(|entry| package_name(entry) == name)
        {
            return Ok(false);
        }
        items.push(Value::String(package.to_string()));
        Ok(true)
    }

    /// Drop every entry for `package`, with or without a version.
    ///
    /// Returns whether the list changed.
    pub fn remove_plugin(&mut self, package: &str) -> Result<bool> {
        let items = self.plugin_array()?;
        let name = package_name(package);
        let before = items.len();
        items.retain(|v| v.as_str().map_or(true, |entry| package_name(entry) != name));
        Ok(items.len() != before)
    }

    /// Write the manifest back, pretty-printed
    pub async fn save(&self) -> Result<()> {
        let mut content = serde_json::to_string_pretty(&self.document).map_err(|e| {
            ManifestError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            }
        })?;
        content.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| ManifestError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        fs::write(&self.path, content)
            .await
            .map_err(|source| ManifestError::Write {
                path: self.path.clone(),
                source,
            })
    }

    fn plugin_array(&mut self) -> Result<&mut Vec<Value>> {
        self.document
            .entry(PLUGIN_KEY.to_string())
            .or_insert_with(|| Value::Array(vec![]))
            .as_array_mut()
            .ok_or_else(|| ManifestError::InvalidField(PLUGIN_KEY.to_string()))
    }
}

/// Package name without a trailing `@version`; scoped names keep their
/// leading `@`
pub fn package_name(spec: &str) -> &str {
    match spec.rfind('@') {
        Some(index) if index > 0 => &spec[..index],
        _ => spec,
    }
}
