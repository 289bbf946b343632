//! Configuration management for extpack
//!
//! Handles loading and merging configuration from multiple sources:
//! 1. Compiled defaults
//! 2. User config (~/.config/extpack/config.toml)
//! 3. CLI-specified config file
//! 4. Project config (.extpackrc)
//! 5. Environment variables
//!
//! Files are merged table by table, so a layer only overrides the keys it
//! actually sets.

use crate::error::ConfigError;
use crate::extensions::ExtensionKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the per-project config file
pub const PROJECT_CONFIG_FILE: &str = ".extpackrc";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub install: InstallConfig,
    pub npm: NpmConfig,
    pub search: SearchConfig,
    pub manifest: ManifestConfig,
    pub diagnostics: DiagnosticsConfig,
}

/// Where and how extension files are copied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Extension tree, relative to the project directory
    pub target_dir: PathBuf,
    /// Replace existing files
    pub overwrite: bool,
    /// Kinds to copy
    pub kinds: Vec<ExtensionKind>,
}

/// npm invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpmConfig {
    /// Executable to run
    pub command: String,
}

/// Registry search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// npm registry base URL
    pub npm_url: String,
    /// GitHub API base URL
    pub github_url: String,
    /// Keyword / topic that marks a package as an extension
    pub keyword: String,
    /// Maximum results per source
    pub limit: u32,
    /// Request timeout in seconds
    pub timeout: u64,
}

/// Project manifest location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Manifest file, relative to the project directory
    pub file: PathBuf,
}

/// Diagnostic output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Append diagnostics as JSON lines to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

// Default implementations

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from(".opencode"),
            overwrite: false,
            kinds: ExtensionKind::ALL.to_vec(),
        }
    }
}

impl Default for NpmConfig {
    fn default() -> Self {
        Self {
            command: "npm".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            npm_url: "https://registry.npmjs.org".to_string(),
            github_url: "https://api.github.com".to_string(),
            keyword: "opencode".to_string(),
            limit: 20,
            timeout: 15,
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("opencode.json"),
        }
    }
}

impl Config {
    /// Load configuration from all sources except the project file
    pub fn load(cli_config: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Load user config
        if let Some(dir) = dirs::config_dir() {
            let user_config = dir.join("extpack/config.toml");
            if user_config.exists() {
                debug!("Loading user config from {:?}", user_config);
                config.merge_from_file(&user_config)?;
            }
        }

        // Load CLI-specified config
        if let Some(path) = cli_config {
            debug!("Loading CLI config from {:?}", path);
            config.merge_from_file(path)?;
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load and merge project config (.extpackrc)
    pub fn load_project_config(&mut self, dir: &Path) -> Result<(), ConfigError> {
        let project_config = dir.join(PROJECT_CONFIG_FILE);
        if project_config.exists() {
            debug!("Loading project config from {:?}", project_config);
            self.merge_from_file(&project_config)?;
            // Environment still wins over the project file
            self.apply_env_overrides()?;
        }
        Ok(())
    }

    /// Merge configuration from a file
    fn merge_from_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;

        self.merge_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
    }

    /// Merge a TOML document into this config (the document takes precedence)
    fn merge_str(&mut self, contents: &str) -> Result<(), String> {
        let layer: toml::Table = toml::from_str(contents).map_err(|e| e.to_string())?;

        let mut merged = match toml::Value::try_from(&*self).map_err(|e| e.to_string())? {
            toml::Value::Table(table) => table,
            _ => return Err("configuration did not serialize to a table".to_string()),
        };
        merge_tables(&mut merged, layer);

        *self = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| e.to_string())?;
        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(dir) = lookup("EXTPACK_TARGET_DIR") {
            self.install.target_dir = PathBuf::from(dir);
        }
        if let Some(command) = lookup("EXTPACK_NPM") {
            self.npm.command = command;
        }
        if let Some(url) = lookup("EXTPACK_NPM_REGISTRY") {
            self.search.npm_url = url;
        }
        if let Some(url) = lookup("EXTPACK_GITHUB_API") {
            self.search.github_url = url;
        }
        if let Some(value) = lookup("EXTPACK_OVERWRITE") {
            self.install.overwrite = parse_flag(&value).ok_or_else(|| {
                ConfigError::Invalid(format!("EXTPACK_OVERWRITE must be a boolean, got '{}'", value))
            })?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.install.target_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("install.target_dir".to_string()));
        }
        if self.npm.command.is_empty() {
            return Err(ConfigError::MissingField("npm.command".to_string()));
        }
        if self.manifest.file.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("manifest.file".to_string()));
        }
        for (field, url) in [
            ("search.npm_url", &self.search.npm_url),
            ("search.github_url", &self.search.github_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be an http(s) URL, got '{}'",
                    field, url
                )));
            }
        }
        if self.search.limit == 0 {
            return Err(ConfigError::Invalid(
                "search.limit must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Extension tree for `project_dir`
    pub fn target_root(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.install.target_dir)
    }

    /// Manifest path for `project_dir`
    pub fn manifest_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.manifest.file)
    }
}

/// Recursively merge `layer` into `base`; non-table values replace
fn merge_tables(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
