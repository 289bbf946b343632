//! Plugin executor
//!
//! A plugin module on disk is a small manifest (`plugins/<name>.json` or
//! `plugins/<name>.toml`) naming the factories it exports. Factories are
//! registered up front in a [`PluginRegistry`]; the executor resolves each
//! exported name, calls the factory with the shared [`PluginInput`] and
//! collects the hook sets that come back.

use super::kind::ExtensionKind;
use super::protocol::{BoxFuture, HookSet, PluginInput};
use crate::diagnostics::{Diagnostic, DiagnosticEvent, DiagnosticSink};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Recognized plugin module suffixes
pub const MODULE_SUFFIXES: [&str; 2] = [".json", ".toml"];

/// Factory producing a plugin's hooks
pub type PluginFactory =
    Arc<dyn Fn(PluginInput) -> BoxFuture<'static, anyhow::Result<HookSet>> + Send + Sync>;

/// Wrap an async closure as a [`PluginFactory`]
pub fn plugin_factory<F, Fut>(f: F) -> PluginFactory
where
    F: Fn(PluginInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<HookSet>> + Send + 'static,
{
    Arc::new(move |input| -> BoxFuture<'static, anyhow::Result<HookSet>> { Box::pin(f(input)) })
}

/// Named plugin factories available to plugin modules
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async closure under `name` and return its factory, which
    /// can be registered again under another name
    pub fn register<F, Fut>(&mut self, name: &str, f: F) -> PluginFactory
    where
        F: Fn(PluginInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HookSet>> + Send + 'static,
    {
        let factory = plugin_factory(f);
        self.register_factory(name, factory.clone());
        factory
    }

    /// Register an existing factory under `name`
    pub fn register_factory(&mut self, name: &str, factory: PluginFactory) {
        if self.factories.insert(name.to_string(), factory).is_some() {
            debug!("Plugin factory '{}' re-registered", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&PluginFactory> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Plugin module manifest
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PluginModule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Registered factory names, invoked in this order
    #[serde(default)]
    pub exports: Vec<String>,
}

impl PluginModule {
    /// Read and deserialize a module manifest, by suffix
    pub async fn read(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read plugin module: {}", e))?;

        if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content).map_err(|e| format!("Failed to parse plugin module: {}", e))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| format!("Failed to parse plugin module: {}", e))
        }
    }
}

/// Whether `path` names a plugin module
pub fn is_module_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| MODULE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)))
}

/// List module files directly under `dir`, in directory order.
///
/// A missing directory yields an empty list.
pub async fn discover_modules(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e),
    };

    let mut modules = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_module_file(&path) {
            continue;
        }
        if fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            modules.push(path);
        }
    }
    Ok(modules)
}

/// Runs plugin modules against a registry
pub struct PluginExecutor<'a> {
    registry: &'a PluginRegistry,
    sink: Arc<dyn DiagnosticSink>,
}

impl<'a> PluginExecutor<'a> {
    /// Create a new plugin executor
    pub fn new(registry: &'a PluginRegistry, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { registry, sink }
    }

    /// Run every module under `<source_root>/plugins`
    pub async fn run(&self, source_root: &Path, input: &PluginInput) -> Vec<HookSet> {
        let dir = source_root.join(ExtensionKind::Plugins.dir_name());
        match discover_modules(&dir).await {
            Ok(modules) => self.run_modules(&modules, input).await,
            Err(e) => {
                self.sink.report(Diagnostic::warning(
                    DiagnosticEvent::ModuleLoad,
                    &dir,
                    format!("Failed to read plugin directory: {}", e),
                ));
                vec![]
            }
        }
    }

    /// Run the given modules one at a time, in order.
    ///
    /// Each distinct factory runs at most once per call, however many
    /// names or modules export it. Failures are reported and skipped.
    pub async fn run_modules(&self, modules: &[PathBuf], input: &PluginInput) -> Vec<HookSet> {
        let mut invoked: HashSet<usize> = HashSet::new();
        let mut hook_sets = Vec::new();

        for path in modules {
            let module = match PluginModule::read(path).await {
                Ok(module) => module,
                Err(message) => {
                    self.sink.report(Diagnostic::warning(
                        DiagnosticEvent::ModuleLoad,
                        path,
                        message,
                    ));
                    continue;
                }
            };

            for export in &module.exports {
                let Some(factory) = self.registry.get(export) else {
                    self.sink.report(Diagnostic::warning(
                        DiagnosticEvent::UnknownExport,
                        path,
                        format!("No plugin factory registered as '{}'", export),
                    ));
                    continue;
                };

                // Identity of the closure behind the Arc, without vtable
                let identity = Arc::as_ptr(factory) as *const () as usize;
                if !invoked.insert(identity) {
                    debug!("Skipping '{}' in {:?}: factory already invoked", export, path);
                    continue;
                }

                match factory(input.clone()).await {
                    Ok(hooks) if hooks.is_empty() => {
                        debug!("Plugin '{}' in {:?} returned no hooks", export, path);
                    }
                    Ok(hooks) => hook_sets.push(hooks),
                    Err(e) => {
                        self.sink.report(Diagnostic::warning(
                            DiagnosticEvent::PluginInvoke,
                            path,
                            format!("Plugin '{}' failed: {:#}", export, e),
                        ));
                    }
                }
            }
        }

        info!(
            "Collected {} hook set(s) from {} plugin module(s)",
            hook_sets.len(),
            modules.len()
        );
        hook_sets
    }
}
