//! Plugin activation
//!
//! When the host activates a package, its extension files are copied into
//! the project. The host has already scanned the project tree at that
//! point, so anything newly created must be handed over for this process
//! through hooks: agents and commands via a `config` hook, plugin modules
//! by running them right away.

use super::compose::merge_hooks;
use super::executor::{is_module_file, PluginExecutor, PluginRegistry};
use super::kind::{DefinitionKind, ExtensionKind};
use super::loader::{DefinitionLoader, DefinitionSet, DEFINITION_SUFFIX};
use super::protocol::{Hook, HookCall, HookSet, HookSlot, PluginInput};
use crate::diagnostics::DiagnosticSink;
use crate::error::InstallError;
use crate::frontmatter::Metadata;
use crate::installer::{self, absolutize, InstallOptions, InstallReport};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Result of one activation
#[derive(Debug, Clone)]
pub struct ActivationOutcome {
    pub report: InstallReport,
    /// Base hooks merged with everything the new files contributed
    pub hooks: HookSet,
    /// Newly installed agents
    pub agents: DefinitionSet,
    /// Newly installed commands
    pub commands: DefinitionSet,
}

/// Install a package's extensions and collect their hooks
pub struct Activation<'a> {
    source_root: PathBuf,
    target_root: PathBuf,
    options: InstallOptions,
    registry: &'a PluginRegistry,
    sink: Arc<dyn DiagnosticSink>,
}

impl<'a> Activation<'a> {
    pub fn new(
        source_root: &Path,
        target_root: &Path,
        registry: &'a PluginRegistry,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            target_root: target_root.to_path_buf(),
            options: InstallOptions::default(),
            registry,
            sink,
        }
    }

    pub fn with_options(mut self, options: InstallOptions) -> Self {
        self.options = options;
        self
    }

    /// Copy files, then load and compose whatever was newly created.
    ///
    /// Without new files `base` is returned as is.
    pub async fn run(
        &self,
        base: &HookSet,
        input: &PluginInput,
    ) -> Result<ActivationOutcome, InstallError> {
        let report = installer::install(&self.source_root, &self.target_root, &self.options).await?;

        if report.created.is_empty() {
            info!("No new extension files; keeping pre-declared hooks");
            return Ok(ActivationOutcome {
                report,
                hooks: base.clone(),
                agents: DefinitionSet::new(),
                commands: DefinitionSet::new(),
            });
        }

        let target_root = absolutize(&self.target_root)?;
        let loader = DefinitionLoader::new(self.sink.clone());

        let mut agents = loader.load_agents(&self.source_root).await;
        agents.retain(|d| report.was_created(&definition_path(&target_root, DefinitionKind::Agent, &d.name)));

        let mut commands = loader.load_commands(&self.source_root).await;
        commands.retain(|d| report.was_created(&definition_path(&target_root, DefinitionKind::Command, &d.name)));

        let mut contributions = Vec::new();
        if !agents.is_empty() || !commands.is_empty() {
            contributions.push(definitions_hook_set(&agents, &commands));
        }

        let plugin_dir = target_root.join(ExtensionKind::Plugins.dir_name());
        let modules: Vec<PathBuf> = report
            .created
            .iter()
            .filter(|p| p.parent() == Some(plugin_dir.as_path()) && is_module_file(p))
            .cloned()
            .collect();

        let executor = PluginExecutor::new(self.registry, self.sink.clone());
        contributions.extend(executor.run_modules(&modules, input).await);

        info!(
            "Activated {} agent(s), {} command(s), {} plugin module(s)",
            agents.len(),
            commands.len(),
            modules.len()
        );

        Ok(ActivationOutcome {
            hooks: merge_hooks(base, &contributions),
            report,
            agents,
            commands,
        })
    }
}

fn definition_path(root: &Path, kind: DefinitionKind, name: &str) -> PathBuf {
    root.join(kind.extension_kind().dir_name())
        .join(format!("{}{}", name, DEFINITION_SUFFIX))
}

/// Hook set whose `config` hook registers the given definitions
fn definitions_hook_set(agents: &DefinitionSet, commands: &DefinitionSet) -> HookSet {
    let sections = Arc::new(vec![
        (DefinitionKind::Agent.config_key(), agents.to_config_map()),
        (DefinitionKind::Command.config_key(), commands.to_config_map()),
    ]);

    HookSet::new().with_hook(
        HookSlot::Config,
        Hook::new(move |call: HookCall| {
            let sections = sections.clone();
            async move { register_definitions(call, &sections).await }
        }),
    )
}

/// Add definitions to the host configuration, leaving entries the
/// configuration already has untouched
async fn register_definitions(
    call: HookCall,
    sections: &[(&'static str, Metadata)],
) -> anyhow::Result<()> {
    let mut config = call.output.lock().await;
    if config.is_null() {
        *config = Value::Object(Metadata::new());
    }
    let Some(root) = config.as_object_mut() else {
        anyhow::bail!("host configuration is not an object");
    };

    for (key, definitions) in sections {
        if definitions.is_empty() {
            continue;
        }
        let section = root
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Metadata::new()));
        let Some(section) = section.as_object_mut() else {
            anyhow::bail!("host configuration `{}` is not an object", key);
        };
        for (name, definition) in definitions {
            section
                .entry(name.clone())
                .or_insert_with(|| definition.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;
    use crate::extensions::protocol::ToolDefinition;
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn package() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "agents/foo.md", "---\ndescription: hi\n---\nHello");
        write(dir.path(), "commands/bar.md", "---\ndescription: Bar\n---\nDo bar");
        write(dir.path(), "plugins/tools.json", r#"{"exports": ["tools"]}"#);
        write(dir.path(), "themes/night.json", "{}");
        dir
    }

    fn registry(calls: Arc<AtomicUsize>) -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry.register("tools", move |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(HookSet::new().with_tool("lint", ToolDefinition::new("Run the linter")))
            }
        });
        registry
    }

    #[tokio::test]
    async fn test_activation_injects_new_definitions_and_plugins() {
        let source = package();
        let project = TempDir::new().unwrap();
        let target = project.path().join(".opencode");
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = registry(calls.clone());
        let sink = Arc::new(MemorySink::new());

        let base = HookSet::new().with_tool("base", ToolDefinition::new("Pre-declared"));
        let input = PluginInput::new(project.path(), &target);
        let outcome = Activation::new(source.path(), &target, &registry, sink.clone())
            .run(&base, &input)
            .await
            .unwrap();

        assert_eq!(outcome.report.created.len(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outcome.hooks.tool.contains_key("base"));
        assert!(outcome.hooks.tool.contains_key("lint"));
        assert_eq!(outcome.agents.names().collect::<Vec<_>>(), vec!["foo"]);

        let call = HookCall::new(json!({}), json!({"agent": {"build": {"mode": "primary"}}}));
        outcome
            .hooks
            .dispatch(HookSlot::Config, call.clone())
            .await
            .unwrap();

        assert_eq!(
            call.output().await,
            json!({
                "agent": {
                    "build": {"mode": "primary"},
                    "foo": {"description": "hi", "prompt": "Hello"}
                },
                "command": {
                    "bar": {"description": "Bar", "template": "Do bar"}
                }
            })
        );
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_second_activation_returns_base() {
        let source = package();
        let project = TempDir::new().unwrap();
        let target = project.path().join(".opencode");
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = registry(calls.clone());
        let input = PluginInput::new(project.path(), &target);
        let activation = Activation::new(source.path(), &target, &registry, Arc::new(MemorySink::new()));

        activation.run(&HookSet::new(), &input).await.unwrap();
        let outcome = activation.run(&HookSet::new(), &input).await.unwrap();

        assert!(outcome.report.created.is_empty());
        assert_eq!(outcome.report.skipped.len(), 4);
        assert!(outcome.hooks.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_only_newly_created_definitions_are_injected() {
        let source = package();
        write(source.path(), "agents/extra.md", "Extra prompt");
        let project = TempDir::new().unwrap();
        let target = project.path().join(".opencode");
        write(&target, "agents/foo.md", "user's own foo");

        let registry = PluginRegistry::new();
        let sink = Arc::new(MemorySink::new());
        let input = PluginInput::new(project.path(), &target);
        let outcome = Activation::new(source.path(), &target, &registry, sink.clone())
            .run(&HookSet::new(), &input)
            .await
            .unwrap();

        assert_eq!(outcome.agents.names().collect::<Vec<_>>(), vec!["extra"]);
        assert_eq!(outcome.commands.len(), 1);
        // `tools` is exported but not registered
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_config_hook_rejects_non_object_section() {
        let mut agents = DefinitionSet::new();
        agents.insert(crate::extensions::loader::Definition::from_document(
            "a",
            DefinitionKind::Agent,
            crate::frontmatter::parse("prompt"),
        ));
        let set = definitions_hook_set(&agents, &DefinitionSet::new());

        let call = HookCall::new(json!({}), json!({"agent": "nope"}));
        assert!(set.dispatch(HookSlot::Config, call).await.is_err());
    }
}
