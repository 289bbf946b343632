//! Subcommand runner
//!
//! Glues configuration, npm, the manifest and the installer together for
//! each CLI subcommand and prints the outcome.

use crate::cli::Command;
use extpack::config::Config;
use extpack::diagnostics::DiagnosticSink;
use extpack::extensions::{
    discover_modules, DefinitionKind, DefinitionLoader, ExtensionKind, PluginModule,
};
use extpack::installer::{self, InstallOptions, InstallReport};
use extpack::manifest::ProjectManifest;
use extpack::npm::{validate_package_name, Npm};
use extpack::search::RegistrySearch;
use extpack::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Runs one subcommand against a project directory
pub struct Runner {
    config: Config,
    project_dir: PathBuf,
    sink: Arc<dyn DiagnosticSink>,
}

impl Runner {
    /// Create a new runner
    pub fn new(config: Config, project_dir: &Path, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            config,
            project_dir: project_dir.to_path_buf(),
            sink,
        }
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Add {
                package,
                overwrite,
                skip_npm,
            } => self.add(&package, overwrite, skip_npm).await,
            Command::Remove { package, skip_npm } => self.remove(&package, skip_npm).await,
            Command::Search { query, limit } => self.search(&query, limit).await,
            Command::Install { source, overwrite } => self.install(&source, overwrite).await,
            Command::List => self.list().await,
        }
    }

    fn target_root(&self) -> PathBuf {
        self.config.target_root(&self.project_dir)
    }

    fn npm(&self) -> Npm {
        Npm::new(&self.config.npm.command, &self.project_dir)
    }

    fn install_options(&self, overwrite: bool) -> InstallOptions {
        InstallOptions {
            overwrite: overwrite || self.config.install.overwrite,
            kinds: self.config.install.kinds.clone(),
        }
    }

    async fn add(&self, package: &str, overwrite: bool, skip_npm: bool) -> Result<()> {
        validate_package_name(package)?;
        let npm = self.npm();
        if !skip_npm {
            npm.install(package).await?;
        }
        let source = npm.package_dir(package).await?;

        let report = installer::install(&source, &self.target_root(), &self.install_options(overwrite))
            .await?;

        let mut manifest =
            ProjectManifest::load(&self.config.manifest_path(&self.project_dir)).await?;
        if manifest.add_plugin(package)? {
            manifest.save().await?;
            info!("Added {} to {:?}", package, manifest.path());
        }

        println!("Added {}", package);
        self.print_report(&report);
        Ok(())
    }

    async fn remove(&self, package: &str, skip_npm: bool) -> Result<()> {
        validate_package_name(package)?;
        let npm = self.npm();

        // The package tree is the reference for what may be deleted, so it
        // has to be read before npm removes it
        match npm.package_dir(package).await {
            Ok(source) => {
                let report =
                    installer::uninstall(&source, &self.target_root(), &self.config.install.kinds)
                        .await?;
                for path in &report.removed {
                    println!("  removed  {}", self.display(path));
                }
                for path in &report.kept {
                    println!("  kept     {} (modified)", self.display(path));
                }
            }
            Err(e) => println!("Skipping file cleanup: {}", e),
        }

        let mut manifest =
            ProjectManifest::load(&self.config.manifest_path(&self.project_dir)).await?;
        if manifest.remove_plugin(package)? {
            manifest.save().await?;
        }

        if !skip_npm {
            npm.uninstall(package).await?;
        }
        println!("Removed {}", package);
        Ok(())
    }

    async fn search(&self, query: &str, limit: Option<u32>) -> Result<()> {
        let search = RegistrySearch::new(self.config.search.clone())?;
        let outcome = search
            .search(query, limit.unwrap_or(self.config.search.limit))
            .await;

        if outcome.results.is_empty() {
            println!("No extensions found for '{}'", query);
        }
        for result in &outcome.results {
            let version = result
                .version
                .as_deref()
                .map(|v| format!("@{}", v))
                .unwrap_or_default();
            println!("{}{}  [{}]", result.name, version, result.source);
            if !result.description.is_empty() {
                println!("    {}", result.description);
            }
            println!("    {}", result.url);
        }
        for (source, error) in &outcome.failures {
            eprintln!("warning: {} search failed: {}", source, error);
        }
        Ok(())
    }

    async fn install(&self, source: &Path, overwrite: bool) -> Result<()> {
        let report =
            installer::install(source, &self.target_root(), &self.install_options(overwrite))
                .await?;

        println!("Installed from {}", source.display());
        self.print_report(&report);
        Ok(())
    }

    async fn list(&self) -> Result<()> {
        let root = self.target_root();
        let loader = DefinitionLoader::new(self.sink.clone());

        for kind in [DefinitionKind::Agent, DefinitionKind::Command] {
            let definitions = loader.load(&root, kind).await;
            println!("{} ({}):", kind.extension_kind(), definitions.len());
            for definition in definitions.iter() {
                match definition.fields.get("description").and_then(|d| d.as_str()) {
                    Some(description) => println!("  {} - {}", definition.name, description),
                    None => println!("  {}", definition.name),
                }
            }
        }

        let modules = discover_modules(&root.join(ExtensionKind::Plugins.dir_name())).await?;
        println!("{} ({}):", ExtensionKind::Plugins, modules.len());
        for path in &modules {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            match PluginModule::read(path).await {
                Ok(module) => println!("  {}: {}", name, module.exports.join(", ")),
                Err(e) => println!("  {}: {}", name, e),
            }
        }

        for kind in ExtensionKind::ALL.into_iter().filter(ExtensionKind::is_opaque) {
            let files = installer::installed_files(&root, kind).await?;
            println!("{}: {} file(s)", kind, files.len());
        }
        Ok(())
    }

    fn print_report(&self, report: &InstallReport) {
        for path in &report.created {
            println!("  created  {}", self.display(path));
        }
        for path in report.overwritten() {
            println!("  updated  {}", self.display(path));
        }
        for path in &report.skipped {
            println!("  skipped  {} (exists)", self.display(path));
        }
        println!(
            "{} created, {} updated, {} skipped",
            report.created.len(),
            report.overwritten().count(),
            report.skipped.len()
        );
    }

    /// `path` relative to the extension tree when possible
    fn display(&self, path: &Path) -> String {
        let root = installer::absolutize(&self.target_root()).unwrap_or_else(|_| self.target_root());
        path.strip_prefix(&root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}
