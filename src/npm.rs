//! npm subprocess wrapper
//!
//! Packages are installed into the project's `node_modules` so their
//! extension trees can be copied out of `node_modules/<name>`.

use crate::error::PackageError;
use crate::manifest::package_name;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

type Result<T> = std::result::Result<T, PackageError>;

/// Optional scope, name, optional `@version`
static PACKAGE_SPEC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(@[a-zA-Z0-9][\w.-]*/)?[a-zA-Z0-9][\w.-]*(@[\w.^~<>=*|-]+)?$").unwrap()
});

/// Reject anything npm would read as a flag, path or URL
pub fn validate_package_name(spec: &str) -> Result<()> {
    if PACKAGE_SPEC.is_match(spec) {
        Ok(())
    } else {
        Err(PackageError::InvalidName(spec.to_string()))
    }
}

/// Runs npm in a project directory
#[derive(Debug, Clone)]
pub struct Npm {
    command: String,
    project_dir: PathBuf,
}

impl Npm {
    pub fn new(command: &str, project_dir: &Path) -> Self {
        Self {
            command: command.to_string(),
            project_dir: project_dir.to_path_buf(),
        }
    }

    /// `npm install <package>`
    pub async fn install(&self, package: &str) -> Result<()> {
        validate_package_name(package)?;
        info!("Installing {} with {}", package, self.command);
        self.run(&["install", package]).await
    }

    /// `npm uninstall <package>`
    pub async fn uninstall(&self, package: &str) -> Result<()> {
        validate_package_name(package)?;
        info!("Uninstalling {} with {}", package, self.command);
        self.run(&["uninstall", package_name(package)]).await
    }

    /// Installed location of `package`, which must exist
    pub async fn package_dir(&self, package: &str) -> Result<PathBuf> {
        let dir = self.project_dir.join("node_modules").join(package_name(package));
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            _ => Err(PackageError::NotInstalled(package_name(package).to_string())),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<()> {
        let command_line = format!("{} {}", self.command, args.join(" "));
        debug!("Running `{}` in {:?}", command_line, self.project_dir);

        let output = Command::new(&self.command)
            .args(args)
            .current_dir(&self.project_dir)
            .output()
            .await
            .map_err(|source| PackageError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        let status = match output.status.code() {
            Some(code) => format!("code {}", code),
            None => "signal".to_string(),
        };
        Err(PackageError::CommandFailed {
            command: command_line,
            status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
