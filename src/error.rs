//! Error types for extpack

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for extpack
#[derive(Error, Debug)]
pub enum ExtpackError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    #[error("Package manager error: {0}")]
    Package(#[from] PackageError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Errors raised while copying or removing extension files
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Source directory not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// npm subprocess errors
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Package not installed: {0}")]
    NotInstalled(String),

    #[error("Invalid package name: {0}")]
    InvalidName(String),
}

/// Registry search errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse registry response: {0}")]
    Parse(String),
}

/// Project manifest (`opencode.json`) errors
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest field `{0}` has an unexpected type")]
    InvalidField(String),
}

/// Result type alias using ExtpackError
pub type Result<T> = std::result::Result<T, ExtpackError>;
