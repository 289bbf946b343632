//! Diagnostic sinks
//!
//! Discovery and composition never fail a whole batch because of one bad
//! extension file. Instead they report a [`Diagnostic`] to a sink and move
//! on. The sink decides what happens to it: print through `tracing`, collect
//! for a summary, or append to a JSON lines file.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, warn};
use uuid::Uuid;

/// Identifier shared by every diagnostic emitted by this process
static RUN_ID: Lazy<String> = Lazy::new(|| Uuid::new_v4().to_string());

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Warning,
}

/// What was being done when the diagnostic was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticEvent {
    /// Reading or parsing an agent/command definition
    DefinitionLoad,
    /// Reading or deserializing a plugin module manifest
    ModuleLoad,
    /// A module exports a name that nothing registered
    UnknownExport,
    /// A plugin factory returned an error
    PluginInvoke,
}

/// A single structured report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub event: DiagnosticEvent,
    /// File the problem is attributed to
    pub path: PathBuf,
    pub message: String,
}

impl Diagnostic {
    /// Create a warning attributed to `path`
    pub fn warning(event: DiagnosticEvent, path: &Path, message: impl Into<String>) -> Self {
        Self {
            run_id: RUN_ID.clone(),
            timestamp: Utc::now(),
            level: Level::Warning,
            event,
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Create an informational note attributed to `path`
    pub fn info(event: DiagnosticEvent, path: &Path, message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            ..Self::warning(event, path, message)
        }
    }

    /// Get the run ID
    pub fn run_id() -> &'static str {
        &RUN_ID
    }
}

/// Receiver for diagnostics
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, d: Diagnostic) {
        match d.level {
            Level::Warning => warn!(event = ?d.event, path = %d.path.display(), "{}", d.message),
            Level::Info => tracing::info!(event = ?d.event, path = %d.path.display(), "{}", d.message),
        }
    }
}

/// Keeps every diagnostic in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, diagnostic: Diagnostic) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(diagnostic);
        }
    }
}

/// Appends one JSON object per line to a file
pub struct JsonLinesSink {
    file: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Open (or create) the log file, creating parent directories
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl DiagnosticSink for JsonLinesSink {
    fn report(&self, diagnostic: Diagnostic) {
        let json = match serde_json::to_string(&diagnostic) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize diagnostic: {}", e);
                return;
            }
        };

        let Ok(mut file) = self.file.lock() else {
            return;
        };
        if let Err(e) = writeln!(file, "{}", json) {
            error!("Failed to write diagnostic: {}", e);
        }
        if let Err(e) = file.flush() {
            warn!("Failed to flush diagnostic log: {}", e);
        }
    }
}

/// Sends each diagnostic to several sinks
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn DiagnosticSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl DiagnosticSink for FanoutSink {
    fn report(&self, diagnostic: Diagnostic) {
        for sink in &self.sinks {
            sink.report(diagnostic.clone());
        }
    }
}
