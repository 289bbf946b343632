//! extpack - install OpenCode extension packages
//!
//! This is the main entry point for the extpack binary.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

mod cli;
mod runner;

use cli::Args;
use extpack::config::Config;
use extpack::diagnostics::{DiagnosticSink, FanoutSink, JsonLinesSink, TracingSink};
use runner::Runner;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.debug);

    info!("Starting extpack v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match load_config(args.config.as_deref(), &args.project) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let sink = build_sink(&config, &args.project);
    let runner = Runner::new(config, &args.project, sink);

    if let Err(e) = runner.run(args.command).await {
        error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn load_config(cli_config: Option<&Path>, project_dir: &Path) -> extpack::Result<Config> {
    let mut config = Config::load(cli_config)?;
    config.load_project_config(project_dir)?;
    config.validate()?;
    Ok(config)
}

/// Diagnostics always go to tracing, and to a JSON lines file when configured
fn build_sink(config: &Config, project_dir: &Path) -> Arc<dyn DiagnosticSink> {
    let mut sink = FanoutSink::new().with(Arc::new(TracingSink));

    if let Some(log_path) = &config.diagnostics.log_path {
        let path = project_dir.join(log_path);
        match JsonLinesSink::open(&path) {
            Ok(file_sink) => sink = sink.with(Arc::new(file_sink)),
            Err(e) => error!("Failed to open diagnostics log {:?}: {}", path, e),
        }
    }

    Arc::new(sink)
}

/// Initialize the logging/tracing subsystem
fn init_logging(debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
