//! Command-line argument parsing for extpack

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// extpack - install OpenCode extension packages into a project
#[derive(Parser, Debug)]
#[command(name = "extpack")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Project directory
    #[arg(short, long, value_name = "DIR", default_value = ".", global = true)]
    pub project: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Install an npm package and copy its extensions into the project
    Add {
        /// Package name, optionally with @version
        package: String,

        /// Replace files that already exist
        #[arg(long)]
        overwrite: bool,

        /// Use the package already present in node_modules
        #[arg(long)]
        skip_npm: bool,
    },

    /// Remove a package's unmodified files and uninstall it
    Remove {
        /// Package name
        package: String,

        /// Leave node_modules untouched
        #[arg(long)]
        skip_npm: bool,
    },

    /// Search npm and GitHub for extension packages
    Search {
        /// Search terms
        query: String,

        /// Maximum results per source
        #[arg(short, long, value_name = "N")]
        limit: Option<u32>,
    },

    /// Copy a local extension tree into the project
    Install {
        /// Directory containing agents/, commands/, plugins/, ...
        source: PathBuf,

        /// Replace files that already exist
        #[arg(long)]
        overwrite: bool,
    },

    /// Show the extensions installed in the project
    List,
}
