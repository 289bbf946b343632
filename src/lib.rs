//! extpack - installer for file-based OpenCode extensions
//!
//! Packages ship agents, commands, plugins, skills, tools and themes as
//! plain files. This crate copies them into a project's extension tree,
//! parses agent and command definitions, runs plugin modules through a
//! static factory registry and composes the hooks they return.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extensions;
pub mod frontmatter;
pub mod installer;
pub mod manifest;
pub mod npm;
pub mod search;

pub use error::{ExtpackError, Result};
