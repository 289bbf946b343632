//! Extension kinds
//!
//! The six directories an extension package may ship. Every kind is copied
//! by the installer; only agents, commands and plugins are read by the core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a file-based extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionKind {
    Agents,
    Commands,
    Plugins,
    Skills,
    Tools,
    Themes,
}

impl ExtensionKind {
    /// All kinds, in install order
    pub const ALL: [ExtensionKind; 6] = [
        Self::Agents,
        Self::Commands,
        Self::Plugins,
        Self::Skills,
        Self::Tools,
        Self::Themes,
    ];

    /// Directory name under a source or target root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Agents => "agents",
            Self::Commands => "commands",
            Self::Plugins => "plugins",
            Self::Skills => "skills",
            Self::Tools => "tools",
            Self::Themes => "themes",
        }
    }

    /// Whether files of this kind are copied without being interpreted
    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::Skills | Self::Tools | Self::Themes)
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for ExtensionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.dir_name() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown extension kind: {}", s))
    }
}

/// Kinds that hold markdown definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Agent,
    Command,
}

impl DefinitionKind {
    /// Directory scanned for this kind
    pub fn extension_kind(&self) -> ExtensionKind {
        match self {
            Self::Agent => ExtensionKind::Agents,
            Self::Command => ExtensionKind::Commands,
        }
    }

    /// Field that receives the document body
    pub fn body_field(&self) -> &'static str {
        match self {
            Self::Agent => "prompt",
            Self::Command => "template",
        }
    }

    /// Key under which the host configuration groups definitions of this kind
    pub fn config_key(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Command => "command",
        }
    }
}
