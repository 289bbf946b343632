//! Extension system
//!
//! Loads agent and command definitions, runs plugin modules through a
//! static factory registry, and composes the resulting hooks.

mod activation;
mod compose;
mod executor;
mod kind;
mod loader;
mod protocol;

pub use activation::{Activation, ActivationOutcome};
pub use compose::{merge_all, merge_hooks};
pub use executor::{
    discover_modules, is_module_file, plugin_factory, PluginExecutor, PluginFactory,
    PluginModule, PluginRegistry, MODULE_SUFFIXES,
};
pub use kind::{DefinitionKind, ExtensionKind};
pub use loader::{Definition, DefinitionLoader, DefinitionSet, DEFINITION_SUFFIX};
pub use protocol::{
    AuthMethod, AuthProvider, BoxFuture, Hook, HookCall, HookSet, HookSlot, ParameterDef,
    PluginInput, ToolDefinition,
};
