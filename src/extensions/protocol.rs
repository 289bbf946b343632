//! Hook protocol definitions
//!
//! Defines what a plugin hands back to the host: a [`HookSet`] with a tool
//! map, an optional auth provider and a callable per hook slot.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Boxed, sendable future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type HookFn = dyn Fn(HookCall) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// Named callable slots of a [`HookSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookSlot {
    /// Every host event
    Event,
    /// Mutates the host configuration before it is applied
    Config,
    ChatMessage,
    ChatParams,
    ChatHeaders,
    PermissionAsk,
    CommandExecuteBefore,
    CommandExecuteAfter,
    ToolExecuteBefore,
    ToolExecuteAfter,
    ToolDefinition,
    ShellEnv,
    MessagesTransform,
    SystemTransform,
    SessionCompacting,
    TextComplete,
}

impl HookSlot {
    pub const ALL: [HookSlot; 16] = [
        Self::Event,
        Self::Config,
        Self::ChatMessage,
        Self::ChatParams,
        Self::ChatHeaders,
        Self::PermissionAsk,
        Self::CommandExecuteBefore,
        Self::CommandExecuteAfter,
        Self::ToolExecuteBefore,
        Self::ToolExecuteAfter,
        Self::ToolDefinition,
        Self::ShellEnv,
        Self::MessagesTransform,
        Self::SystemTransform,
        Self::SessionCompacting,
        Self::TextComplete,
    ];

    /// Name the host uses for this slot
    pub fn name(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Config => "config",
            Self::ChatMessage => "chat.message",
            Self::ChatParams => "chat.params",
            Self::ChatHeaders => "chat.headers",
            Self::PermissionAsk => "permission.ask",
            Self::CommandExecuteBefore => "command.execute.before",
            Self::CommandExecuteAfter => "command.execute.after",
            Self::ToolExecuteBefore => "tool.execute.before",
            Self::ToolExecuteAfter => "tool.execute.after",
            Self::ToolDefinition => "tool.definition",
            Self::ShellEnv => "shell.env",
            Self::MessagesTransform => "experimental.chat.messages.transform",
            Self::SystemTransform => "experimental.chat.system.transform",
            Self::SessionCompacting => "experimental.session.compacting",
            Self::TextComplete => "experimental.text.complete",
        }
    }
}

impl fmt::Display for HookSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HookSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|slot| slot.name() == s)
            .ok_or_else(|| format!("Unknown hook slot: {}", s))
    }
}

/// Arguments handed to a hook invocation.
///
/// `input` is read-only context. `output` is shared by every hook chained
/// in the same slot, so a transform hook sees the changes of the hooks that
/// ran before it.
#[derive(Debug, Clone, Default)]
pub struct HookCall {
    pub input: Arc<Value>,
    pub output: Arc<Mutex<Value>>,
}

impl HookCall {
    pub fn new(input: Value, output: Value) -> Self {
        Self {
            input: Arc::new(input),
            output: Arc::new(Mutex::new(output)),
        }
    }

    /// Call for notification-style hooks that have nothing to shape
    pub fn notify(input: Value) -> Self {
        Self::new(input, Value::Null)
    }

    /// Copy of the current output value
    pub async fn output(&self) -> Value {
        self.output.lock().await.clone()
    }
}

/// A shareable async hook callable
#[derive(Clone)]
pub struct Hook(Arc<HookFn>);

impl Hook {
    /// Wrap an async closure
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(HookCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self(Arc::new(
            move |call| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(f(call)) },
        ))
    }

    /// Invoke the hook
    pub async fn call(&self, call: HookCall) -> anyhow::Result<()> {
        (self.0)(call).await
    }

    /// Hook that runs `self` to completion, then `next`.
    ///
    /// An error from `self` is returned without running `next`.
    pub fn then(&self, next: &Hook) -> Hook {
        let first = self.clone();
        let second = next.clone();
        Hook::new(move |call: HookCall| {
            let first = first.clone();
            let second = second.clone();
            async move {
                first.call(call.clone()).await?;
                second.call(call).await
            }
        })
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

/// Tool definition contributed by a plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Human-readable description
    pub description: String,
    /// Parameter definitions
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
}

impl ToolDefinition {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            parameters: vec![],
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterDef) -> Self {
        self.parameters.push(parameter);
        self
    }
}

/// Parameter definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name
    pub name: String,
    /// Parameter type (string, number, boolean, array, object)
    #[serde(rename = "type")]
    pub param_type: String,
    /// Description
    pub description: String,
    /// Whether parameter is required
    #[serde(default)]
    pub required: bool,
    /// Default value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterDef {
    /// A required parameter without default
    pub fn required(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: param_type.to_string(),
            description: description.to_string(),
            required: true,
            default: None,
        }
    }
}

/// Authentication provider; at most one per composed set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthProvider {
    /// Provider id, e.g. "anthropic"
    pub provider: String,
    #[serde(default)]
    pub methods: Vec<AuthMethod>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthMethod {
    /// "oauth" or "api"
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
}

/// Hooks returned by one plugin factory, or the composition of several
#[derive(Debug, Clone, Default)]
pub struct HookSet {
    /// Tool name to definition
    pub tool: BTreeMap<String, ToolDefinition>,
    pub auth: Option<AuthProvider>,
    pub(crate) hooks: BTreeMap<HookSlot, Hook>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: &str, definition: ToolDefinition) -> Self {
        self.tool.insert(name.to_string(), definition);
        self
    }

    pub fn with_auth(mut self, auth: AuthProvider) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the callable for `slot`, replacing any previous one
    pub fn with_hook(mut self, slot: HookSlot, hook: Hook) -> Self {
        self.hooks.insert(slot, hook);
        self
    }

    /// Callable registered for `slot`
    pub fn hook(&self, slot: HookSlot) -> Option<&Hook> {
        self.hooks.get(&slot)
    }

    /// Slots with a callable, in catalogue order
    pub fn slots(&self) -> impl Iterator<Item = HookSlot> + '_ {
        self.hooks.keys().copied()
    }

    /// True when no slot carries a value
    pub fn is_empty(&self) -> bool {
        self.tool.is_empty() && self.auth.is_none() && self.hooks.is_empty()
    }

    /// Run the hook for `slot` if one is set
    pub async fn dispatch(&self, slot: HookSlot, call: HookCall) -> anyhow::Result<()> {
        match self.hooks.get(&slot) {
            Some(hook) => hook.call(call).await,
            None => Ok(()),
        }
    }
}

/// Context passed to every plugin factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInput {
    /// Project the host is running in
    pub project_dir: PathBuf,
    /// Root of the version-controlled worktree
    pub worktree: PathBuf,
    /// Project extension tree (e.g. `<project>/.opencode`)
    pub extension_root: PathBuf,
}

impl PluginInput {
    pub fn new(project_dir: &Path, extension_root: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            worktree: project_dir.to_path_buf(),
            extension_root: extension_root.to_path_buf(),
        }
    }

    pub fn with_worktree(mut self, worktree: &Path) -> Self {
        self.worktree = worktree.to_path_buf();
        self
    }
}
