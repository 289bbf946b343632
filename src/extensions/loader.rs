//! Definition loader
//!
//! Reads agent and command definitions (markdown with frontmatter) from a
//! source tree.

use super::kind::DefinitionKind;
use crate::diagnostics::{Diagnostic, DiagnosticEvent, DiagnosticSink};
use crate::frontmatter::{self, ExtensionDocument, Metadata};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Suffix of definition documents
pub const DEFINITION_SUFFIX: &str = ".md";

/// A named agent or command
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    /// File base name without the suffix
    pub name: String,
    pub kind: DefinitionKind,
    /// Frontmatter fields plus the body under `prompt` or `template`
    pub fields: Metadata,
}

impl Definition {
    /// Build from a parsed document. The body field wins over a
    /// frontmatter key of the same name.
    pub fn from_document(name: &str, kind: DefinitionKind, document: ExtensionDocument) -> Self {
        let mut fields = document.metadata;
        fields.insert(kind.body_field().to_string(), Value::String(document.body));
        Self {
            name: name.to_string(),
            kind,
            fields,
        }
    }

    /// Document body
    pub fn body(&self) -> &str {
        self.fields
            .get(self.kind.body_field())
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Definitions of one kind, in discovery order, unique by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionSet {
    entries: Vec<Definition>,
}

impl DefinitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition. A definition with the same name is replaced in
    /// place and returned.
    pub fn insert(&mut self, definition: Definition) -> Option<Definition> {
        match self.entries.iter_mut().find(|d| d.name == definition.name) {
            Some(existing) => Some(std::mem::replace(existing, definition)),
            None => {
                self.entries.push(definition);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.entries.iter().find(|d| d.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|d| d.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.entries.iter()
    }

    pub fn retain(&mut self, keep: impl FnMut(&Definition) -> bool) {
        self.entries.retain(keep);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Definitions as a JSON object keyed by name, the shape the host
    /// configuration uses for its `agent` and `command` sections
    pub fn to_config_map(&self) -> Metadata {
        self.entries
            .iter()
            .map(|d| (d.name.clone(), Value::Object(d.fields.clone())))
            .collect()
    }
}

/// Loads definitions, reporting unreadable files to a diagnostic sink
pub struct DefinitionLoader {
    sink: Arc<dyn DiagnosticSink>,
}

impl DefinitionLoader {
    /// Create a new definition loader
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { sink }
    }

    /// Load every `*.md` file directly under `<source_root>/<kind dir>`.
    ///
    /// A missing directory yields an empty set. A file that cannot be read
    /// is reported and skipped.
    pub async fn load(&self, source_root: &Path, kind: DefinitionKind) -> DefinitionSet {
        let dir = source_root.join(kind.extension_kind().dir_name());
        let mut definitions = DefinitionSet::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Definition directory does not exist: {:?}", dir);
                return definitions;
            }
            Err(e) => {
                self.warn(&dir, format!("Failed to read directory: {}", e));
                return definitions;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    self.warn(&dir, format!("Failed to list directory: {}", e));
                    break;
                }
            };

            let path = entry.path();
            let file_name = entry.file_name();
            let Some(name) = file_name
                .to_str()
                .and_then(|n| n.strip_suffix(DEFINITION_SUFFIX))
            else {
                continue;
            };

            match fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    self.warn(&path, format!("Failed to stat file: {}", e));
                    continue;
                }
            }

            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    self.warn(&path, format!("Failed to read {}: {}", kind.config_key(), e));
                    continue;
                }
            };

            let definition = Definition::from_document(name, kind, frontmatter::parse(&content));
            if definitions.insert(definition).is_some() {
                debug!("Duplicate {} '{}' replaced by {:?}", kind.config_key(), name, path);
            }
        }

        info!(
            "Loaded {} {} definition(s) from {:?}",
            definitions.len(),
            kind.config_key(),
            dir
        );
        definitions
    }

    /// Load agents from `<source_root>/agents`
    pub async fn load_agents(&self, source_root: &Path) -> DefinitionSet {
        self.load(source_root, DefinitionKind::Agent).await
    }

    /// Load commands from `<source_root>/commands`
    pub async fn load_commands(&self, source_root: &Path) -> DefinitionSet {
        self.load(source_root, DefinitionKind::Command).await
    }

    fn warn(&self, path: &Path, message: String) {
        self.sink
            .report(Diagnostic::warning(DiagnosticEvent::DefinitionLoad, path, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;
    use serde_json::json;
    use std::fs as stdfs;
    use tempfile::TempDir;

    fn loader() -> (DefinitionLoader, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (DefinitionLoader::new(sink.clone()), sink)
    }

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        stdfs::create_dir_all(path.parent().unwrap()).unwrap();
        stdfs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_load_agent_definition() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "agents/foo.md", b"---\ndescription: hi\n---\nHello");

        let (loader, sink) = loader();
        let agents = loader.load_agents(temp_dir.path()).await;

        assert_eq!(agents.len(), 1);
        assert_eq!(
            Value::Object(agents.to_config_map()),
            json!({"foo": {"description": "hi", "prompt": "Hello"}})
        );
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_command_body_goes_to_template() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "commands/review.md",
            b"---\ndescription: Review changes\nagent: reviewer\n---\n\nReview $ARGUMENTS\n",
        );

        let (loader, _) = loader();
        let commands = loader.load_commands(temp_dir.path()).await;

        let review = commands.get("review").unwrap();
        assert_eq!(review.body(), "Review $ARGUMENTS");
        assert_eq!(review.fields.get("agent"), Some(&json!("reviewer")));
        assert!(review.fields.get("prompt").is_none());
    }

    #[tokio::test]
    async fn test_document_without_header_keeps_raw_body() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "agents/plain.md", b"\nJust a prompt\n");

        let (loader, _) = loader();
        let agents = loader.load_agents(temp_dir.path()).await;

        assert_eq!(agents.get("plain").unwrap().body(), "\nJust a prompt\n");
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let (loader, sink) = loader();

        assert!(loader.load_agents(temp_dir.path()).await.is_empty());
        assert!(loader.load_commands(temp_dir.path()).await.is_empty());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "agents/one.md", b"---\nmode: primary\n---\nfirst");
        write(temp_dir.path(), "agents/two.md", &[0xff, 0xfe, 0x00, 0x80]);
        write(temp_dir.path(), "agents/three.md", b"third");

        let (loader, sink) = loader();
        let agents = loader.load_agents(temp_dir.path()).await;

        assert_eq!(agents.len(), 2);
        assert!(agents.get("one").is_some());
        assert!(agents.get("three").is_some());
        assert!(agents.get("two").is_none());

        let diagnostics = sink.entries();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].event, DiagnosticEvent::DefinitionLoad);
        assert!(diagnostics[0].path.ends_with("agents/two.md"));
    }

    #[tokio::test]
    async fn test_non_markdown_and_directories_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "agents/notes.txt", b"ignored");
        write(temp_dir.path(), "agents/nested.md/inner.md", b"ignored");
        write(temp_dir.path(), "agents/real.md", b"kept");

        let (loader, _) = loader();
        let agents = loader.load_agents(temp_dir.path()).await;

        assert_eq!(agents.names().collect::<Vec<_>>(), vec!["real"]);
    }

    #[test]
    fn test_duplicate_name_replaced_in_place() {
        let mut set = DefinitionSet::new();
        let doc = |body: &str| ExtensionDocument {
            metadata: Metadata::new(),
            body: body.to_string(),
        };

        set.insert(Definition::from_document("a", DefinitionKind::Agent, doc("first")));
        set.insert(Definition::from_document("b", DefinitionKind::Agent, doc("other")));
        let old = set.insert(Definition::from_document("a", DefinitionKind::Agent, doc("second")));

        assert_eq!(old.unwrap().body(), "first");
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(set.get("a").unwrap().body(), "second");
    }

    #[test]
    fn test_body_field_overrides_frontmatter_key() {
        let document = frontmatter::parse("---\nprompt: from header\n---\nfrom body");
        let definition = Definition::from_document("x", DefinitionKind::Agent, document);
        assert_eq!(definition.body(), "from body");
    }
}
