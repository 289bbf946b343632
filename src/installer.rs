//! Extension installer
//!
//! Copies a package's extension tree into a project's extension tree and
//! removes it again on uninstall.

use crate::error::InstallError;
use crate::extensions::ExtensionKind;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

type Result<T> = std::result::Result<T, InstallError>;

/// Options for one install pass
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Replace files that already exist at the destination
    pub overwrite: bool,
    /// Kinds to copy
    pub kinds: Vec<ExtensionKind>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            kinds: ExtensionKind::ALL.to_vec(),
        }
    }
}

/// Destination paths touched by one install pass.
///
/// Every `created` path is also in `copied`; `skipped` never overlaps
/// `copied`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstallReport {
    pub copied: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub created: Vec<PathBuf>,
}

impl InstallReport {
    /// Whether `path` did not exist before this pass
    pub fn was_created(&self, path: &Path) -> bool {
        self.created.iter().any(|p| p == path)
    }

    /// Copied files that replaced an existing file
    pub fn overwritten(&self) -> impl Iterator<Item = &PathBuf> {
        self.copied.iter().filter(|p| !self.was_created(p))
    }
}

/// Files removed by [`uninstall`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UninstallReport {
    pub removed: Vec<PathBuf>,
    /// Installed files left in place because they were modified locally
    pub kept: Vec<PathBuf>,
}

/// Copy `<source_root>/<kind>` into `<target_root>/<kind>` for every
/// requested kind. Kinds the source does not ship are skipped.
pub async fn install(
    source_root: &Path,
    target_root: &Path,
    options: &InstallOptions,
) -> Result<InstallReport> {
    if !is_dir(source_root).await {
        return Err(InstallError::SourceMissing(source_root.to_path_buf()));
    }

    let target_root = absolutize(target_root)?;
    let mut report = InstallReport::default();

    for kind in &options.kinds {
        let from = source_root.join(kind.dir_name());
        if !is_dir(&from).await {
            debug!("Package has no {} directory", kind);
            continue;
        }
        copy_tree(&from, &target_root.join(kind.dir_name()), options.overwrite, &mut report)
            .await?;
    }

    info!(
        "Installed from {:?}: {} copied, {} skipped, {} created",
        source_root,
        report.copied.len(),
        report.skipped.len(),
        report.created.len()
    );
    Ok(report)
}

/// Remove installed files that still match the package's copy byte for
/// byte, then prune directories left empty.
pub async fn uninstall(
    source_root: &Path,
    target_root: &Path,
    kinds: &[ExtensionKind],
) -> Result<UninstallReport> {
    let target_root = absolutize(target_root)?;
    let mut report = UninstallReport::default();

    for kind in kinds {
        let from = source_root.join(kind.dir_name());
        if !is_dir(&from).await {
            continue;
        }

        let mut touched_dirs = Vec::new();
        for (source, destination) in walk_files(&from, &target_root.join(kind.dir_name())).await? {
            if !fs::try_exists(&destination).await.unwrap_or(false) {
                continue;
            }

            let original = read(&source).await?;
            let installed = read(&destination).await?;
            if original != installed {
                debug!("Keeping locally modified {:?}", destination);
                report.kept.push(destination);
                continue;
            }

            fs::remove_file(&destination)
                .await
                .map_err(|source| InstallError::Remove {
                    path: destination.clone(),
                    source,
                })?;
            if let Some(parent) = destination.parent() {
                touched_dirs.push(parent.to_path_buf());
            }
            report.removed.push(destination);
        }

        prune_empty_dirs(touched_dirs, &target_root).await;
    }

    info!(
        "Uninstalled from {:?}: {} removed, {} kept",
        target_root,
        report.removed.len(),
        report.kept.len()
    );
    Ok(report)
}

/// Every file under `<target_root>/<kind>`; empty when the directory is
/// missing
pub async fn installed_files(target_root: &Path, kind: ExtensionKind) -> Result<Vec<PathBuf>> {
    let dir = target_root.join(kind.dir_name());
    if !is_dir(&dir).await {
        return Ok(vec![]);
    }
    let mut files: Vec<PathBuf> = walk_files(&dir, &dir)
        .await?
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    files.sort();
    Ok(files)
}

/// Make `path` absolute against the current directory
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|source| InstallError::Read {
            path: path.to_path_buf(),
            source,
        })
}

async fn copy_tree(from: &Path, to: &Path, overwrite: bool, report: &mut InstallReport) -> Result<()> {
    for (source, destination) in walk_files(from, to).await? {
        let existed = fs::try_exists(&destination)
            .await
            .map_err(|source| InstallError::Read {
                path: destination.clone(),
                source,
            })?;

        if existed && !overwrite {
            report.skipped.push(destination);
            continue;
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| InstallError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        fs::copy(&source, &destination)
            .await
            .map_err(|source| InstallError::Write {
                path: destination.clone(),
                source,
            })?;

        if !existed {
            report.created.push(destination.clone());
        }
        report.copied.push(destination);
    }
    Ok(())
}

/// Pair every file under `from` with its mirror path under `to`
async fn walk_files(from: &Path, to: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut files = Vec::new();
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];

    while let Some((dir, mirror)) = pending.pop() {
        let read_err = |source| InstallError::Read {
            path: dir.clone(),
            source,
        };
        let mut entries = fs::read_dir(&dir).await.map_err(read_err)?;

        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            let path = entry.path();
            let target = mirror.join(entry.file_name());
            let metadata = fs::symlink_metadata(&path)
                .await
                .map_err(|source| InstallError::Read {
                    path: path.clone(),
                    source,
                })?;

            // Linked files are copied by content; linked directories are
            // never entered since they may loop back into the tree
            if metadata.is_symlink() {
                match fs::metadata(&path).await {
                    Ok(linked) if linked.is_file() => files.push((path, target)),
                    _ => debug!("Skipping linked directory or dangling link {:?}", path),
                }
                continue;
            }

            if metadata.is_dir() {
                pending.push((path, target));
            } else {
                files.push((path, target));
            }
        }
    }

    Ok(files)
}

async fn prune_empty_dirs(mut dirs: Vec<PathBuf>, stop_at: &Path) {
    // Deepest first so parents empty out before they are visited
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    dirs.dedup();

    for dir in dirs {
        let mut current = Some(dir.as_path());
        while let Some(path) = current {
            if path == stop_at || !path.starts_with(stop_at) {
                break;
            }
            // Fails on non-empty directories, which is the stop condition
            if fs::remove_dir(path).await.is_err() {
                break;
            }
            current = path.parent();
        }
    }
}

async fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).await.map_err(|source| InstallError::Read {
        path: path.to_path_buf(),
        source,
    })
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs as stdfs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        stdfs::create_dir_all(path.parent().unwrap()).unwrap();
        stdfs::write(path, content).unwrap();
    }

    fn package() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "agents/reviewer.md", "---\nmode: subagent\n---\nReview");
        write(dir.path(), "commands/bar.md", "Run bar");
        write(dir.path(), "plugins/notify.json", r#"{"exports": ["notify"]}"#);
        write(dir.path(), "skills/pdf/SKILL.md", "skill");
        write(dir.path(), "skills/pdf/scripts/extract.py", "print()");
        write(dir.path(), "README.md", "not an extension");
        dir
    }

    fn set(paths: &[PathBuf]) -> HashSet<PathBuf> {
        paths.iter().cloned().collect()
    }

    #[tokio::test]
    async fn test_fresh_install_creates_everything() {
        let source = package();
        let target = TempDir::new().unwrap();
        let root = target.path().join(".opencode");

        let report = install(source.path(), &root, &InstallOptions::default())
            .await
            .unwrap();

        assert_eq!(report.copied.len(), 5);
        assert_eq!(set(&report.created), set(&report.copied));
        assert!(report.skipped.is_empty());
        assert!(root.join("skills/pdf/scripts/extract.py").is_file());
        assert!(!root.join("README.md").exists());
        assert!(report.copied.iter().all(|p| p.is_absolute()));
    }

    #[tokio::test]
    async fn test_existing_file_is_skipped() {
        let source = package();
        let target = TempDir::new().unwrap();
        write(target.path(), "commands/bar.md", "local edit");

        let report = install(source.path(), target.path(), &InstallOptions::default())
            .await
            .unwrap();

        let bar = target.path().join("commands/bar.md");
        assert_eq!(report.skipped, vec![bar.clone()]);
        assert!(!report.copied.contains(&bar));
        assert!(!report.created.contains(&bar));
        assert_eq!(stdfs::read_to_string(&bar).unwrap(), "local edit");
    }

    #[tokio::test]
    async fn test_overwrite_copies_but_does_not_create() {
        let source = package();
        let target = TempDir::new().unwrap();
        write(target.path(), "commands/bar.md", "local edit");

        let options = InstallOptions {
            overwrite: true,
            ..InstallOptions::default()
        };
        let report = install(source.path(), target.path(), &options).await.unwrap();

        let bar = target.path().join("commands/bar.md");
        assert!(report.copied.contains(&bar));
        assert!(!report.created.contains(&bar));
        assert_eq!(report.overwritten().collect::<Vec<_>>(), vec![&bar]);
        assert_eq!(stdfs::read_to_string(&bar).unwrap(), "Run bar");
    }

    #[tokio::test]
    async fn test_second_install_skips_all() {
        let source = package();
        let target = TempDir::new().unwrap();
        let options = InstallOptions::default();

        install(source.path(), target.path(), &options).await.unwrap();
        let report = install(source.path(), target.path(), &options).await.unwrap();

        assert!(report.copied.is_empty());
        assert!(report.created.is_empty());
        assert_eq!(report.skipped.len(), 5);
    }

    #[tokio::test]
    async fn test_report_invariants_hold() {
        let source = package();
        let target = TempDir::new().unwrap();
        write(target.path(), "agents/reviewer.md", "mine");

        for overwrite in [false, true] {
            let options = InstallOptions {
                overwrite,
                ..InstallOptions::default()
            };
            let report = install(source.path(), target.path(), &options).await.unwrap();
            let copied = set(&report.copied);
            assert!(set(&report.created).is_subset(&copied));
            assert!(set(&report.skipped).is_disjoint(&copied));
        }
    }

    #[tokio::test]
    async fn test_kind_filter() {
        let source = package();
        let target = TempDir::new().unwrap();
        let options = InstallOptions {
            overwrite: false,
            kinds: vec![ExtensionKind::Commands],
        };

        let report = install(source.path(), target.path(), &options).await.unwrap();

        assert_eq!(report.copied, vec![target.path().join("commands/bar.md")]);
        assert!(!target.path().join("agents").exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_an_error() {
        let target = TempDir::new().unwrap();
        let err = install(
            &target.path().join("nope"),
            target.path(),
            &InstallOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InstallError::SourceMissing(_)));
    }

    #[tokio::test]
    async fn test_uninstall_keeps_modified_files() {
        let source = package();
        let target = TempDir::new().unwrap();
        let root = target.path().join(".opencode");
        install(source.path(), &root, &InstallOptions::default())
            .await
            .unwrap();
        write(&root, "agents/reviewer.md", "edited by user");
        write(&root, "commands/mine.md", "user command");

        let report = uninstall(source.path(), &root, &ExtensionKind::ALL)
            .await
            .unwrap();

        assert_eq!(report.removed.len(), 4);
        assert_eq!(report.kept, vec![root.join("agents/reviewer.md")]);
        assert!(root.join("agents/reviewer.md").exists());
        assert!(root.join("commands/mine.md").exists());
        assert!(!root.join("skills").exists());
        assert!(!root.join("plugins").exists());
        assert!(root.exists());
    }

    #[tokio::test]
    async fn test_installed_files_lists_nested_files() {
        let source = package();
        let target = TempDir::new().unwrap();
        install(source.path(), target.path(), &InstallOptions::default())
            .await
            .unwrap();

        let skills = installed_files(target.path(), ExtensionKind::Skills).await.unwrap();
        assert_eq!(
            skills,
            vec![
                target.path().join("skills/pdf/SKILL.md"),
                target.path().join("skills/pdf/scripts/extract.py"),
            ]
        );
        assert!(installed_files(target.path(), ExtensionKind::Themes)
            .await
            .unwrap()
            .is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_linked_directories_are_not_followed() {
        use std::os::unix::fs::symlink;

        let source = TempDir::new().unwrap();
        write(source.path(), "skills/a/SKILL.md", "skill a");
        symlink(source.path().join("skills"), source.path().join("skills/a/loop")).unwrap();
        symlink("SKILL.md", source.path().join("skills/a/alias.md")).unwrap();
        symlink("missing.md", source.path().join("skills/a/dangling.md")).unwrap();
        let target = TempDir::new().unwrap();

        let report = install(source.path(), target.path(), &InstallOptions::default())
            .await
            .unwrap();

        assert_eq!(
            set(&report.created),
            set(&[
                target.path().join("skills/a/SKILL.md"),
                target.path().join("skills/a/alias.md"),
            ])
        );
        assert!(!target.path().join("skills/a/loop").exists());
        assert!(!target.path().join("skills/a/dangling.md").exists());

        let alias = target.path().join("skills/a/alias.md");
        assert!(!stdfs::symlink_metadata(&alias).unwrap().is_symlink());
        assert_eq!(stdfs::read_to_string(alias).unwrap(), "skill a");

        let report = uninstall(source.path(), target.path(), &[ExtensionKind::Skills])
            .await
            .unwrap();
        assert_eq!(report.removed.len(), 2);
        assert!(!target.path().join("skills").exists());
    }
}
