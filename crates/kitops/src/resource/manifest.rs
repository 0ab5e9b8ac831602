//! Manifest tree traversal.
//!
//! Both the apply pass and the desired-state load walk the same tree with
//! the same rules: `*.yaml` files only, hidden entries never visited,
//! symlinks followed, sibling entries in file-name order.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use glob::Pattern;
use walkdir::{DirEntry, WalkDir};

/// File-name pattern a manifest file must match.
pub const MANIFEST_GLOB: &str = "*.yaml";

static MANIFEST_PATTERN: LazyLock<Pattern> =
    LazyLock::new(|| Pattern::new(MANIFEST_GLOB).expect("manifest glob is a valid pattern"));

/// Returns true if `path` names a manifest file.
pub fn is_manifest_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| MANIFEST_PATTERN.matches(n))
            .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && is_hidden_name(entry.file_name())
}

fn is_hidden_name(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

fn visible_entries(root: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable manifest tree entry: {}", e);
                None
            }
        })
}

/// Every manifest file below `root`, in walk order.
pub fn manifest_files(root: &Path) -> Vec<PathBuf> {
    visible_entries(root)
        .map(DirEntry::into_path)
        .filter(|path| is_manifest_file(path))
        .collect()
}

/// Every directory below `root` (inclusive) that directly contains at least
/// one manifest file. Parents come before their children.
pub fn manifest_dirs(root: &Path) -> Vec<PathBuf> {
    visible_entries(root)
        .map(DirEntry::into_path)
        .filter(|path| path.is_dir() && contains_manifest(path))
        .collect()
}

fn contains_manifest(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .any(|entry| !is_hidden_name(&entry.file_name()) && is_manifest_file(&entry.path())),
        Err(e) => {
            log::warn!("Failed to read manifest directory {}: {}", dir.display(), e);
            false
        }
    }
}
