//! Item source backed by a directory of crash files

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use crashrank_core::{Item, ItemId, ItemSource, SourceError};
use globset::{Glob, GlobMatcher};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Default file name pattern
pub const DEFAULT_PATTERN: &str = "*.json";

#[derive(Debug, Clone)]
struct Entry {
    path: PathBuf,
    modified: DateTime<Utc>,
}

/// Crash files found recursively under a root directory.
///
/// Ids are `<parent-dir>_<file-stem>` so equally named files in different
/// directories stay distinct. Payloads are canonical file paths; file
/// contents are never read.
#[derive(Debug)]
pub struct DirectoryItemSource {
    root: PathBuf,
    entries: BTreeMap<ItemId, Entry>,
}

impl DirectoryItemSource {
    /// Scan `root` for files whose name matches `pattern`
    pub fn new(root: impl AsRef<Path>, pattern: &str) -> Result<Self> {
        let root = root.as_ref();
        if !root.exists() {
            bail!("crashes directory does not exist: {}", root.display());
        }
        if !root.is_dir() {
            bail!("not a directory: {}", root.display());
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to resolve {}", root.display()))?;
        let matcher = Glob::new(pattern)
            .with_context(|| format!("invalid file pattern '{}'", pattern))?
            .compile_matcher();

        let entries = scan(&root, &matcher);
        if entries.is_empty() {
            warn!("No files matching '{}' found in {}", pattern, root.display());
        } else {
            info!("Found {} crash files in {}", entries.len(), root.display());
        }

        Ok(Self { root, entries })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn scan(root: &Path, matcher: &GlobMatcher) -> BTreeMap<ItemId, Entry> {
    let mut entries = BTreeMap::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() || !matcher.is_match(entry.file_name()) {
            continue;
        }

        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        if !canonical.starts_with(root) {
            warn!("Skipping file outside crashes directory: {}", path.display());
            continue;
        }

        let id = match item_id(path) {
            Some(id) => id,
            None => continue,
        };
        if entries.contains_key(&id) {
            warn!("Duplicate crash id {} for {}, keeping the first", id, path.display());
            continue;
        }

        let modified = std::fs::metadata(&canonical)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        entries.insert(id, Entry { path: canonical, modified });
    }

    entries
}

/// `<parent-dir>_<file-stem>`
fn item_id(path: &Path) -> Option<ItemId> {
    let parent = path.parent()?.file_name()?.to_string_lossy();
    let stem = path.file_stem()?.to_string_lossy();
    Some(format!("{}_{}", parent, stem))
}

impl ItemSource for DirectoryItemSource {
    fn list_ids(&self) -> Result<std::collections::BTreeSet<ItemId>, SourceError> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn resolve(&self, id: &str) -> Result<Item, SourceError> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| SourceError::UnknownItem(id.to_string()))?;
        Ok(Item {
            id: id.to_string(),
            payload: entry.path.to_string_lossy().into_owned(),
            discovered_at: entry.modified,
        })
    }
}
