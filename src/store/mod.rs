//! Persistent result store
//!
//! Durable (stage, input) → result mapping that survives process restarts.
//!
//! # Layout
//!
//! ```text
//! <root>/<stage-id>/<namespace>/<key>.json
//! ```
//!
//! Each file is one [`CacheEntry`]. Writes go to a temporary sibling and are
//! renamed into place, so a reader sees either the previous entry or the new
//! one, never a partial record. Entries are only written after a stage has
//! succeeded.
//!
//! # Failure model
//!
//! I/O and decode errors surface as [`GristError::StoreUnavailable`]; the
//! executor decides whether to degrade to a cache miss.

pub mod entry;
pub mod key;
pub mod locks;

pub use entry::CacheEntry;
pub use key::{short_hash, CacheKey};
pub use locks::KeyLocks;

use crate::error::{GristError, GristResult};
use crate::stage::StageKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// File-backed store of cache entries
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    /// Open a store rooted at `root` (created lazily on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the record for a key
    pub fn slot(&self, stage: StageKind, namespace: &str, key: &CacheKey) -> PathBuf {
        self.root
            .join(stage.id())
            .join(sanitize_component(namespace))
            .join(format!("{}.json", key))
    }

    /// Read the entry at a slot, `None` if nothing was recorded yet
    pub async fn get(&self, slot: &Path) -> GristResult<Option<CacheEntry>> {
        let content = match fs::read_to_string(slot).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(GristError::store(slot, e)),
        };

        let entry: CacheEntry =
            serde_json::from_str(&content).map_err(|e| GristError::store(slot, e))?;

        Ok(Some(entry))
    }

    /// Atomically replace the entry at a slot
    pub async fn put(&self, slot: &Path, entry: &CacheEntry) -> GristResult<()> {
        if let Some(parent) = slot.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| GristError::store(parent, e))?;
        }

        let content = serde_json::to_string_pretty(entry)?;
        let tmp = slot.with_extension(format!("json.tmp-{}", Uuid::new_v4().simple()));

        fs::write(&tmp, content)
            .await
            .map_err(|e| GristError::store(&tmp, e))?;

        if let Err(e) = fs::rename(&tmp, slot).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(GristError::store(slot, e));
        }

        debug!("Stored {} result {} in {}", entry.stage, entry.key.short(), slot.display());
        Ok(())
    }

    /// Remove the entry at a slot (no-op when absent)
    pub async fn delete(&self, slot: &Path) -> GristResult<()> {
        match fs::remove_file(slot).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GristError::store(slot, e)),
        }
    }

    /// All readable entries, with their slots
    ///
    /// Unreadable records are skipped; a missing root yields no entries.
    pub async fn entries(&self) -> GristResult<Vec<(PathBuf, CacheEntry)>> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(GristError::store(&dir, e)),
            };

            while let Some(item) = entries
                .next_entry()
                .await
                .map_err(|e| GristError::store(&dir, e))?
            {
                let path = item.path();
                let file_type = item
                    .file_type()
                    .await
                    .map_err(|e| GristError::store(&path, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == "json") {
                    if let Ok(Some(entry)) = self.get(&path).await {
                        found.push((path, entry));
                    }
                }
            }
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }
}

/// Make a namespace safe to use as a single path component
pub(crate) fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        trimmed => trimmed.to_string(),
    }
}
