//! Tag / id-token cache (spec.md §4.A): a process-wide singleton holding,
//! per file path, the loaded tags and distribution indexes. File changes
//! are detected by polling mtime rather than an OS-level watch API, since
//! the polling approach needs no platform-specific notification backend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum IdTagDistribution {
    #[serde(rename = "RANDOM")]
    Random,
    #[serde(rename = "ROUND_ROBIN")]
    RoundRobin,
    #[serde(rename = "CONNECTOR_AFFINITY")]
    ConnectorAffinity,
}

struct FileEntry {
    tags: Vec<String>,
    last_modified: Option<SystemTime>,
    round_robin_index: HashMap<String, usize>,
}

impl FileEntry {
    fn empty() -> Self {
        Self {
            tags: Vec::new(),
            last_modified: None,
            round_robin_index: HashMap::new(),
        }
    }
}

/// Process-wide id-tag cache, one entry per authorization-file path
/// (spec.md §4.A, §5 "process-wide singletons").
pub struct TagCache {
    files: Mutex<HashMap<String, FileEntry>>,
}

impl TagCache {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Loads (or reloads, if the file's mtime advanced) the tag list for
    /// `path`. Parse failures are logged and treated as an empty list
    /// (spec.md §4.A).
    pub fn ensure_loaded(&self, path: &str) {
        let metadata = std::fs::metadata(path).ok();
        let mtime = metadata.and_then(|m| m.modified().ok());

        let mut files = self.files.lock().expect("tag cache mutex poisoned");
        let needs_load = match files.get(path) {
            Some(entry) => entry.last_modified != mtime,
            None => true,
        };
        if !needs_load {
            return;
        }

        let tags = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Vec<String>>(&text) {
                Ok(tags) => tags,
                Err(err) => {
                    error!(path, error = %err, "failed to parse id tags file, treating as empty");
                    Vec::new()
                }
            },
            Err(err) => {
                warn!(path, error = %err, "failed to read id tags file, treating as empty");
                Vec::new()
            }
        };

        // Duplicate entries are accepted as-is; they bias distribution
        // probabilities rather than being silently deduped (spec.md §9).
        files.insert(
            path.to_string(),
            FileEntry {
                tags,
                last_modified: mtime,
                round_robin_index: HashMap::new(),
            },
        );
    }

    /// Polls `path`'s mtime and invalidates the cached entry on change,
    /// the polling equivalent of the file-watcher callback in spec.md
    /// §4.A ("fires on content change -> invalidate cached tags+indexes").
    pub fn poll_for_changes(&self, path: &str) {
        self.ensure_loaded(path);
    }

    /// `getIdTag(distribution, station, connectorId)` (spec.md §4.A).
    /// Returns `None` for an empty tag list (spec.md §8 boundary
    /// behavior).
    pub fn get_id_tag(
        &self,
        path: &str,
        distribution: IdTagDistribution,
        station_hash_id: &str,
        station_index: u32,
        connector_id: u32,
    ) -> Option<String> {
        self.ensure_loaded(path);
        let mut files = self.files.lock().expect("tag cache mutex poisoned");
        let entry = files.entry(path.to_string()).or_insert_with(FileEntry::empty);
        if entry.tags.is_empty() {
            return None;
        }

        let index = match distribution {
            IdTagDistribution::Random => rand::thread_rng().gen_range(0..entry.tags.len()),
            IdTagDistribution::RoundRobin => {
                let key = station_hash_id.to_string();
                let next = entry.round_robin_index.get(&key).map(|i| i + 1).unwrap_or(0) % entry.tags.len();
                entry.round_robin_index.insert(key, next);
                next
            }
            IdTagDistribution::ConnectorAffinity => {
                let base = station_index.saturating_sub(1) as usize + connector_id.saturating_sub(1) as usize;
                base % entry.tags.len()
            }
        };

        entry.tags.get(index).cloned()
    }

    /// Membership check against the loaded list for `path`, used by the
    /// LocalList authorization strategy (spec.md §4.G).
    pub fn contains(&self, path: &str, identifier: &str) -> bool {
        self.ensure_loaded(path);
        let files = self.files.lock().expect("tag cache mutex poisoned");
        files
            .get(path)
            .map(|entry| entry.tags.iter().any(|t| t == identifier))
            .unwrap_or(false)
    }

    /// Closes out in-memory state. Useful for tests that want an
    /// explicit teardown (spec.md §9 "process-wide singletons ... should
    /// provide an explicit teardown").
    pub fn clear(&self) {
        self.files.lock().expect("tag cache mutex poisoned").clear();
    }
}

impl Default for TagCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tags(tags: &[&str]) -> tempfile_path::TempJsonFile {
        tempfile_path::TempJsonFile::new(tags)
    }

    mod tempfile_path {
        use std::io::Write;

        pub struct TempJsonFile {
            pub path: std::path::PathBuf,
        }

        impl TempJsonFile {
            pub fn new(tags: &[&str]) -> Self {
                let path = std::env::temp_dir().join(format!("ocpp-tags-{}.json", uuid::Uuid::new_v4()));
                let mut file = std::fs::File::create(&path).unwrap();
                write!(file, "{}", serde_json::to_string(tags).unwrap()).unwrap();
                Self { path }
            }
        }

        impl Drop for TempJsonFile {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn round_robin_cycles_through_indexes() {
        let file = write_tags(&["A", "B", "C"]);
        let cache = TagCache::new();
        let path = file.path.to_str().unwrap();
        let seq: Vec<String> = (0..5)
            .map(|_| cache.get_id_tag(path, IdTagDistribution::RoundRobin, "hash1", 0, 0).unwrap())
            .collect();
        assert_eq!(seq, vec!["A", "B", "C", "A", "B"]);
    }

    #[test]
    fn empty_list_returns_none() {
        let file = write_tags(&[]);
        let cache = TagCache::new();
        let path = file.path.to_str().unwrap();
        assert!(cache.get_id_tag(path, IdTagDistribution::Random, "hash1", 0, 0).is_none());
    }

    #[test]
    fn connector_affinity_is_deterministic() {
        let file = write_tags(&["A", "B", "C", "D"]);
        let cache = TagCache::new();
        let path = file.path.to_str().unwrap();
        let a = cache.get_id_tag(path, IdTagDistribution::ConnectorAffinity, "h", 1, 1).unwrap();
        let b = cache.get_id_tag(path, IdTagDistribution::ConnectorAffinity, "h", 1, 1).unwrap();
        assert_eq!(a, b);
    }
}
