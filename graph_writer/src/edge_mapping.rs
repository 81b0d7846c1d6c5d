//! Free-text relationship canonicalisation (§4.6), grounded on the original
//! `edge_mapping.py`: a YAML file mapping lowercase relationship text to an
//! `EdgeType` variant name, hot-reloaded by polling the file's mtime.

use pipeline_core::types::EdgeType;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{info, warn};

struct Cached {
    mapping: HashMap<String, String>,
    mtime: Option<SystemTime>,
}

/// Loads and caches the edge-canonicalisation map, reloading it whenever the
/// backing file's mtime advances.
pub struct EdgeMapper {
    path: PathBuf,
    cache: RwLock<Cached>,
}

impl EdgeMapper {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cache: RwLock::new(Cached { mapping: HashMap::new(), mtime: None }) }
    }

    async fn current_mtime(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.path).await.ok()?.modified().ok()
    }

    async fn ensure_loaded(&self) {
        let disk_mtime = self.current_mtime().await;
        {
            let cached = self.cache.read().await;
            if cached.mtime.is_some() && cached.mtime == disk_mtime {
                return;
            }
        }

        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "edge mapping file unreadable, using empty map");
                let mut cached = self.cache.write().await;
                cached.mapping = HashMap::new();
                cached.mtime = disk_mtime;
                return;
            }
        };

        let parsed: HashMap<String, String> = match serde_yaml::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "edge mapping file failed to parse, keeping previous map");
                return;
            }
        };

        let normalised: HashMap<String, String> =
            parsed.into_iter().map(|(k, v)| (k.to_lowercase().trim().to_string(), v)).collect();

        info!(count = normalised.len(), path = %self.path.display(), "loaded edge mapping");
        let mut cached = self.cache.write().await;
        cached.mapping = normalised;
        cached.mtime = disk_mtime;
    }

    /// Lowercases and trims `text`, looks it up in the map, and returns the
    /// matching `EdgeType`. Unmatched text returns `None`.
    pub async fn canonical_edge(&self, text: &str) -> Option<EdgeType> {
        if text.is_empty() {
            return None;
        }
        self.ensure_loaded().await;
        let key = text.to_lowercase();
        let key = key.trim();
        let cached = self.cache.read().await;
        let enum_name = cached.mapping.get(key)?;
        edge_type_from_name(enum_name)
    }
}

fn edge_type_from_name(name: &str) -> Option<EdgeType> {
    serde_json::from_value(serde_json::Value::String(name.to_lowercase())).ok()
}
