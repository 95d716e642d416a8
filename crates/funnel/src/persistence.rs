//! Resume checkpoint for the funnel.
//!
//! The snapshot is a camelCase JSON blob under a fixed key with a 24-hour
//! lifetime. Losing it is harmless, so every storage or parse failure is
//! logged and treated as "no saved session".

use anyhow::Context;
use chrono::Duration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::offer::OfferTier;
use crate::sequencer::Step;

/// Key/value storage port (the browser's local storage in the web build).
pub trait FunnelStorage: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Answers collected by the quiz and carried into the funnel copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libido: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub morning_energy: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<u8>,
}

/// Persisted funnel progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelSnapshot {
    pub current_step: Step,
    pub progress: f64,
    pub current_offer_tier: Option<OfferTier>,
    pub user_choice: Option<u8>,
    #[serde(default)]
    pub user_data: UserData,
    /// Capture time, epoch milliseconds.
    pub timestamp: i64,
    /// When the visit was first mounted; scarcity stock counts from here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    /// Seeds the recent-buyer ticker across reloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scarcity_seed: Option<String>,
}

/// Saves, restores and clears the snapshot through a [`FunnelStorage`].
#[derive(Clone)]
pub struct PersistenceAdapter {
    storage: Arc<dyn FunnelStorage>,
    key: String,
    ttl: Duration,
}

impl PersistenceAdapter {
    pub fn new(storage: Arc<dyn FunnelStorage>, key: impl Into<String>, ttl_hours: i64) -> Self {
        Self {
            storage,
            key: key.into(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn save(&self, snapshot: &FunnelSnapshot) {
        let json = match serde_json::to_string(snapshot) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize funnel snapshot");
                return;
            }
        };
        if let Err(e) = self.storage.set(&self.key, &json) {
            warn!(error = %e, key = %self.key, "Failed to save funnel progress");
        } else {
            debug!(step = %snapshot.current_step, progress = snapshot.progress, "Funnel progress saved");
        }
    }

    /// Returns the saved snapshot if it is younger than the TTL. Stale
    /// entries are deleted.
    pub fn load(&self, now_ms: i64) -> Option<FunnelSnapshot> {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, key = %self.key, "Failed to read funnel progress");
                return None;
            }
        };

        let snapshot: FunnelSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, key = %self.key, "Discarding unreadable funnel progress");
                return None;
            }
        };

        let age_ms = now_ms.saturating_sub(snapshot.timestamp);
        if age_ms > self.ttl.num_milliseconds() {
            debug!(age_ms, "Discarding expired funnel progress");
            self.clear();
            return None;
        }
        Some(snapshot)
    }

    pub fn clear(&self) {
        if let Err(e) = self.storage.remove(&self.key) {
            warn!(error = %e, key = %self.key, "Failed to clear funnel progress");
        }
    }
}

/// In-process storage for tests and the simulator.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl FunnelStorage for MemoryStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl FunnelStorage for FileStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path_for(key);
        std::fs::write(&path, value).with_context(|| format!("writing {}", path.display()))
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}
