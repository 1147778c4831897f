//! In-process key-value tables with expiry-on-read semantics.
//!
//! Scratch state written by one pipeline execution is keyed by fresh uuids
//! and carries a TTL so abandoned executions age out on their own. Tables
//! can optionally snapshot to JSON files under the configured data dir.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::error::StoreError;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct TableData {
    items: HashMap<String, Entry>,
}

/// Shared store holding all named tables.
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<Mutex<HashMap<String, TableData>>>,
    data_dir: Option<PathBuf>,
}

impl KvStore {
    /// Create an ephemeral in-memory store.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            data_dir: None,
        }
    }

    /// Create a store that snapshots each table as JSON under `data_dir`,
    /// loading any existing snapshots.
    pub fn persistent(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        let mut tables = HashMap::new();
        let entries = std::fs::read_dir(&data_dir)
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<TableData>(&raw) {
                    Ok(data) => {
                        tables.insert(name.to_string(), data);
                    }
                    Err(e) => warn!(table = name, "skipping unreadable snapshot: {e}"),
                },
                Err(e) => warn!(table = name, "skipping unreadable snapshot: {e}"),
            }
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(tables)),
            data_dir: Some(data_dir),
        })
    }

    /// Handle for one named table.
    pub fn table(&self, name: &str) -> KvTable {
        KvTable {
            store: self.clone(),
            name: name.to_string(),
        }
    }

    fn flush(&self, name: &str, data: &TableData) {
        let Some(dir) = &self.data_dir else { return };
        let path = dir.join(format!("{name}.json"));
        match serde_json::to_vec(data) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&path, bytes) {
                    warn!(table = name, "failed to snapshot table: {e}");
                }
            }
            Err(e) => warn!(table = name, "failed to serialize table: {e}"),
        }
    }
}

/// Handle for one named table of the shared store.
#[derive(Clone)]
pub struct KvTable {
    store: KvStore,
    name: String,
}

impl KvTable {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert or replace an item. `ttl_secs` of `None` means no expiry.
    pub fn put<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: Option<i64>,
    ) -> Result<(), StoreError> {
        let value =
            serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let expires_at = ttl_secs.map(|secs| Utc::now() + Duration::seconds(secs));
        let mut tables = self.store.inner.lock().expect("kv store poisoned");
        let table = tables.entry(self.name.clone()).or_default();
        table.items.insert(key.to_string(), Entry { value, expires_at });
        let snapshot_owner = tables.get(&self.name).expect("just inserted");
        self.store.flush(&self.name, snapshot_owner);
        Ok(())
    }

    /// Fetch an item, dropping it if its TTL has passed.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut tables = self.store.inner.lock().expect("kv store poisoned");
        let table = tables.get_mut(&self.name)?;
        let expired = table
            .items
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|t| t <= Utc::now())
            .unwrap_or(false);
        if expired {
            table.items.remove(key);
            return None;
        }
        table.items.get(key).map(|e| e.value.clone())
    }

    /// Typed fetch; `NotFound` when the key is absent or expired.
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<T, StoreError> {
        let value = self.get(key).ok_or_else(|| StoreError::NotFound {
            table: self.name.clone(),
            key: key.to_string(),
        })?;
        serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn delete(&self, key: &str) {
        let mut tables = self.store.inner.lock().expect("kv store poisoned");
        if let Some(table) = tables.get_mut(&self.name) {
            table.items.remove(key);
            let snapshot = tables.get(&self.name).expect("present");
            self.store.flush(&self.name, snapshot);
        }
    }

    /// All live items, skipping expired ones.
    pub fn scan(&self) -> Vec<(String, Value)> {
        let now = Utc::now();
        let mut tables = self.store.inner.lock().expect("kv store poisoned");
        let Some(table) = tables.get_mut(&self.name) else {
            return Vec::new();
        };
        table
            .items
            .retain(|_, e| e.expires_at.map(|t| t > now).unwrap_or(true));
        table
            .items
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Remove every item; returns how many were deleted.
    pub fn clear(&self) -> usize {
        let mut tables = self.store.inner.lock().expect("kv store poisoned");
        let Some(table) = tables.get_mut(&self.name) else {
            return 0;
        };
        let count = table.items.len();
        table.items.clear();
        let snapshot = tables.get(&self.name).expect("present");
        self.store.flush(&self.name, snapshot);
        count
    }
}
