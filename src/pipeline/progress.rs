//! Ingestion/news progress records.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::store::{KvStore, KvTable, TABLE_PROCESSING_STATUS};

/// Error messages are truncated to this length before storage.
const ERROR_MESSAGE_LIMIT: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: String,
    pub file_name: String,
    pub file_type: String,
    pub completed_step_count: u32,
    pub total_step_count: u32,
    pub datetime_started: String,
    pub datetime_ended: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A record enriched with the derived fields the status API serves.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    #[serde(flatten)]
    pub record: ProgressRecord,
    pub progress_percentage: u32,
    pub status: &'static str,
}

#[derive(Clone)]
pub struct ProgressTracker {
    table: KvTable,
}

impl ProgressTracker {
    pub fn new(store: &KvStore) -> Self {
        Self {
            table: store.table(TABLE_PROCESSING_STATUS),
        }
    }

    pub fn create(&self, file_name: &str, file_type: &str, total_steps: u32) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let record = ProgressRecord {
            id: id.clone(),
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            completed_step_count: 0,
            total_step_count: total_steps,
            datetime_started: now_iso(),
            datetime_ended: String::new(),
            error_message: None,
        };
        self.table.put(&id, &record, None)?;
        Ok(id)
    }

    /// Bump the completed-step counter; the final step also stamps the end
    /// time (exactly once).
    pub fn increment(&self, id: &str, is_final_step: bool) {
        let Ok(mut record) = self.table.get_typed::<ProgressRecord>(id) else {
            warn!(id, "progress record missing on increment");
            return;
        };
        record.completed_step_count += 1;
        if is_final_step && record.datetime_ended.is_empty() {
            record.datetime_ended = now_iso();
        }
        if let Err(e) = self.table.put(id, &record, None) {
            warn!(id, "progress update failed: {e}");
        }
    }

    /// Record a failure with a truncated error message. The end time is
    /// only stamped if it was not already set.
    pub fn mark_failed(&self, id: &str, error: &str) {
        let Ok(mut record) = self.table.get_typed::<ProgressRecord>(id) else {
            warn!(id, "progress record missing on failure");
            return;
        };
        if record.datetime_ended.is_empty() {
            record.datetime_ended = now_iso();
        }
        record.error_message = Some(truncate(error, ERROR_MESSAGE_LIMIT));
        if let Err(e) = self.table.put(id, &record, None) {
            warn!(id, "progress update failed: {e}");
        }
    }

    /// All records, most recently started first, with derived progress.
    pub fn list(&self) -> Vec<ProgressView> {
        let mut records: Vec<ProgressRecord> = self
            .table
            .scan()
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_value(value).ok())
            .collect();
        records.sort_by(|a, b| b.datetime_started.cmp(&a.datetime_started));
        records
            .into_iter()
            .map(|record| {
                let percentage = if record.total_step_count > 0 {
                    ((record.completed_step_count as f64 / record.total_step_count as f64) * 100.0)
                        .round() as u32
                } else {
                    0
                };
                let status = if percentage >= 100 {
                    "completed"
                } else if percentage > 0 {
                    "processing"
                } else {
                    "pending"
                };
                ProgressView {
                    record,
                    progress_percentage: percentage,
                    status,
                }
            })
            .collect()
    }

    pub fn clear(&self) -> usize {
        self.table.clear()
    }

    pub fn get(&self, id: &str) -> Option<ProgressRecord> {
        self.table.get_typed(id).ok()
    }
}

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
