//! Per-chunk structured extraction.

use tracing::warn;
use uuid::Uuid;

use crate::error::{LlmError, Result};
use crate::ingest::chunker::StoredChunk;
use crate::ingest::records::RawRecordSet;
use crate::llm::{clean_json_string, prompts, text_within_tags, LlmGateway};
use crate::store::KvTable;

pub struct ChunkExtractor {
    gateway: std::sync::Arc<LlmGateway>,
    scratch: KvTable,
    scratch_ttl_secs: i64,
    retries: u32,
}

impl ChunkExtractor {
    pub fn new(
        gateway: std::sync::Arc<LlmGateway>,
        scratch: KvTable,
        scratch_ttl_secs: i64,
        retries: u32,
    ) -> Self {
        Self {
            gateway,
            scratch,
            scratch_ttl_secs,
            retries,
        }
    }

    /// Extract the five record classes from one stored chunk. The parsed
    /// set is persisted under a fresh id, which is returned. The prompt is
    /// retried verbatim on malformed output, up to the configured bound.
    pub async fn extract(&self, chunk_id: &str) -> Result<String> {
        let chunk: StoredChunk = self.scratch.get_typed(chunk_id)?;
        let summary_json = serde_json::to_string(&chunk.summary)?;
        let main_entity_name = chunk.summary.main_entity.name.clone();
        let messages = prompts::chunk_extraction(&summary_json, &main_entity_name, &chunk.text);
        let audit_id = format!(
            "{main_entity_name}->extract->(pg{}-{})->",
            chunk.start_page, chunk.end_page
        );

        let mut attempts_left = self.retries;
        let mut record_set = loop {
            let completion = self.gateway.query(messages.clone()).await?;
            let history = format!(
                "{}\n\n{completion}\n",
                crate::llm::client::transcript(&messages)
            );
            self.gateway.audit().save(&audit_id, &history);

            let results = clean_json_string(&text_within_tags(&completion, "results"));
            match serde_json::from_str::<RawRecordSet>(&results) {
                Ok(set) => break set,
                Err(e) => {
                    if attempts_left == 0 {
                        return Err(LlmError::MalformedOutput(format!(
                            "chunk {chunk_id} extraction: {e}"
                        ))
                        .into());
                    }
                    attempts_left -= 1;
                    warn!(chunk_id, "extraction output unusable ({e}), retrying");
                }
            }
        };

        record_set.stamp_source(&chunk.source);
        let record_id = Uuid::new_v4().to_string();
        self.scratch
            .put(&record_id, &record_set, Some(self.scratch_ttl_secs))?;
        Ok(record_id)
    }
}
