//! LLM-assisted record filtering.
//!
//! The extractor over-collects: pronouns, teams, generic phrases. Each
//! bucket goes through a classifier that returns the subset of names that
//! are real companies (or, for directors, real people). Oversized buckets
//! are sharded before prompting.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

use crate::error::{LlmError, Result};
use crate::ingest::records::{CompetitorFacts, CustomerFacts, DirectorFacts, SupplierFacts};
use crate::llm::client::{transcript, ChatMessage};
use crate::llm::prompts::{self, CompanyBucket};
use crate::llm::{clean_json_string, text_within_tags, LlmGateway};
use crate::store::KvTable;

pub struct RecordFilter {
    gateway: std::sync::Arc<LlmGateway>,
    scratch: KvTable,
    scratch_ttl_secs: i64,
    shard_size: usize,
    retries: u32,
}

impl RecordFilter {
    pub fn new(
        gateway: std::sync::Arc<LlmGateway>,
        scratch: KvTable,
        scratch_ttl_secs: i64,
        config: &crate::config::PipelineConfig,
    ) -> Self {
        Self {
            gateway,
            scratch,
            scratch_ttl_secs,
            shard_size: config.filter_shard_size,
            retries: config.malformed_output_retries,
        }
    }

    pub async fn filter_customers(
        &self,
        raw_id: &str,
        main_entity_name: &str,
    ) -> Result<String> {
        let raw: BTreeMap<String, CustomerFacts> = self.load_raw(raw_id)?;
        let kept = self
            .classify(&raw, |shard| {
                prompts::filter_companies(CompanyBucket::Customers, shard, main_entity_name)
            }, CompanyBucket::Customers.tag(), &format!("{main_entity_name}->filter_customers"))
            .await?;
        self.persist("finalCustomers", rebuild(&raw, &kept))
    }

    pub async fn filter_suppliers(
        &self,
        raw_id: &str,
        main_entity_name: &str,
    ) -> Result<String> {
        let raw: BTreeMap<String, SupplierFacts> = self.load_raw(raw_id)?;
        let kept = self
            .classify(&raw, |shard| {
                prompts::filter_companies(CompanyBucket::SuppliersOrPartners, shard, main_entity_name)
            }, CompanyBucket::SuppliersOrPartners.tag(), &format!("{main_entity_name}->filter_suppliers"))
            .await?;
        self.persist("finalSuppliers", rebuild(&raw, &kept))
    }

    pub async fn filter_competitors(
        &self,
        raw_id: &str,
        main_entity_name: &str,
    ) -> Result<String> {
        let raw: BTreeMap<String, CompetitorFacts> = self.load_raw(raw_id)?;
        let kept = self
            .classify(&raw, |shard| {
                prompts::filter_companies(CompanyBucket::Competitors, shard, main_entity_name)
            }, CompanyBucket::Competitors.tag(), &format!("{main_entity_name}->filter_competitors"))
            .await?;
        self.persist("finalCompetitors", rebuild(&raw, &kept))
    }

    pub async fn filter_directors(
        &self,
        raw_id: &str,
        main_entity_name: &str,
    ) -> Result<String> {
        let raw: BTreeMap<String, DirectorFacts> = self.load_raw(raw_id)?;
        let kept = self
            .classify(&raw, |shard| {
                prompts::filter_directors(shard, main_entity_name)
            }, "people", &format!("{main_entity_name}->filter_directors"))
            .await?;
        self.persist("finalDirectors", rebuild(&raw, &kept))
    }

    fn load_raw<T: DeserializeOwned + Default>(
        &self,
        raw_id: &str,
    ) -> Result<BTreeMap<String, T>> {
        let item = self.scratch.get_typed::<serde_json::Value>(raw_id)?;
        let data = item.get("data").cloned().unwrap_or_else(|| json!({}));
        Ok(serde_json::from_value(data)?)
    }

    /// Run the classifier over 100-key shards and union the kept names.
    async fn classify<T: Serialize>(
        &self,
        raw: &BTreeMap<String, T>,
        build_prompt: impl Fn(&str) -> Vec<ChatMessage>,
        answer_tag: &str,
        audit_id: &str,
    ) -> Result<Vec<String>> {
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<&String> = raw.keys().collect();
        let mut kept = Vec::new();
        for shard_keys in keys.chunks(self.shard_size) {
            let shard: BTreeMap<&String, &T> =
                shard_keys.iter().map(|k| (*k, &raw[*k])).collect();
            let shard_json = serde_json::to_string(&shard)?;
            kept.extend(
                self.classify_shard(&build_prompt(&shard_json), answer_tag, audit_id)
                    .await?,
            );
        }
        Ok(kept)
    }

    async fn classify_shard(
        &self,
        messages: &[ChatMessage],
        answer_tag: &str,
        audit_id: &str,
    ) -> Result<Vec<String>> {
        let mut attempts_left = self.retries;
        loop {
            let completion = self.gateway.query(messages.to_vec()).await?;
            let history = format!("{}\n\n{completion}\n", transcript(messages));
            self.gateway.audit().save(audit_id, &history);

            let answer = clean_json_string(&text_within_tags(&completion, answer_tag));
            match serde_json::from_str::<Vec<String>>(&answer) {
                Ok(names) => return Ok(names),
                Err(e) => {
                    if attempts_left == 0 {
                        return Err(LlmError::MalformedOutput(format!(
                            "filter {answer_tag}: {e}"
                        ))
                        .into());
                    }
                    attempts_left -= 1;
                    warn!(answer_tag, "filter output unusable ({e}), retrying");
                }
            }
        }
    }

    fn persist<T: Serialize>(&self, bucket_type: &str, data: T) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let item = json!({ "type": bucket_type, "data": data });
        self.scratch.put(&id, &item, Some(self.scratch_ttl_secs))?;
        Ok(id)
    }
}

/// Rebuild the final bucket from the kept names. Names the classifier
/// invented are dropped with a log line.
fn rebuild<T: Clone>(raw: &BTreeMap<String, T>, kept: &[String]) -> BTreeMap<String, T> {
    let mut rebuilt = BTreeMap::new();
    for name in kept {
        match raw.get(name) {
            Some(facts) => {
                rebuilt.insert(name.clone(), facts.clone());
            }
            None => warn!(name = %name, "classifier returned a name outside its input, dropping"),
        }
    }
    rebuilt
}
