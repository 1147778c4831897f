//! Document pipeline state machine.
//!
//! One queue message drives chunk -> extract (fan-out) -> consolidate ->
//! filter (fan-out) -> write-graph (completion token) -> cleanup. Every step
//! retries with backoff; exhausting a step routes to the terminal failure
//! branch, which returns the message to the queue and marks the progress
//! record failed. Reruns are safe because graph writes MERGE and the LLM
//! runs at temperature 0.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::graph::GraphAccess;
use crate::ingest::chunker::{ChunkOutput, Chunker};
use crate::ingest::consolidate::Consolidator;
use crate::ingest::extractor::ChunkExtractor;
use crate::ingest::filter::RecordFilter;
use crate::ingest::writer::{FinalBucketIds, GraphWriter, WriteReport};
use crate::llm::LlmGateway;
use crate::pipeline::progress::ProgressTracker;
use crate::pipeline::queue::{QueueMessage, WorkQueue};
use crate::store::blob::decode_key;
use crate::store::{BlobStore, KvStore, TABLE_INGESTION};

/// Steps counted by the document progress record.
const TOTAL_DOCUMENT_STEPS: u32 = 4;

/// Ingestion queue message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMessage {
    #[serde(rename = "S3_BUCKET")]
    pub bucket: String,
    #[serde(rename = "S3_KEY")]
    pub key: String,
}

/// Everything the orchestrator needs, injected for testability.
pub struct PipelineDeps {
    pub store: KvStore,
    pub blob: Arc<dyn BlobStore>,
    pub queue: Arc<WorkQueue>,
    pub gateway: Arc<LlmGateway>,
    pub access: Arc<GraphAccess>,
    pub config: Config,
}

pub struct Orchestrator {
    blob: Arc<dyn BlobStore>,
    queue: Arc<WorkQueue>,
    progress: ProgressTracker,
    chunker: Chunker,
    extractor: Arc<ChunkExtractor>,
    consolidator: Consolidator,
    filter: Arc<RecordFilter>,
    writer: Arc<GraphWriter>,
    retry_attempts: u32,
    retry_interval: Duration,
    retry_backoff: f64,
    writer_timeout: Duration,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(deps: PipelineDeps) -> Self {
        let scratch = deps.store.table(TABLE_INGESTION);
        let ttl = deps.config.storage.scratch_ttl_secs;
        let pipeline = &deps.config.pipeline;
        Self {
            blob: deps.blob,
            queue: deps.queue,
            progress: ProgressTracker::new(&deps.store),
            chunker: Chunker::new(deps.gateway.clone(), scratch.clone(), ttl, pipeline),
            extractor: Arc::new(ChunkExtractor::new(
                deps.gateway.clone(),
                scratch.clone(),
                ttl,
                pipeline.malformed_output_retries,
            )),
            consolidator: Consolidator::new(scratch.clone(), ttl),
            filter: Arc::new(RecordFilter::new(
                deps.gateway.clone(),
                scratch.clone(),
                ttl,
                pipeline,
            )),
            writer: Arc::new(GraphWriter::new(deps.access, scratch)),
            retry_attempts: pipeline.step_retry_attempts,
            retry_interval: Duration::from_secs(pipeline.step_retry_interval_secs),
            retry_backoff: pipeline.step_retry_backoff,
            writer_timeout: Duration::from_secs(pipeline.writer_timeout_secs),
            poll_interval: Duration::from_millis(deps.config.queue.poll_interval_ms),
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Block-poll the document queue forever.
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.poll_once().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    error!("document worker iteration failed: {e}");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Claim and process at most one message. Returns whether one was
    /// claimed.
    pub async fn poll_once(&self) -> Result<bool> {
        let Some(message) = self.queue.receive() else {
            return Ok(false);
        };
        self.run_execution(message).await?;
        Ok(true)
    }

    /// Drive one claimed message through the state machine. Step exhaustion
    /// lands in the terminal failure branch; the error is logged, not
    /// propagated, so the worker keeps polling.
    pub async fn run_execution(&self, message: QueueMessage) -> Result<()> {
        let Ok(document) = serde_json::from_str::<DocumentMessage>(&message.body) else {
            warn!("unrecognized queue message, acking silently");
            self.queue.delete(&message.receipt)?;
            return Ok(());
        };
        let decoded_key = decode_key(document.key.trim());
        let file_name = decoded_key
            .rsplit('/')
            .next()
            .unwrap_or(&decoded_key)
            .to_string();
        let execution = execution_name(&decoded_key);
        info!(execution = %execution, file = %file_name, "starting document execution");

        let progress_id = self
            .progress
            .create(&file_name, "financial_document", TOTAL_DOCUMENT_STEPS)?;

        match self.drive(&document, &progress_id, &message).await {
            Ok(report) => {
                info!(
                    execution = %execution,
                    customers = report.customer_keys.len(),
                    suppliers = report.supplier_keys.len(),
                    competitors = report.competitor_keys.len(),
                    directors = report.director_keys.len(),
                    "document execution completed"
                );
                Ok(())
            }
            Err(e) => {
                error!(execution = %execution, "document execution failed: {e}");
                if let Err(ret) = self.queue.change_visibility(&message.receipt, Duration::ZERO) {
                    warn!("failed to return message to queue: {ret}");
                }
                self.progress.mark_failed(&progress_id, &e.to_string());
                Ok(())
            }
        }
    }

    async fn drive(
        &self,
        document: &DocumentMessage,
        progress_id: &str,
        message: &QueueMessage,
    ) -> Result<WriteReport> {
        // chunk
        let output: ChunkOutput = self
            .run_step("chunk", || async {
                let bytes = self.blob.get(&document.bucket, &document.key).await?;
                let pages = pages_from_blob(&bytes);
                self.chunker.chunk_document(&pages, &decode_key(&document.key)).await
            })
            .await?;
        self.progress.increment(progress_id, false);

        // extract (fan-out, chunk failures skipped)
        let extractions = futures_util::future::join_all(
            output
                .chunk_ids
                .iter()
                .map(|chunk_id| self.extractor.extract(chunk_id)),
        )
        .await;
        let mut record_ids = Vec::new();
        for (chunk_id, result) in output.chunk_ids.iter().zip(extractions) {
            match result {
                Ok(record_id) => record_ids.push(record_id),
                Err(e) => warn!(chunk_id, "chunk extraction failed ({e}), skipping chunk"),
            }
        }
        if record_ids.is_empty() {
            return Err(PipelineError::StepFailed {
                step: "extract",
                attempts: 1,
                source: Box::new(crate::error::DocGraphError::custom(
                    "every chunk extraction failed",
                )),
            }
            .into());
        }

        // consolidate
        let (_, consolidated_ids) = self
            .run_step("consolidate", || async {
                self.consolidator.consolidate(&record_ids)
            })
            .await?;
        self.progress.increment(progress_id, false);

        // filter (fan-out over the four buckets)
        let main_entity_name = output.summary.main_entity.name.clone();
        let (customers, suppliers, competitors, directors) = tokio::join!(
            self.run_step("filter_customers", || async {
                self.filter
                    .filter_customers(&consolidated_ids.customers, &main_entity_name)
                    .await
            }),
            self.run_step("filter_suppliers", || async {
                self.filter
                    .filter_suppliers(&consolidated_ids.suppliers_or_partners, &main_entity_name)
                    .await
            }),
            self.run_step("filter_competitors", || async {
                self.filter
                    .filter_competitors(&consolidated_ids.competitors, &main_entity_name)
                    .await
            }),
            self.run_step("filter_directors", || async {
                self.filter
                    .filter_directors(&consolidated_ids.directors, &main_entity_name)
                    .await
            }),
        );
        let final_ids = FinalBucketIds {
            customers: customers?,
            suppliers_or_partners: suppliers?,
            competitors: competitors?,
            directors: directors?,
        };

        // write graph behind a completion token; the worker may run for a
        // long time, so the wait is bounded separately from step retries
        let report = self
            .run_step("write_graph", || async {
                let receiver = self
                    .writer
                    .clone()
                    .spawn(final_ids.clone(), output.summary.clone());
                match tokio::time::timeout(self.writer_timeout, receiver).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(PipelineError::TaskTokenLost(
                        "graph writer dropped its completion channel".to_string(),
                    )
                    .into()),
                    Err(_) => Err(PipelineError::TaskTokenLost(format!(
                        "graph writer exceeded {}s",
                        self.writer_timeout.as_secs()
                    ))
                    .into()),
                }
            })
            .await?;
        self.progress.increment(progress_id, false);

        // cleanup: drop the blob and ack the message
        self.run_step("cleanup", || async {
            self.blob.delete(&document.bucket, &document.key).await?;
            self.queue.delete(&message.receipt)?;
            Ok(())
        })
        .await?;
        self.progress.increment(progress_id, true);

        Ok(report)
    }

    /// Run a step with the standard retry policy: fixed interval, doubling
    /// backoff, bounded attempts.
    async fn run_step<T, F, Fut>(&self, step: &'static str, body: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut interval = self.retry_interval;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match body().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt >= self.retry_attempts {
                        return Err(PipelineError::StepFailed {
                            step,
                            attempts: attempt,
                            source: Box::new(e),
                        }
                        .into());
                    }
                    warn!(step, attempt, "step failed ({e}), retrying in {:?}", interval);
                    tokio::time::sleep(interval).await;
                    interval = interval.mul_f64(self.retry_backoff);
                }
            }
        }
    }
}

/// Execution names are the sanitized key prefix plus a uuid, capped at 80
/// characters.
pub fn execution_name(key: &str) -> String {
    lazy_static! {
        static ref FORBIDDEN: Regex =
            Regex::new(r#"[<>:"/\\|?*()\[\]%]"#).expect("static regex");
    }
    let prefix: String = key.chars().take(40).collect();
    let cleaned = FORBIDDEN.replace_all(&prefix, "");
    format!("{cleaned}_{}", Uuid::new_v4())
}

/// Interpret a document blob as per-page text: a JSON array of page strings
/// (the page-extraction contract), falling back to blank-line-separated
/// blocks of plain text.
pub fn pages_from_blob(bytes: &[u8]) -> Vec<String> {
    if let Ok(pages) = serde_json::from_slice::<Vec<String>>(bytes) {
        return pages;
    }
    let text = String::from_utf8_lossy(bytes);
    text.split("\n\n")
        .map(|block| block.to_string())
        .filter(|block| !block.trim().is_empty())
        .collect()
}
