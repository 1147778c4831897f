//! News processing path.
//!
//! Each article runs end to end in one task: extract entities and
//! sentiment, search the graph for connection paths to interested entities,
//! score the article's impact along each path, persist the enriched record.
//! Model failures degrade the record (empty extraction, NEUTRAL impact)
//! instead of failing the message.

pub mod generator;

pub use generator::NewsGenerator;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::NewsConfig;
use crate::error::Result;
use crate::graph::{GraphAccess, PathHit};
use crate::llm::client::transcript;
use crate::llm::{clean_json_string, prompts, text_within_tags, uppercase_json, LlmGateway};
use crate::pipeline::progress::ProgressTracker;
use crate::pipeline::queue::{QueueMessage, WorkQueue};
use crate::store::blob::decode_key;
use crate::store::{BlobStore, KvStore, KvTable, Settings, TABLE_NEWS};

/// Steps counted by the news progress record.
const TOTAL_NEWS_STEPS: u32 = 2;

/// Entity extracted from an article.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsEntity {
    #[serde(rename = "NAME", default)]
    pub name: String,
    #[serde(rename = "LABEL", default)]
    pub label: String,
    #[serde(rename = "INDUSTRY", default)]
    pub industry: String,
    #[serde(rename = "SENTIMENT", default)]
    pub sentiment: String,
    #[serde(rename = "SENTIMENT_EXPLANATION", default)]
    pub sentiment_explanation: String,
    #[serde(rename = "RELATIONSHIPS", default)]
    pub relationships: Vec<Value>,
}

/// One scored connection path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPath {
    pub path: String,
    pub interested_entity: String,
    pub impact: String,
    pub assessment: String,
}

/// Paths and sentiment for one article entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityPaths {
    pub name: String,
    pub sentiment: String,
    pub sentiment_explanation: String,
    pub paths: Vec<ScoredPath>,
}

/// Persisted news record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsRecord {
    pub id: String,
    pub date: String,
    pub title: String,
    pub text: String,
    pub url: String,
    pub timestamp: String,
    pub interested: String,
    pub paths: Vec<EntityPaths>,
    pub interested_entities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_news: Option<String>,
}

/// Blob-created notification payload.
#[derive(Debug, Deserialize)]
struct BlobEvent {
    #[serde(rename = "Records")]
    records: Vec<BlobEventRecord>,
}

#[derive(Debug, Deserialize)]
struct BlobEventRecord {
    s3: BlobEventS3,
}

#[derive(Debug, Deserialize)]
struct BlobEventS3 {
    bucket: BlobEventBucket,
    object: BlobEventObject,
}

#[derive(Debug, Deserialize)]
struct BlobEventBucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BlobEventObject {
    key: String,
}

pub struct NewsProcessor {
    gateway: Arc<LlmGateway>,
    access: Arc<GraphAccess>,
    blob: Arc<dyn BlobStore>,
    queue: Arc<WorkQueue>,
    news: KvTable,
    settings: Settings,
    progress: ProgressTracker,
    retry_attempts: u32,
    retry_backoff_base_secs: u64,
    poll_interval: std::time::Duration,
}

impl NewsProcessor {
    pub fn new(
        store: &KvStore,
        gateway: Arc<LlmGateway>,
        access: Arc<GraphAccess>,
        blob: Arc<dyn BlobStore>,
        queue: Arc<WorkQueue>,
        config: &NewsConfig,
        poll_interval_ms: u64,
    ) -> Self {
        Self {
            gateway,
            access,
            blob,
            queue,
            news: store.table(TABLE_NEWS),
            settings: Settings::new(store),
            progress: ProgressTracker::new(store),
            retry_attempts: config.retry_attempts,
            retry_backoff_base_secs: config.retry_backoff_base_secs,
            poll_interval: std::time::Duration::from_millis(poll_interval_ms),
        }
    }

    /// Block-poll the news queue forever.
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.poll_once().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    error!("news worker iteration failed: {e}");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    pub async fn poll_once(&self) -> Result<bool> {
        let Some(message) = self.queue.receive() else {
            return Ok(false);
        };
        self.handle_message(message).await?;
        Ok(true)
    }

    /// Process one queue message: either a blob-created event or a bare
    /// news id (reprocess mode). News messages are always acked; failures
    /// are recorded on the progress record, not retried via the queue.
    pub async fn handle_message(&self, message: QueueMessage) -> Result<()> {
        let outcome = self.dispatch(&message.body).await;
        if let Err(e) = &outcome {
            error!("news message processing failed: {e}");
        }
        self.queue.delete(&message.receipt)?;
        Ok(())
    }

    async fn dispatch(&self, body: &str) -> Result<()> {
        if let Ok(event) = serde_json::from_str::<BlobEvent>(body) {
            let Some(record) = event.records.into_iter().next() else {
                info!("empty blob event, acking");
                return Ok(());
            };
            return self.process_blob(&record.s3.bucket.name, &record.s3.object.key).await;
        }
        if serde_json::from_str::<Value>(body).is_ok() {
            // Valid JSON but not a blob event: a test notification. Ack.
            info!("unrecognized news event, acking silently");
            return Ok(());
        }
        self.reprocess(body.trim()).await
    }

    async fn process_blob(&self, bucket: &str, key: &str) -> Result<()> {
        let decoded = decode_key(key);
        let file_name = decoded.rsplit('/').next().unwrap_or(&decoded).to_string();
        let bytes = self.blob.get(bucket, key).await?;
        let article = String::from_utf8_lossy(&bytes).into_owned();

        let progress_id = self.progress.create(&file_name, "news", TOTAL_NEWS_STEPS)?;
        match self.process_article(&article, &progress_id).await {
            Ok(()) => {
                self.progress.increment(&progress_id, true);
                self.blob.delete(bucket, key).await?;
                Ok(())
            }
            Err(e) => {
                self.progress.mark_failed(&progress_id, &e.to_string());
                Err(e)
            }
        }
    }

    /// Rebuild the article from a stored record and run it again, dropping
    /// the original on success.
    async fn reprocess(&self, news_id: &str) -> Result<()> {
        let Ok(record) = self.news.get_typed::<NewsRecord>(news_id) else {
            warn!(news_id, "news record not found for reprocessing");
            return Ok(());
        };
        let article = format!(
            "\n<date>{}</date>\n<title>{}</title>\n<text>{}</text>\n<url>{}</url>\n",
            record.date, record.title, record.text, record.url
        );
        let progress_id = self.progress.create(
            &format!("Reprocess: {}", record.title),
            "news",
            TOTAL_NEWS_STEPS,
        )?;
        match self.process_article(&article, &progress_id).await {
            Ok(()) => {
                self.progress.increment(&progress_id, true);
                self.news.delete(news_id);
                Ok(())
            }
            Err(e) => {
                self.progress.mark_failed(&progress_id, &e.to_string());
                Err(e)
            }
        }
    }

    /// Extraction, path search and impact scoring for one article.
    pub async fn process_article(&self, article: &str, progress_id: &str) -> Result<()> {
        self.progress.increment(progress_id, false);

        let n = self.settings.get_n();
        let entities = self.extract_entities(article).await;
        let mut paths = Vec::new();
        let mut interested_entities: Vec<String> = Vec::new();

        for entity in &entities {
            let hits = self
                .access
                .find_within_n_hops(
                    &entity.label,
                    &entity.name,
                    json!({ "INDUSTRY": entity.industry }),
                    Value::Array(entity.relationships.clone()),
                    n,
                )
                .await?;
            if hits.is_empty() {
                continue;
            }
            let mut scored = Vec::with_capacity(hits.len());
            for hit in &hits {
                let (assessment, impact) = self
                    .assess_impact(article, hit, &entity.name)
                    .await;
                scored.push(ScoredPath {
                    path: hit.path.clone(),
                    interested_entity: hit.interested_entity.clone(),
                    impact,
                    assessment,
                });
                if !interested_entities.contains(&hit.interested_entity) {
                    interested_entities.push(hit.interested_entity.clone());
                }
            }
            paths.push(EntityPaths {
                name: entity.name.clone(),
                sentiment: entity.sentiment.clone(),
                sentiment_explanation: entity.sentiment_explanation.clone(),
                paths: scored,
            });
        }

        let record = NewsRecord {
            id: Uuid::new_v4().to_string(),
            date: text_within_tags(article, "date"),
            title: text_within_tags(article, "title"),
            text: text_within_tags(article, "text"),
            url: text_within_tags(article, "url"),
            timestamp: Utc::now().format("%Y-%m-%d %H:%M").to_string(),
            interested: if paths.is_empty() { "NO" } else { "YES" }.to_string(),
            paths,
            interested_entities,
            hide_news: None,
        };
        info!(
            title = %record.title,
            interested = %record.interested,
            "news record persisted"
        );
        self.news.put(&record.id, &record, None)?;
        Ok(())
    }

    /// Entity extraction; exhaustion or malformed output degrades to an
    /// empty entity list.
    async fn extract_entities(&self, article: &str) -> Vec<NewsEntity> {
        let messages = prompts::news_extraction(article);
        let completion = match self
            .gateway
            .query_with_backoff(
                messages.clone(),
                self.retry_attempts,
                self.retry_backoff_base_secs,
            )
            .await
        {
            Ok(completion) => completion,
            Err(e) => {
                warn!("news extraction unavailable ({e}), degrading to empty");
                return Vec::new();
            }
        };
        let history = format!("{}\n\n{completion}", transcript(&messages));
        self.gateway.audit().save("news->extract", &history);

        let raw = clean_json_string(&text_within_tags(&completion, "entities"));
        match serde_json::from_str::<Value>(&raw).map(uppercase_json) {
            Ok(value) => serde_json::from_value::<Vec<NewsEntity>>(value).unwrap_or_else(|e| {
                warn!("news extraction unparsable ({e}), degrading to empty");
                Vec::new()
            }),
            Err(e) => {
                warn!("news extraction unparsable ({e}), degrading to empty");
                Vec::new()
            }
        }
    }

    /// Impact scoring; degradation yields a NEUTRAL assessment.
    async fn assess_impact(
        &self,
        article: &str,
        hit: &PathHit,
        news_entity: &str,
    ) -> (String, String) {
        let messages =
            prompts::impact_assessment(article, &hit.path, &hit.interested_entity, news_entity);
        match self
            .gateway
            .query_with_backoff(
                messages.clone(),
                self.retry_attempts,
                self.retry_backoff_base_secs,
            )
            .await
        {
            Ok(completion) => {
                let history = format!("{}\n\n{completion}", transcript(&messages));
                self.gateway.audit().save("news->impact", &history);
                let impact = text_within_tags(&completion, "impact");
                let result = text_within_tags(&completion, "result");
                (result, impact)
            }
            Err(e) => {
                warn!("impact assessment unavailable ({e}), degrading to NEUTRAL");
                (
                    "Unable to assess impact due to service issues".to_string(),
                    "NEUTRAL".to_string(),
                )
            }
        }
    }
}
