//! Synthetic news generation for end-to-end testing.
//!
//! Samples entities from the graph, asks the model for a fictional article
//! mentioning them with assigned sentiments, drops the article into the news
//! bucket and enqueues the matching blob event so the processing path picks
//! it up.

use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::graph::GraphAccess;
use crate::llm::{prompts, text_within_tags, LlmGateway};
use crate::pipeline::queue::WorkQueue;
use crate::store::BlobStore;

pub struct NewsGenerator {
    gateway: Arc<LlmGateway>,
    access: Arc<GraphAccess>,
    blob: Arc<dyn BlobStore>,
    queue: Arc<WorkQueue>,
    bucket: String,
}

impl NewsGenerator {
    pub fn new(
        gateway: Arc<LlmGateway>,
        access: Arc<GraphAccess>,
        blob: Arc<dyn BlobStore>,
        queue: Arc<WorkQueue>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            access,
            blob,
            queue,
            bucket: bucket.into(),
        }
    }

    /// Generate `count` articles; roughly 60% mention known graph entities.
    /// Returns the blob keys written.
    pub async fn generate(&self, count: usize) -> Result<Vec<String>> {
        let entity_list = self.access.get_entities().await?;
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            let (date, mentions) = {
                let mut rng = rand::thread_rng();
                let days_back = rng.gen_range(1..=100);
                let date = (Utc::now() - Duration::days(days_back))
                    .format("%d %b %Y")
                    .to_string();

                let mentions = if !entity_list.is_empty() && rng.gen_bool(0.6) {
                    let probability: f64 = rng.gen();
                    let wanted = if probability < 0.15 {
                        4
                    } else if probability < 0.40 {
                        3
                    } else if probability < 0.60 {
                        2
                    } else {
                        1
                    };
                    (0..wanted)
                        .filter_map(|_| entity_list.choose(&mut rng))
                        .map(|entity| {
                            json!({
                                "NAME": entity.name,
                                "LABEL": entity.label,
                                "SENTIMENT": if rand::thread_rng().gen_bool(0.5) {
                                    "POSITIVE"
                                } else {
                                    "NEGATIVE"
                                },
                            })
                        })
                        .collect::<Vec<_>>()
                } else {
                    Vec::new()
                };
                (date, mentions)
            };

            let entities_json = if mentions.is_empty() {
                String::new()
            } else {
                serde_json::to_string(&mentions)?
            };
            let completion = self
                .gateway
                .query(prompts::generate_article(&date, &entities_json))
                .await?;
            let article = text_within_tags(&completion, "news");

            let key = format!("news_{}.txt", Uuid::new_v4());
            self.blob
                .put(&self.bucket, &key, article.into_bytes())
                .await?;
            let event = json!({
                "Records": [{
                    "s3": {
                        "bucket": { "name": self.bucket },
                        "object": { "key": key },
                    }
                }]
            });
            self.queue.send(event.to_string(), None);
            keys.push(key);
        }
        info!(count = keys.len(), "synthetic news articles generated");
        Ok(keys)
    }
}
