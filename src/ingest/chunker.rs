//! Document chunking and summary generation.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ChunkError, LlmError, Result};
use crate::ingest::records::DocumentSummary;
use crate::llm::{clean_json_string, prompts, text_within_tags, uppercase_json, LlmGateway};
use crate::store::KvTable;

/// Estimated token budget per chunk; a word is counted as one token.
pub const MAX_TOKENS_PER_CHUNK: usize = 500;

/// One contiguous page range of a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    #[serde(rename = "startPage")]
    pub start_page: usize,
    #[serde(rename = "endPage")]
    pub end_page: usize,
    pub text: String,
}

/// A chunk persisted to the scratch table with its extraction context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: String,
    #[serde(rename = "startPage")]
    pub start_page: usize,
    #[serde(rename = "endPage")]
    pub end_page: usize,
    pub summary: DocumentSummary,
    pub source: String,
    pub text: String,
}

/// Chunking result handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct ChunkOutput {
    pub chunk_ids: Vec<String>,
    pub summary: DocumentSummary,
    pub summary_short: DocumentSummary,
}

/// Partition per-page text into page-contiguous chunks within the token
/// budget. Every page lands in exactly one chunk; a page that alone exceeds
/// the budget becomes its own chunk.
pub fn split_document(pages: &[String], max_tokens: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut text = String::new();
    let mut token_count = 0usize;
    let mut start_page = 1usize;

    for (index, page) in pages.iter().enumerate() {
        let current_page = index + 1;
        let page_text = normalize_page(page);
        let page_tokens = page_text.matches(' ').count();

        if !text.is_empty() && token_count + page_tokens > max_tokens {
            chunks.push(Chunk {
                id: Uuid::new_v4().to_string(),
                start_page,
                end_page: current_page - 1,
                text: std::mem::take(&mut text),
            });
            start_page = current_page;
            token_count = 0;
        }
        text.push_str(&page_text);
        text.push('\n');
        token_count += page_tokens;
    }

    if !pages.is_empty() {
        chunks.push(Chunk {
            id: Uuid::new_v4().to_string(),
            start_page,
            end_page: pages.len(),
            text,
        });
    }
    chunks
}

fn normalize_page(page: &str) -> String {
    page.replace('\u{a0}', " ")
        .replace('\n', " ")
        .replace("  ", " ")
        .replace('"', "")
}

pub struct Chunker {
    gateway: std::sync::Arc<LlmGateway>,
    scratch: KvTable,
    scratch_ttl_secs: i64,
    max_tokens_per_chunk: usize,
    max_summary_chunks: usize,
    empty_result_retries: u32,
}

impl Chunker {
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
            max_tokens_per_chunk: config.max_tokens_per_chunk,
            max_summary_chunks: config.max_summary_chunks,
            empty_result_retries: config.malformed_output_retries,
        }
    }

    /// Chunk the document, derive the summary, persist each chunk with the
    /// short summary attached.
    pub async fn chunk_document(&self, pages: &[String], blob_key: &str) -> Result<ChunkOutput> {
        let chunks = split_document(pages, self.max_tokens_per_chunk);
        if chunks.is_empty() {
            return Err(ChunkError::EmptyDocument.into());
        }
        let basename = blob_key.rsplit('/').next().unwrap_or(blob_key).to_string();

        let summary_chunk_count = self
            .max_summary_chunks
            .min(chunks.len().saturating_sub(1))
            .max(1);
        let mut summary = self.generate_summary(&chunks, summary_chunk_count).await?;
        summary.push_attribute("SOURCE", &basename.to_uppercase());
        let summary_short = summary.short();

        let mut chunk_ids = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let stored = StoredChunk {
                id: chunk.id.clone(),
                start_page: chunk.start_page,
                end_page: chunk.end_page,
                summary: summary_short.clone(),
                source: basename.clone(),
                text: chunk.text.clone(),
            };
            self.scratch
                .put(&chunk.id, &stored, Some(self.scratch_ttl_secs))?;
            chunk_ids.push(chunk.id.clone());
        }
        info!(
            chunks = chunk_ids.len(),
            main_entity = %summary.main_entity.name,
            "document chunked"
        );
        Ok(ChunkOutput {
            chunk_ids,
            summary,
            summary_short,
        })
    }

    /// Prompt for the main-entity summary over the first `count` chunks,
    /// shrinking the window to 75% whenever the model rejects the input as
    /// too long.
    pub async fn generate_summary(
        &self,
        chunks: &[Chunk],
        count: usize,
    ) -> Result<DocumentSummary> {
        let mut count = count.min(chunks.len()).max(1);
        let mut empty_retries = self.empty_result_retries;
        loop {
            let text: String = chunks[..count]
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let messages = prompts::document_summary(&text);
            match self.gateway.query(messages.clone()).await {
                Ok(completion) => {
                    let results = text_within_tags(&completion, "results");
                    let parsed = if results.is_empty() {
                        None
                    } else {
                        serde_json::from_str::<serde_json::Value>(&clean_json_string(&results))
                            .ok()
                            .map(uppercase_json)
                            .and_then(|v| serde_json::from_value::<DocumentSummary>(v).ok())
                    };
                    match parsed {
                        Some(summary) => {
                            let history = format!(
                                "{}\n\n{completion}",
                                crate::llm::client::transcript(&messages)
                            );
                            self.gateway.audit().save(
                                &format!("{}->summary", summary.main_entity.name),
                                &history,
                            );
                            return Ok(summary);
                        }
                        None => {
                            if empty_retries == 0 {
                                return Err(ChunkError::SummaryFailed(
                                    "no usable summary after retries".to_string(),
                                )
                                .into());
                            }
                            empty_retries -= 1;
                            warn!("summary completion unusable, retrying");
                        }
                    }
                }
                Err(LlmError::InputTooLong(_)) => {
                    let reduced = (count as f64 * 0.75) as usize;
                    if reduced == 0 || reduced == count {
                        return Err(ChunkError::SummaryFailed(
                            "input too long even for a single chunk".to_string(),
                        )
                        .into());
                    }
                    warn!(from = count, to = reduced, "summary input too long, shrinking");
                    count = reduced;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_of_words(words: usize) -> String {
        vec!["word"; words].join(" ")
    }

    #[test]
    fn chunks_cover_all_pages_contiguously() {
        let pages: Vec<String> = (0..10).map(|_| page_of_words(120)).collect();
        let chunks = split_document(&pages, MAX_TOKENS_PER_CHUNK);
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].start_page, 1);
        assert_eq!(chunks.last().unwrap().end_page, 10);
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_page, pair[0].end_page + 1);
        }
    }

    #[test]
    fn chunk_token_estimate_within_budget_or_single_page() {
        let mut pages: Vec<String> = (0..6).map(|_| page_of_words(200)).collect();
        pages.push(page_of_words(900)); // oversized single page
        let chunks = split_document(&pages, MAX_TOKENS_PER_CHUNK);
        for chunk in &chunks {
            let tokens = chunk.text.matches(' ').count();
            let single_page = chunk.start_page == chunk.end_page;
            assert!(
                tokens <= MAX_TOKENS_PER_CHUNK + chunk.text.matches('\n').count() || single_page,
                "chunk pages {}..{} has {tokens} tokens",
                chunk.start_page,
                chunk.end_page
            );
        }
        // the oversized page is alone in its chunk
        let last = chunks.last().unwrap();
        assert_eq!(last.start_page, last.end_page);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_document(&[], MAX_TOKENS_PER_CHUNK).is_empty());
    }

    #[test]
    fn normalization_strips_quotes_and_nbsp() {
        let pages = vec!["a\u{a0}\"quoted\"\nline".to_string()];
        let chunks = split_document(&pages, MAX_TOKENS_PER_CHUNK);
        assert_eq!(chunks[0].text, "a quoted line\n");
    }

    mod summary {
        use super::*;
        use crate::config::Config;
        use crate::error::DocGraphError;
        use crate::llm::client::{CompletionRequest, LlmTransport};
        use crate::llm::{LlmGateway, PromptAudit};
        use crate::store::KvStore;
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::{Arc, Mutex};

        /// Rejects prompts as too long until the joined text shrinks below
        /// the cutoff, recording the word count of each attempt.
        struct SizeLimited {
            max_words: usize,
            attempts: Mutex<Vec<usize>>,
            calls: AtomicU32,
        }

        #[async_trait]
        impl LlmTransport for SizeLimited {
            async fn complete(
                &self,
                request: &CompletionRequest,
            ) -> std::result::Result<String, LlmError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let words = request.messages[0].content.split_whitespace().count();
                self.attempts.lock().unwrap().push(words);
                if words > self.max_words {
                    return Err(LlmError::InputTooLong("Input is too long".to_string()));
                }
                Ok(format!(
                    "<results>{}</results>",
                    serde_json::json!({
                        "MAIN_ENTITY": { "NAME": "ACME CORP", "ATTRIBUTES": [] }
                    })
                ))
            }

            async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, LlmError> {
                Ok(vec![0.0])
            }
        }

        fn chunker_with(transport: Arc<SizeLimited>, store: &KvStore) -> Chunker {
            let config = Config::default();
            let gateway = Arc::new(
                LlmGateway::new(transport, PromptAudit::new(store, 86400), &config.llm)
                    .with_throttle_backoff(0..=0),
            );
            Chunker::new(gateway, store.table("ingestion"), 7200, &config.pipeline)
        }

        #[tokio::test]
        async fn oversize_summary_shrinks_until_accepted() {
            // 45 chunks of ~100 words each; the endpoint rejects anything
            // over ~2500 words, so 40 chunks fail, then 30 fail, then 22
            // succeed.
            let pages: Vec<String> = (0..45).map(|_| vec!["word"; 100].join(" ")).collect();
            let chunks: Vec<Chunk> = pages
                .iter()
                .enumerate()
                .map(|(i, text)| Chunk {
                    id: format!("c{i}"),
                    start_page: i + 1,
                    end_page: i + 1,
                    text: text.clone(),
                })
                .collect();

            let store = KvStore::in_memory();
            let transport = Arc::new(SizeLimited {
                max_words: 2500,
                attempts: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
            });
            let chunker = chunker_with(transport.clone(), &store);

            let summary = chunker.generate_summary(&chunks, 40).await.unwrap();
            assert_eq!(summary.main_entity.name, "ACME CORP");

            let attempts = transport.attempts.lock().unwrap().clone();
            assert_eq!(attempts.len(), 3);
            assert!(attempts[0] > attempts[1] && attempts[1] > attempts[2]);
            assert!(attempts[2] <= 2500);
        }

        #[tokio::test]
        async fn single_chunk_too_long_fails_cleanly() {
            let chunks = vec![Chunk {
                id: "c0".to_string(),
                start_page: 1,
                end_page: 1,
                text: vec!["word"; 5000].join(" "),
            }];
            let store = KvStore::in_memory();
            let transport = Arc::new(SizeLimited {
                max_words: 10,
                attempts: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
            });
            let chunker = chunker_with(transport, &store);
            let err = chunker.generate_summary(&chunks, 1).await.unwrap_err();
            assert!(matches!(err, DocGraphError::Chunk(_)));
        }
    }
}
