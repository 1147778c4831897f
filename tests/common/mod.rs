//! Shared test harness: a scripted LLM transport plus a fully wired
//! in-process pipeline over the memory graph and a temp-dir blob store.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docgraph::config::Config;
use docgraph::error::LlmError;
use docgraph::graph::{GraphAccess, MemoryGraph};
use docgraph::llm::client::{CompletionRequest, LlmTransport};
use docgraph::llm::{LlmGateway, PromptAudit};
use docgraph::news::NewsProcessor;
use docgraph::pipeline::queue::WorkQueue;
use docgraph::pipeline::{Orchestrator, PipelineDeps};
use docgraph::store::{KvStore, LocalBlobStore};

/// Scripted transport that routes on prompt content, mimicking the
/// deterministic endpoint: identical prompts yield identical completions.
pub struct ScriptedLlm {
    pub summary_json: String,
    pub extraction_json: String,
    pub customers_kept: Vec<String>,
    pub suppliers_kept: Vec<String>,
    pub competitors_kept: Vec<String>,
    pub directors_kept: Vec<String>,
    pub news_entities_json: String,
    pub impact: String,
    /// When set, the first `n` completions fail with 503.
    pub failures_remaining: AtomicU32,
    pub calls: AtomicU32,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self {
            summary_json: default_summary(),
            extraction_json: default_extraction(),
            customers_kept: vec!["GLOBEX".to_string()],
            suppliers_kept: vec!["INITRODE".to_string()],
            competitors_kept: vec!["INITECH".to_string()],
            directors_kept: vec!["JANE DOE".to_string()],
            news_entities_json: "[]".to_string(),
            impact: "NEGATIVE".to_string(),
            failures_remaining: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }
}

pub fn default_summary() -> String {
    serde_json::json!({
        "MAIN_ENTITY": {
            "NAME": "ACME CORP",
            "ATTRIBUTES": [
                { "INDUSTRY": "MANUFACTURING" },
                { "FOCUS_AREA": ["WIDGETS"] },
                { "REVENUE_GENERATING_INDUSTRIES": ["MANUFACTURING"] },
                { "SUMMARY_OF_BUSINESS_PERFORMANCE": "STRONG YEAR" },
                { "SUMMARY_OF_BUSINESS_STRATEGY": "EXPAND WIDGET CLOUD" }
            ]
        }
    })
    .to_string()
}

pub fn default_extraction() -> String {
    serde_json::json!({
        "COMMERCIAL_PRODUCTS_OR_SERVICES": [{ "NAME": "WIDGET CLOUD" }],
        "CUSTOMERS": [
            { "NAME": "GLOBEX", "PRODUCTS_USED": "WIDGET CLOUD", "FOCUS_AREA": "RETAIL", "INDUSTRY": "RETAIL" },
            { "NAME": "the team", "PRODUCTS_USED": "", "FOCUS_AREA": "", "INDUSTRY": "" }
        ],
        "SUPPLIERS_OR_PARTNERS": [
            { "NAME": "INITRODE", "RELATIONSHIP": "COMPONENT SUPPLY", "FOCUS_AREA": "ELECTRONICS", "INDUSTRY": "ELECTRONICS" }
        ],
        "COMPETITORS": [
            { "NAME": "INITECH", "COMPETING_IN": "WIDGETS", "FOCUS_AREA": "WIDGETS", "INDUSTRY": "MANUFACTURING" }
        ],
        "DIRECTORS": [
            { "NAME": "JANE DOE", "ROLE": "CHAIRMAN", "OTHER_ASSOCIATIONS": [
                { "ROLE": "DIRECTOR", "COMPANY_NAME": "UMBRELLA", "FOCUS_AREA": "PHARMA", "INDUSTRY": "PHARMA" }
            ]}
        ]
    })
    .to_string()
}

/// Pull the first `"ID":"..."` out of a disambiguation prompt's candidate
/// blocks so resolution always lands on the first existing candidate.
fn first_candidate_id(prompt: &str) -> Option<String> {
    let start = prompt.find("<potential-entity-match>")?;
    let id_key = prompt[start..].find("\"ID\":\"")? + start + "\"ID\":\"".len();
    let end = prompt[id_key..].find('"')? + id_key;
    Some(prompt[id_key..end].to_string())
}

fn names_array(names: &[String]) -> String {
    serde_json::to_string(names).unwrap()
}

#[async_trait]
impl LlmTransport for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LlmError::ServiceUnavailable("scripted 503".to_string()));
        }

        let prompt = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if prompt.contains("Identify the full name of the main entity") {
            return Ok(format!("<results>{}</results>", self.summary_json));
        }
        if prompt.contains("Using the text enclosed within <document></document> tag") {
            return Ok(format!(
                "<thoughts>scripted</thoughts><results>{}</results>",
                self.extraction_json
            ));
        }
        if prompt.contains("JSON object of companies who are customers") {
            return Ok(format!(
                "<explanation>scripted</explanation><customers>{}</customers>",
                names_array(&self.customers_kept)
            ));
        }
        if prompt.contains("JSON object of companies who are suppliers or partners") {
            return Ok(format!(
                "<explanation>scripted</explanation><suppliers_or_partners>{}</suppliers_or_partners>",
                names_array(&self.suppliers_kept)
            ));
        }
        if prompt.contains("JSON object of companies who are competitors") {
            return Ok(format!(
                "<explanation>scripted</explanation><competitors>{}</competitors>",
                names_array(&self.competitors_kept)
            ));
        }
        if prompt.contains("JSON object of people who works for") {
            return Ok(format!(
                "<people>{}</people>",
                names_array(&self.directors_kept)
            ));
        }
        if prompt.contains("expert in disambiguating entities") {
            let answer = first_candidate_id(&prompt)
                .unwrap_or_else(|| "NO MATCH FOUND".to_string());
            return Ok(format!(
                "<explanation>scripted</explanation><results>{answer}</results>"
            ));
        }
        if prompt.contains("Extract out any companies or people mentioned in the article") {
            return Ok(format!(
                "<entities>{}</entities>",
                self.news_entities_json
            ));
        }
        if prompt.contains("random financial news generator") {
            return Ok(
                "<news>\n<date>01 Jan 2024</date>\n<title>Fictional headline</title>\n<text>[THIS IS A FICTIONAL NEWS FOR TESTING PURPOSES ONLY] Markets moved.</text>\n<url>N/A</url>\n</news>"
                    .to_string(),
            );
        }
        if prompt.contains("assess the potential impact of the news article") {
            return Ok(format!(
                "<result>scripted impact summary</result><impact>{}</impact>",
                self.impact
            ));
        }
        Ok("<results>NO MATCH FOUND</results>".to_string())
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(vec![0.0; 8])
    }
}

/// Fully wired in-process pipeline.
pub struct Harness {
    pub store: KvStore,
    pub blob: Arc<LocalBlobStore>,
    pub backend: Arc<MemoryGraph>,
    pub access: Arc<GraphAccess>,
    pub gateway: Arc<LlmGateway>,
    pub document_queue: Arc<WorkQueue>,
    pub news_queue: Arc<WorkQueue>,
    pub orchestrator: Arc<Orchestrator>,
    pub news: Arc<NewsProcessor>,
    pub llm: Arc<ScriptedLlm>,
    _blob_dir: tempfile::TempDir,
}

pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.pipeline.step_retry_interval_secs = 0;
    config.news.retry_backoff_base_secs = 0;
    config.queue.poll_interval_ms = 1;
    config
}

pub fn harness_with(llm: ScriptedLlm) -> Harness {
    harness_on_graph(llm, Arc::new(MemoryGraph::new()))
}

/// Build a harness over an existing graph backend so multiple harnesses can
/// share one graph.
pub fn harness_on_graph(llm: ScriptedLlm, backend: Arc<MemoryGraph>) -> Harness {
    let config = fast_config();
    let store = KvStore::in_memory();
    let blob_dir = tempfile::tempdir().expect("tempdir");
    let blob = Arc::new(LocalBlobStore::new(blob_dir.path()));
    let llm = Arc::new(llm);
    let audit = PromptAudit::new(&store, config.storage.prompt_ttl_secs);
    let gateway = Arc::new(
        LlmGateway::new(llm.clone(), audit, &config.llm).with_throttle_backoff(0..=0),
    );
    let access = Arc::new(
        GraphAccess::new(backend.clone(), gateway.clone()).with_transient_backoff(0..=0),
    );
    let document_queue = Arc::new(WorkQueue::fifo(
        Duration::from_secs(config.queue.visibility_timeout_secs),
        config.queue.max_receives,
    ));
    let news_queue = Arc::new(WorkQueue::standard(
        Duration::from_secs(config.queue.visibility_timeout_secs),
        config.queue.max_receives,
    ));
    let orchestrator = Arc::new(Orchestrator::new(PipelineDeps {
        store: store.clone(),
        blob: blob.clone(),
        queue: document_queue.clone(),
        gateway: gateway.clone(),
        access: access.clone(),
        config: config.clone(),
    }));
    let news = Arc::new(NewsProcessor::new(
        &store,
        gateway.clone(),
        access.clone(),
        blob.clone(),
        news_queue.clone(),
        &config.news,
        config.queue.poll_interval_ms,
    ));
    Harness {
        store,
        blob,
        backend,
        access,
        gateway,
        document_queue,
        news_queue,
        orchestrator,
        news,
        llm,
        _blob_dir: blob_dir,
    }
}

/// Store a three-page document blob and enqueue its ingestion message.
pub async fn enqueue_document(harness: &Harness, key: &str) {
    use docgraph::store::BlobStore;
    let pages = vec![
        "ACME CORP annual report. ACME sells WIDGET CLOUD to GLOBEX.".to_string(),
        "INITRODE supplies components. INITECH competes in widgets.".to_string(),
        "JANE DOE chairs the board and is a director of UMBRELLA.".to_string(),
    ];
    harness
        .blob
        .put("documents", key, serde_json::to_vec(&pages).unwrap())
        .await
        .unwrap();
    let body = serde_json::json!({ "S3_BUCKET": "documents", "S3_KEY": key }).to_string();
    harness
        .document_queue
        .send(body, Some(docgraph::pipeline::queue::GROUP_INGESTION));
}
