//! Retry-aware front door for every model call.
//!
//! Throttling and 503s are retried without bound behind a 10–30 s jittered
//! sleep; generic failures get 3 retries; `InputTooLong` always propagates so
//! the caller can shrink its input.

use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::audit::PromptAudit;
use crate::llm::client::{ChatMessage, CompletionRequest, LlmTransport};

const GENERIC_RETRIES: u32 = 3;

pub struct LlmGateway {
    transport: Arc<dyn LlmTransport>,
    audit: PromptAudit,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_tokens: u32,
    throttle_backoff_secs: RangeInclusive<u64>,
}

impl LlmGateway {
    pub fn new(transport: Arc<dyn LlmTransport>, audit: PromptAudit, config: &LlmConfig) -> Self {
        Self {
            transport,
            audit,
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_tokens: config.max_tokens,
            throttle_backoff_secs: 10..=30,
        }
    }

    /// Override the throttle backoff window; tests shrink it to zero.
    pub fn with_throttle_backoff(mut self, range: RangeInclusive<u64>) -> Self {
        self.throttle_backoff_secs = range;
        self
    }

    pub fn audit(&self) -> &PromptAudit {
        &self.audit
    }

    /// Run one streaming completion with the deterministic defaults
    /// (temperature 0, top_p 0).
    pub async fn query(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        let request = CompletionRequest {
            messages,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_tokens: self.max_tokens,
        };
        let mut generic_left = GENERIC_RETRIES;
        loop {
            match self.transport.complete(&request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_throttle() => {
                    let secs = rand::thread_rng().gen_range(self.throttle_backoff_secs.clone());
                    debug!("model endpoint throttled, sleeping {secs}s before retry");
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                }
                Err(e @ LlmError::InputTooLong(_)) => return Err(e),
                Err(e) => {
                    if generic_left == 0 {
                        return Err(e);
                    }
                    generic_left -= 1;
                    warn!("model call failed ({e}), {generic_left} retries left");
                }
            }
        }
    }

    /// Bounded variant used where degradation beats blocking: transient
    /// endpoint failures get `attempts` tries with exponential backoff
    /// (base 2 -> 2, 4, 8 s), anything else returns immediately. Callers
    /// fall back to a degraded result on error.
    pub async fn query_with_backoff(
        &self,
        messages: Vec<ChatMessage>,
        attempts: u32,
        backoff_base_secs: u64,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest {
            messages,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_tokens: self.max_tokens,
        };
        let mut last_error = None;
        for attempt in 0..attempts {
            match self.transport.complete(&request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_throttle() => {
                    warn!("model endpoint unavailable on attempt {}: {e}", attempt + 1);
                    last_error = Some(e);
                    if attempt + 1 < attempts {
                        let secs = backoff_base_secs.saturating_pow(attempt + 1);
                        tokio::time::sleep(Duration::from_secs(secs)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| LlmError::Transport("no attempts made".to_string())))
    }

    /// Embeddings call; the input is clipped to its first 2500 words.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let clipped = super::embeddings::clip_words(text, 2500);
        self.transport.embed(&clipped).await
    }
}
