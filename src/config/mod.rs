//! Configuration management for docgraph

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub graph: GraphConfig,
    pub queue: QueueConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub news: NewsConfig,
    pub web: WebConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the streaming chat-completion endpoint.
    pub endpoint: String,
    pub embeddings_endpoint: String,
    pub model: String,
    pub embeddings_model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    /// Read timeout in seconds for one streaming completion.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Backend selector; "memory" is the in-process reference backend.
    pub backend: String,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Seconds a claimed message stays invisible before redelivery.
    pub visibility_timeout_secs: u64,
    /// Receives before a message moves to the dead-letter queue.
    pub max_receives: u32,
    /// Worker poll cadence in milliseconds.
    pub poll_interval_ms: u64,
    pub document_workers: usize,
    pub news_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    pub persistent: bool,
    /// TTL for per-execution scratch records.
    pub scratch_ttl_secs: i64,
    /// TTL for prompt audit records.
    pub prompt_ttl_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub max_tokens_per_chunk: usize,
    /// Max chunks joined for the document summary prompt.
    pub max_summary_chunks: usize,
    /// Keys per filter shard sent to the classifier.
    pub filter_shard_size: usize,
    pub step_retry_attempts: u32,
    pub step_retry_interval_secs: u64,
    pub step_retry_backoff: f64,
    /// Bounded retries for malformed LLM output.
    pub malformed_output_retries: u32,
    /// Upper bound on the graph-writer task, in seconds.
    pub writer_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    pub retry_attempts: u32,
    /// Base of the exponential backoff, in seconds (2 -> 2,4,8).
    pub retry_backoff_base_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                endpoint: "http://localhost:8053/v1/messages".to_string(),
                embeddings_endpoint: "http://localhost:8053/v1/embeddings".to_string(),
                model: "claude-3-sonnet".to_string(),
                embeddings_model: "titan-embed-text".to_string(),
                api_key_env: "DOCGRAPH_LLM_API_KEY".to_string(),
                max_tokens: 4000,
                temperature: 0.0,
                top_p: 0.0,
                top_k: 250,
                request_timeout_secs: 900,
            },
            graph: GraphConfig {
                backend: "memory".to_string(),
                endpoint: None,
            },
            queue: QueueConfig {
                visibility_timeout_secs: 7200,
                max_receives: 2,
                poll_interval_ms: 1000,
                document_workers: 2,
                news_workers: 2,
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                persistent: false,
                scratch_ttl_secs: 7200,
                prompt_ttl_secs: 86400,
            },
            pipeline: PipelineConfig {
                max_tokens_per_chunk: 500,
                max_summary_chunks: 40,
                filter_shard_size: 100,
                step_retry_attempts: 3,
                step_retry_interval_secs: 1,
                step_retry_backoff: 2.0,
                malformed_output_retries: 3,
                writer_timeout_secs: 7200,
            },
            news: NewsConfig {
                retry_attempts: 3,
                retry_backoff_base_secs: 2,
            },
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                cors: CorsConfig {
                    enabled: true,
                    allowed_origins: vec!["*".to_string()],
                    allowed_methods: vec![
                        "GET".to_string(),
                        "POST".to_string(),
                        "DELETE".to_string(),
                        "OPTIONS".to_string(),
                    ],
                    allowed_headers: vec![
                        "Authorization".to_string(),
                        "Content-Type".to_string(),
                        "Accept".to_string(),
                    ],
                },
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
                file: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from file or use default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: Failed to load config file: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.pipeline.max_tokens_per_chunk, 500);
        assert_eq!(parsed.queue.max_receives, 2);
        assert_eq!(parsed.llm.max_tokens, 4000);
    }

    #[test]
    fn load_or_default_falls_back_on_missing_file() {
        let config = Config::load_or_default("/nonexistent/docgraph.toml");
        assert_eq!(config.pipeline.max_summary_chunks, 40);
    }
}
