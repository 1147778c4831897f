//! LLM gateway
//!
//! Every model call in the system goes through this module: the streaming
//! transport, the retry policy, tagged-text extraction helpers, the prompt
//! builders and the prompt audit log.

pub mod audit;
pub mod client;
pub mod embeddings;
pub mod gateway;
pub mod prompts;
pub mod tags;

pub use audit::PromptAudit;
pub use client::{ChatMessage, CompletionRequest, HttpLlm, LlmTransport};
pub use gateway::LlmGateway;
pub use tags::{clean_json_string, text_within_tags, uppercase_json};
