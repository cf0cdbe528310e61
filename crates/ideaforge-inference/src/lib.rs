//! # ideaforge-inference
//!
//! Provider adapters, concurrent fan-out, output validation, prompts, and
//! the batched embedding client for the ideaforge research engine.

pub mod adapter;
pub mod embedding;
pub mod fanout;
pub mod mock;
pub mod openai;
pub mod prompts;
pub mod schema;

pub use adapter::{AdapterConfig, ProviderAdapter};
pub use embedding::EmbeddingClient;
pub use fanout::{adapter_with_backend, AttemptOutcome, ProviderRegistry};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use schema::{
    issues_to_message, parse_deepening, parse_research, strip_code_fence, ResearchOutput,
    ValidationIssue,
};
