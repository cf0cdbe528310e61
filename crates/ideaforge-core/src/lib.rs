//! # ideaforge-core
//!
//! Core types, traits, and configuration for the ideaforge research engine.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other ideaforge crates depend on.

pub mod backend;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use backend::{
    ChatBackend, EmbeddingBackend, FailureKind, IndexedEmbedding, ProviderFailure, RawCompletion,
};
pub use config::{
    AppConfig, ClusteringConfig, DatabaseConfig, EmbeddingConfig, ProviderSpec, ProvidersConfig,
    QueueConfig, ServerConfig,
};
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{is_v7, new_v7};
