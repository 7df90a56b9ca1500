use thiserror::Error;

use crate::llm::LlmError;
use crate::pluginlib::EmbeddableChunk;
use crate::storage::StorageError;

pub mod chunk_embedding;
pub mod persistence;

pub use chunk_embedding::{ChunkEmbeddingMode, ChunkEmbeddingService};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("a description provider must be provided when generating descriptions")]
    MissingDescriptionProvider,
    #[error("a prompt provider must be provided when rewriting queries")]
    MissingPromptProvider,
    #[error("yaml serialization failed: {0}")]
    Yaml(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// A plugin chunk enriched with everything needed to persist it.
#[derive(Debug, Clone)]
pub struct ChunkEmbedding {
    pub chunk: EmbeddableChunk,
    pub vec: Vec<f32>,
    pub display_text: String,
    pub generated_description: String,
}
