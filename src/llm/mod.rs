use thiserror::Error;

pub mod client;
pub mod config;
pub mod providers;
pub mod runtime;

pub use client::OllamaClient;
pub use config::OllamaConfig;
pub use providers::{
    OllamaDescriptionProvider, OllamaEmbeddingProvider, OllamaPromptProvider,
};

pub const DEFAULT_EMBED_MODEL_ID: &str = "nomic-embed-text:v1.5";
pub const DEFAULT_EMBED_DIM: usize = 768;
pub const DEFAULT_DESCRIPTION_MODEL_ID: &str = "llama3.2:1b";

#[derive(Debug, Error)]
pub enum LlmError {
    /// Network failures, timeouts and 5xx responses; typically worth retrying.
    #[error("transient ollama error: {0}")]
    Transient(String),
    /// 4xx responses, bad response schemas and dimension mismatches; retrying
    /// without changing inputs will not help.
    #[error("permanent ollama error: {0}")]
    Permanent(String),
    #[error("timed out waiting for ollama to become healthy at {0}")]
    HealthTimeout(String),
}

pub trait EmbeddingProvider {
    fn embedder(&self) -> &str;
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

pub trait DescriptionProvider {
    fn model_id(&self) -> &str;
    fn describe(&self, text: &str, context: &str) -> Result<String, LlmError>;
}

pub trait PromptProvider {
    fn model_id(&self) -> &str;
    fn prompt(&self, prompt: &str) -> Result<String, LlmError>;
}
