use crate::llm::client::OllamaClient;
use crate::llm::{DescriptionProvider, EmbeddingProvider, LlmError, PromptProvider};

const EMBEDDER: &str = "ollama";
const DEFAULT_EMBED_BATCH_SIZE: usize = 128;

const DESCRIBE_PROMPT: &str = "You summarise datasource fragments so they can be found by \
semantic search.\nGiven the datasource context below, describe the highlighted fragment in one \
or two plain sentences. Return only the description.\n\nDatasource context:\n{context}\n\n\
Fragment:\n{text}\n";

pub struct OllamaEmbeddingProvider {
    client: OllamaClient,
    model_id: String,
    dim: usize,
    embed_batch_size: usize,
}

impl OllamaEmbeddingProvider {
    pub fn new(client: OllamaClient, model_id: impl Into<String>, dim: usize) -> Self {
        Self {
            client,
            model_id: model_id.into(),
            dim,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }

    pub fn pull_model_if_needed(&self) -> Result<(), LlmError> {
        self.client.pull_model(&self.model_id)
    }
}

impl EmbeddingProvider for OllamaEmbeddingProvider {
    fn embedder(&self) -> &str {
        EMBEDDER
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let vec = self.client.embed(&self.model_id, text)?;
        if vec.len() != self.dim {
            return Err(LlmError::Permanent(format!(
                "provider returned dim={} but expected {}",
                vec.len(),
                self.dim
            )));
        }
        Ok(vec)
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let mut vecs = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embed_batch_size) {
            for text in batch {
                vecs.push(self.embed(text)?);
            }
        }
        Ok(vecs)
    }
}

pub struct OllamaDescriptionProvider {
    client: OllamaClient,
    model_id: String,
}

impl OllamaDescriptionProvider {
    pub fn new(client: OllamaClient, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }
}

impl DescriptionProvider for OllamaDescriptionProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn describe(&self, text: &str, context: &str) -> Result<String, LlmError> {
        let prompt = DESCRIBE_PROMPT
            .replace("{context}", context)
            .replace("{text}", text);
        self.client.generate(&self.model_id, &prompt)
    }
}

pub struct OllamaPromptProvider {
    client: OllamaClient,
    model_id: String,
}

impl OllamaPromptProvider {
    pub fn new(client: OllamaClient, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }
}

impl PromptProvider for OllamaPromptProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn prompt(&self, prompt: &str) -> Result<String, LlmError> {
        self.client.generate(&self.model_id, prompt)
    }
}
