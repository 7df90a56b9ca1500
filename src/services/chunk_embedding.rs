use clap::ValueEnum;
use duckdb::Connection;
use tracing::debug;

use crate::llm::{DescriptionProvider, EmbeddingProvider};
use crate::pluginlib::EmbeddableChunk;
use crate::services::{ChunkEmbedding, ServiceError, persistence};
use crate::shards;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ChunkEmbeddingMode {
    EmbeddableTextOnly,
    GeneratedDescriptionOnly,
    EmbeddableTextAndGeneratedDescription,
}

impl ChunkEmbeddingMode {
    pub fn should_generate_description(self) -> bool {
        matches!(
            self,
            Self::GeneratedDescriptionOnly | Self::EmbeddableTextAndGeneratedDescription
        )
    }
}

/// Turns plugin chunks into persisted chunks and embeddings.
///
/// All chunks are embedded before the shard is resolved or anything is
/// written, so a provider failure leaves the store untouched.
pub struct ChunkEmbeddingService<'a> {
    embedding_provider: &'a dyn EmbeddingProvider,
    description_provider: Option<&'a dyn DescriptionProvider>,
    mode: ChunkEmbeddingMode,
}

impl<'a> ChunkEmbeddingService<'a> {
    pub fn new(
        embedding_provider: &'a dyn EmbeddingProvider,
        description_provider: Option<&'a dyn DescriptionProvider>,
        mode: ChunkEmbeddingMode,
    ) -> Result<Self, ServiceError> {
        if mode.should_generate_description() && description_provider.is_none() {
            return Err(ServiceError::MissingDescriptionProvider);
        }

        Ok(Self {
            embedding_provider,
            description_provider,
            mode,
        })
    }

    pub fn embed_chunks(
        &self,
        conn: &mut Connection,
        chunks: &[EmbeddableChunk],
        context_yaml: &str,
        full_type: &str,
        datasource_id: &str,
    ) -> Result<(), ServiceError> {
        if chunks.is_empty() {
            return Ok(());
        }

        debug!(
            datasource_id,
            chunks = chunks.len(),
            mode = ?self.mode,
            "embedding chunks"
        );

        let mut enriched = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let display_text = display_text_for(chunk)?;

            let mut generated_description = String::new();
            let embedding_text = match self.mode {
                ChunkEmbeddingMode::EmbeddableTextOnly => chunk.embeddable_text.clone(),
                ChunkEmbeddingMode::GeneratedDescriptionOnly => {
                    generated_description = self.describe(&display_text, context_yaml)?;
                    generated_description.clone()
                }
                ChunkEmbeddingMode::EmbeddableTextAndGeneratedDescription => {
                    generated_description = self.describe(&display_text, context_yaml)?;
                    format!("{generated_description}\n{}", chunk.embeddable_text)
                }
            };

            let vec = self.embedding_provider.embed(&embedding_text)?;

            enriched.push(ChunkEmbedding {
                chunk: chunk.clone(),
                vec,
                display_text,
                generated_description,
            });
        }

        let table_name = shards::resolve_or_create(
            conn,
            self.embedding_provider.embedder(),
            self.embedding_provider.model_id(),
            self.embedding_provider.dim(),
        )?;

        persistence::write_chunks_and_embeddings(
            conn,
            &enriched,
            &table_name,
            full_type,
            datasource_id,
            self.embedding_provider.dim(),
            true,
        )?;

        Ok(())
    }

    fn describe(&self, text: &str, context: &str) -> Result<String, ServiceError> {
        let provider = self
            .description_provider
            .ok_or(ServiceError::MissingDescriptionProvider)?;
        Ok(provider.describe(text, context)?)
    }
}

fn display_text_for(chunk: &EmbeddableChunk) -> Result<String, ServiceError> {
    match &chunk.content {
        serde_yaml::Value::String(text) => Ok(text.clone()),
        other => serde_yaml::to_string(other).map_err(|e| ServiceError::Yaml(e.to_string())),
    }
}
