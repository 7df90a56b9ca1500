use std::env;

use duckdb::Connection;
use tracing::debug;

use crate::datasources::DatasourceId;
use crate::llm::{EmbeddingProvider, PromptProvider};
use crate::services::ServiceError;
use crate::shards;
use crate::storage::chunk_search_repository;
use crate::storage::dtos::SearchResult;

pub const DISTANCE_THRESHOLD: f64 = 0.75;
pub const DEFAULT_LIMIT: usize = 10;
pub const RAG_MODE_ENV_VAR: &str = "DATABAO_CONTEXT_RAG_MODE";

const REWRITE_PROMPT: &str = "Rewrite the following question so it retrieves the most relevant \
datasource context from a semantic search index. Expand abbreviations, name the entities \
involved and drop filler words. Return only the rewritten query.\n\nQuestion:\n{query}\n";

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RagMode {
    #[default]
    RawQuery,
    RewriteQuery,
}

impl RagMode {
    pub fn from_env() -> Self {
        match env::var(RAG_MODE_ENV_VAR).as_deref() {
            Ok("REWRITE_QUERY") => Self::RewriteQuery,
            _ => Self::RawQuery,
        }
    }
}

/// Retrieval pipeline: optional query rewrite, embed, shard lookup, cosine
/// k-NN with threshold filtering and datasource scoping.
pub struct RetrieveService<'a> {
    embedding_provider: &'a dyn EmbeddingProvider,
    prompt_provider: Option<&'a dyn PromptProvider>,
}

impl<'a> RetrieveService<'a> {
    pub fn new(
        embedding_provider: &'a dyn EmbeddingProvider,
        prompt_provider: Option<&'a dyn PromptProvider>,
    ) -> Self {
        Self {
            embedding_provider,
            prompt_provider,
        }
    }

    pub fn retrieve(
        &self,
        conn: &Connection,
        text: &str,
        limit: Option<usize>,
        datasource_ids: Option<&[DatasourceId]>,
        rag_mode: RagMode,
    ) -> Result<Vec<SearchResult>, ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT);

        let query_text = match rag_mode {
            RagMode::RawQuery => text.to_string(),
            RagMode::RewriteQuery => {
                let provider = self
                    .prompt_provider
                    .ok_or(ServiceError::MissingPromptProvider)?;
                let rewritten = provider.prompt(&REWRITE_PROMPT.replace("{query}", text))?;
                debug!(original = text, rewritten = %rewritten, "rewrote query");
                rewritten
            }
        };

        let shard = shards::resolve(
            conn,
            self.embedding_provider.embedder(),
            self.embedding_provider.model_id(),
        )?;

        let query_vec = self.embedding_provider.embed(&query_text)?;

        let scoped_ids = datasource_ids.map(|ids| {
            ids.iter()
                .map(|id| id.as_str().to_string())
                .collect::<Vec<String>>()
        });

        let results = chunk_search_repository::search_by_similarity(
            conn,
            &shard.table_name,
            &query_vec,
            shard.dim,
            DISTANCE_THRESHOLD,
            limit,
            scoped_ids.as_deref(),
        )?;

        debug!(
            table_name = %shard.table_name,
            results = results.len(),
            "retrieved display texts"
        );

        Ok(results)
    }
}
