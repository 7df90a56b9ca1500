use anyhow::Result;

use crate::llm::client::OllamaClient;
use crate::llm::config::OllamaConfig;
use crate::llm::runtime::{DEFAULT_HEALTH_TIMEOUT, DEFAULT_POLL_INTERVAL, OllamaRuntime};
use crate::llm::{DEFAULT_EMBED_DIM, DEFAULT_EMBED_MODEL_ID};
use crate::project::ProjectConfig;

pub mod build;
pub mod datasource;
pub mod info;
pub mod init;
pub mod reindex;
pub mod retrieve;

/// Embedding model selection: CLI flag, then `OLLAMA_MODEL`, then the project
/// config, then the built-in default. The dimension has no env override.
pub(crate) fn resolve_embedding_settings(
    config: &ProjectConfig,
    cli_model: Option<String>,
    cli_dim: Option<usize>,
) -> (String, usize) {
    let model_id = cli_model
        .or_else(OllamaConfig::model_override_from_env)
        .or_else(|| config.embed_model.clone())
        .unwrap_or_else(|| DEFAULT_EMBED_MODEL_ID.to_string());
    let dim = cli_dim.or(config.embed_dim).unwrap_or(DEFAULT_EMBED_DIM);

    (model_id, dim)
}

/// Build the Ollama client and make sure the daemon is serving, starting it
/// if needed.
pub(crate) fn connect_ollama() -> Result<OllamaClient> {
    let ollama_config = OllamaConfig::from_env();
    let client = OllamaClient::new(&ollama_config)?;

    let runtime = OllamaRuntime::new(&ollama_config, &client);
    // A spawned daemon outlives this process on purpose.
    let _daemon = runtime.start_and_await(DEFAULT_HEALTH_TIMEOUT, DEFAULT_POLL_INTERVAL)?;

    Ok(client)
}
