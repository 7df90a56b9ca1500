use anyhow::Result;
use serde_json::{Map, json};

use crate::build::{DCE_VERSION, export};
use crate::cli::ReindexArgs;
use crate::commands::{connect_ollama, resolve_embedding_settings};
use crate::journal;
use crate::llm::providers::{OllamaDescriptionProvider, OllamaEmbeddingProvider};
use crate::llm::{DEFAULT_DESCRIPTION_MODEL_ID, DescriptionProvider};
use crate::plugins::load_plugins;
use crate::project;
use crate::services::ChunkEmbeddingService;
use crate::storage;

pub fn run(args: ReindexArgs) -> Result<()> {
    let layout = project::ensure_project_dir(&args.project_dir)?;
    let config = layout.read_config()?;
    let (model_id, dim) = resolve_embedding_settings(&config, args.embed_model, args.embed_dim);

    let contexts = export::read_all_contexts(&layout.output_dir())?;
    if contexts.is_empty() {
        println!("No exported contexts found under {}.", layout.output_dir().display());
        return Ok(());
    }

    let mut conn = storage::open_database(&layout.db_path())?;
    let client = connect_ollama()?;

    let embedding_provider = OllamaEmbeddingProvider::new(client.clone(), model_id, dim);
    embedding_provider.pull_model_if_needed()?;

    let description_provider = if args.chunk_embedding_mode.should_generate_description() {
        client.pull_model(DEFAULT_DESCRIPTION_MODEL_ID)?;
        Some(OllamaDescriptionProvider::new(
            client.clone(),
            DEFAULT_DESCRIPTION_MODEL_ID,
        ))
    } else {
        None
    };

    let chunk_embedding_service = ChunkEmbeddingService::new(
        &embedding_provider,
        description_provider
            .as_ref()
            .map(|p| p as &dyn DescriptionProvider),
        args.chunk_embedding_mode,
    )?;

    let plugins = load_plugins(false)?;
    let (ok, failed) =
        export::reembed_contexts(&mut conn, &plugins, &chunk_embedding_service, &contexts)?;

    let mut extra = Map::new();
    extra.insert("ok".to_string(), json!(ok));
    extra.insert("failed".to_string(), json!(failed));
    journal::log_event(config.project_id, DCE_VERSION, "reindex_finished", extra);

    println!("Re-embedded {ok} context(s), {failed} failed.");
    Ok(())
}
