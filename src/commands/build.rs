use anyhow::Result;
use serde_json::{Map, json};

use crate::build::{BuildService, DCE_VERSION};
use crate::cli::BuildArgs;
use crate::commands::{connect_ollama, resolve_embedding_settings};
use crate::journal;
use crate::llm::providers::{OllamaDescriptionProvider, OllamaEmbeddingProvider};
use crate::llm::{DEFAULT_DESCRIPTION_MODEL_ID, DescriptionProvider};
use crate::progress::{DatasourceStatus, ProgressEvent, ProgressKind};
use crate::project;
use crate::services::ChunkEmbeddingService;
use crate::storage;

pub fn run(args: BuildArgs) -> Result<()> {
    let layout = project::ensure_project_dir(&args.project_dir)?;
    let config = layout.read_config()?;
    let (model_id, dim) = resolve_embedding_settings(&config, args.embed_model, args.embed_dim);

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
    let build_service = BuildService::new(config.project_id.to_string(), chunk_embedding_service);

    journal::log_event(config.project_id, DCE_VERSION, "build_started", Map::new());

    let progress = print_progress;
    let results = crate::build::build(&layout, &mut conn, &build_service, Some(&progress))?;

    let ok = count_status(&results, DatasourceStatus::Ok);
    let failed = count_status(&results, DatasourceStatus::Failed);
    let skipped = count_status(&results, DatasourceStatus::Skipped);

    let mut extra = Map::new();
    extra.insert("ok".to_string(), json!(ok));
    extra.insert("failed".to_string(), json!(failed));
    extra.insert("skipped".to_string(), json!(skipped));
    journal::log_event(config.project_id, DCE_VERSION, "build_finished", extra);

    for result in &results {
        match result.status {
            DatasourceStatus::Ok => println!("built   {}", result.datasource_id),
            DatasourceStatus::Skipped => println!("skipped {} (no plugin)", result.datasource_id),
            DatasourceStatus::Failed => println!(
                "failed  {} ({})",
                result.datasource_id,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    println!("Build finished: {ok} ok, {failed} failed, {skipped} skipped");

    Ok(())
}

fn count_status(results: &[crate::build::BuildDatasourceResult], status: DatasourceStatus) -> usize {
    results.iter().filter(|r| r.status == status).count()
}

fn print_progress(event: &ProgressEvent) {
    match event.kind {
        ProgressKind::DatasourceStarted => {
            if let (Some(id), Some(index), Some(total)) = (
                event.datasource_id.as_deref(),
                event.datasource_index,
                event.datasource_total,
            ) {
                eprintln!("[{}/{total}] {id}", index + 1);
            }
        }
        ProgressKind::TaskFinished => eprintln!("{}", event.message),
        _ => {}
    }
}
