use anyhow::{Context, Result};
use serde_json::{Map, json};

use crate::build::DCE_VERSION;
use crate::cli::RetrieveArgs;
use crate::commands::{connect_ollama, resolve_embedding_settings};
use crate::datasources::DatasourceId;
use crate::journal;
use crate::llm::providers::{OllamaEmbeddingProvider, OllamaPromptProvider};
use crate::llm::{DEFAULT_DESCRIPTION_MODEL_ID, PromptProvider};
use crate::project;
use crate::retrieve::{RagMode, RetrieveService};
use crate::storage;

pub fn run(args: RetrieveArgs) -> Result<()> {
    let layout = project::ensure_project_dir(&args.project_dir)?;
    let config = layout.read_config()?;
    let (model_id, dim) = resolve_embedding_settings(&config, args.embed_model, args.embed_dim);

    let text = args.text.join(" ");
    let rag_mode = RagMode::from_env();

    let conn = storage::open_database(&layout.db_path())?;
    let client = connect_ollama()?;

    let embedding_provider = OllamaEmbeddingProvider::new(client.clone(), model_id, dim);
    let prompt_provider = if rag_mode == RagMode::RewriteQuery {
        client.pull_model(DEFAULT_DESCRIPTION_MODEL_ID)?;
        Some(OllamaPromptProvider::new(
            client.clone(),
            DEFAULT_DESCRIPTION_MODEL_ID,
        ))
    } else {
        None
    };

    let datasource_ids = if args.datasource_ids.is_empty() {
        None
    } else {
        Some(
            args.datasource_ids
                .iter()
                .map(|id| DatasourceId::from_string_repr(id.as_str()))
                .collect::<Vec<DatasourceId>>(),
        )
    };

    let service = RetrieveService::new(
        &embedding_provider,
        prompt_provider.as_ref().map(|p| p as &dyn PromptProvider),
    );
    let results = service.retrieve(
        &conn,
        &text,
        args.limit,
        datasource_ids.as_deref(),
        rag_mode,
    )?;

    let mut extra = Map::new();
    extra.insert("results".to_string(), json!(results.len()));
    journal::log_event(config.project_id, DCE_VERSION, "retrieve", extra);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("could not serialise results")?
        );
        return Ok(());
    }

    if results.is_empty() {
        println!("No matching context found.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "# {}. {} (distance {:.4}, {})",
            rank + 1,
            result.datasource_id,
            result.cosine_distance,
            result.full_type
        );
        println!("{}", result.display_text.trim_end());
        println!();
    }

    Ok(())
}
