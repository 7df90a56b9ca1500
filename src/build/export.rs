use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use duckdb::Connection;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::build::BuiltDatasourceContext;
use crate::datasources::DatasourceId;
use crate::pluginlib::DatasourceType;
use crate::plugins::PluginRegistry;
use crate::project::ALL_RESULTS_FILE_NAME;
use crate::services::ChunkEmbeddingService;

/// Write the per-datasource context YAML under the output directory.
pub fn export_build_result(output_dir: &Path, result: &BuiltDatasourceContext) -> Result<PathBuf> {
    let datasource_id = DatasourceId::from_string_repr(&result.datasource_id);
    let export_file_path = output_dir.join(datasource_id.relative_path_to_context_file());

    if let Some(parent) = export_file_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let yaml = serde_yaml::to_string(result)
        .with_context(|| format!("failed to serialise context for {}", result.datasource_id))?;
    fs::write(&export_file_path, yaml)
        .with_context(|| format!("failed to write {}", export_file_path.display()))?;

    info!(path = %export_file_path.display(), "exported result");
    Ok(export_file_path)
}

pub fn append_result_to_all_results(
    output_dir: &Path,
    result: &BuiltDatasourceContext,
) -> Result<()> {
    let path = output_dir.join(ALL_RESULTS_FILE_NAME);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let yaml = serde_yaml::to_string(result)
        .with_context(|| format!("failed to serialise context for {}", result.datasource_id))?;

    use std::io::Write;
    let mut handle = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    handle
        .write_all(context_header(&result.datasource_id).as_bytes())
        .and_then(|()| handle.write_all(yaml.as_bytes()))
        .and_then(|()| handle.write_all(b"\n"))
        .with_context(|| format!("failed to append {}", path.display()))
}

/// The aggregated file is exclusive per run.
pub fn reset_all_results(output_dir: &Path) -> Result<()> {
    let path = output_dir.join(ALL_RESULTS_FILE_NAME);
    if path.exists() {
        fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(())
}

pub fn context_header(datasource_id: &str) -> String {
    format!("# ===== {datasource_id} =====\n")
}

/// Read every exported context back from the output directory. Files that do
/// not parse as a context are skipped with a warning.
pub fn read_all_contexts(output_dir: &Path) -> Result<Vec<BuiltDatasourceContext>> {
    if !output_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut contexts = Vec::new();
    for entry in WalkDir::new(output_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if extension != "yaml" && extension != "yml" {
            continue;
        }
        if path.file_name().is_some_and(|n| n == ALL_RESULTS_FILE_NAME) {
            continue;
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        match serde_yaml::from_str::<BuiltDatasourceContext>(&raw) {
            Ok(context) => contexts.push(context),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable context file"),
        }
    }

    Ok(contexts)
}

/// Re-chunk and re-embed previously exported contexts, overriding whatever
/// the store currently holds for each datasource.
pub fn reembed_contexts(
    conn: &mut Connection,
    plugins: &PluginRegistry,
    chunk_embedding_service: &ChunkEmbeddingService,
    contexts: &[BuiltDatasourceContext],
) -> Result<(usize, usize)> {
    let mut ok = 0;
    let mut failed = 0;

    for context in contexts {
        let datasource_type = DatasourceType::new(context.datasource_type.clone());
        let Some(plugin) = plugins.get(&datasource_type) else {
            warn!(
                datasource_id = %context.datasource_id,
                full_type = %context.datasource_type,
                "no plugin for exported context, skipping"
            );
            failed += 1;
            continue;
        };

        let outcome = plugin
            .divide_context_into_chunks(&context.context)
            .map_err(anyhow::Error::from)
            .and_then(|chunks| {
                let context_yaml = serde_yaml::to_string(&context.context)?;
                chunk_embedding_service
                    .embed_chunks(
                        conn,
                        &chunks,
                        &context_yaml,
                        &context.datasource_type,
                        &context.datasource_id,
                    )
                    .map_err(anyhow::Error::from)
            });

        match outcome {
            Ok(()) => ok += 1,
            Err(e) => {
                warn!(datasource_id = %context.datasource_id, error = %e, "re-embed failed");
                failed += 1;
            }
        }
    }

    Ok((ok, failed))
}
