use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{debug, info, warn};

use crate::datasources::{DatasourceId, PreparedDatasource, discovery};
use crate::pluginlib::{DatasourceType, Plugin};
use crate::plugins::{PluginRegistry, load_plugins};
use crate::progress::{DatasourceStatus, ProgressCallback, ProgressEmitter};
use crate::project::ProjectLayout;
use crate::services::ChunkEmbeddingService;
use crate::storage::{datasource_run_repository, run_repository};
use crate::util::now_utc_string;

pub mod export;

pub const DCE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Context built for one datasource, as serialised into the run output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltDatasourceContext {
    pub datasource_id: String,
    pub datasource_type: String,
    pub context_built_at: String,
    pub context: Value,
}

#[derive(Debug)]
pub struct BuildDatasourceResult {
    pub datasource_id: DatasourceId,
    pub status: DatasourceStatus,
    pub error: Option<String>,
    pub datasource_type: Option<DatasourceType>,
    pub context_file_path: Option<PathBuf>,
}

/// Run a prepared source through its plugin and wrap the produced context.
pub fn execute_plugin(
    prepared: &PreparedDatasource,
    plugin: &Plugin,
) -> Result<BuiltDatasourceContext> {
    let context = match (prepared, plugin) {
        (
            PreparedDatasource::Config {
                datasource_type,
                config,
                datasource_name,
                ..
            },
            Plugin::Datasource(plugin),
        ) => plugin.build_context(&datasource_type.full_type, datasource_name, config)?,
        (
            PreparedDatasource::File {
                datasource_type,
                path,
                ..
            },
            Plugin::File(plugin),
        ) => {
            let mut file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            plugin.build_file_context(&datasource_type.full_type, &file_name, &mut file)?
        }
        (PreparedDatasource::Config { .. }, Plugin::File(_)) => {
            return Err(anyhow!("a config datasource requires a datasource plugin"));
        }
        (PreparedDatasource::File { .. }, Plugin::Datasource(_)) => {
            return Err(anyhow!("a file datasource requires a file plugin"));
        }
    };

    Ok(BuiltDatasourceContext {
        datasource_id: prepared.datasource_id().as_str().to_string(),
        datasource_type: prepared.datasource_type().full_type.clone(),
        context_built_at: now_utc_string(),
        context,
    })
}

/// Per-source build work: plugin execution, chunking and embedding.
pub struct BuildService<'a> {
    project_id: String,
    chunk_embedding_service: ChunkEmbeddingService<'a>,
}

impl<'a> BuildService<'a> {
    pub fn new(project_id: String, chunk_embedding_service: ChunkEmbeddingService<'a>) -> Self {
        Self {
            project_id,
            chunk_embedding_service,
        }
    }

    pub fn start_run(&self, conn: &Connection) -> Result<i64> {
        let run = run_repository::create(conn, &self.project_id, Some(DCE_VERSION), Utc::now())?;
        info!(run_name = %run.run_name, "started run");
        Ok(run.run_id)
    }

    pub fn finalize_run(&self, conn: &Connection, run_id: i64) -> Result<()> {
        run_repository::set_ended_at(conn, run_id, Utc::now())?;
        Ok(())
    }

    /// 1) execute the plugin, 2) divide the context into chunks, 3) record
    /// the datasource run and embed. An empty chunk list short-circuits after
    /// step 1.
    pub fn process_prepared_source(
        &self,
        conn: &mut Connection,
        run_id: i64,
        prepared: &PreparedDatasource,
        plugin: &Plugin,
    ) -> Result<BuiltDatasourceContext> {
        let result = execute_plugin(prepared, plugin)?;

        let chunks = plugin.divide_context_into_chunks(&result.context)?;
        if chunks.is_empty() {
            info!(datasource_id = %result.datasource_id, "no chunks, skipping embedding");
            return Ok(result);
        }

        let storage_directory = prepared
            .path()
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        datasource_run_repository::create(
            conn,
            run_id,
            plugin.id(),
            &result.datasource_type,
            &result.datasource_id,
            &storage_directory,
        )?;

        let context_yaml = serde_yaml::to_string(&result.context)
            .context("failed to serialise context for the describer")?;

        self.chunk_embedding_service.embed_chunks(
            conn,
            &chunks,
            &context_yaml,
            &result.datasource_type,
            &result.datasource_id,
        )?;

        Ok(result)
    }
}

/// Build entrypoint: discover, prepare, route to plugins, embed and export.
/// No single source failure aborts the pipeline.
pub fn build(
    layout: &ProjectLayout,
    conn: &mut Connection,
    build_service: &BuildService,
    progress: Option<ProgressCallback>,
) -> Result<Vec<BuildDatasourceResult>> {
    let emitter = ProgressEmitter::new(progress);
    let plugins = load_plugins(false)?;

    let descriptors = discovery::discover_datasources(layout)?;
    if descriptors.is_empty() {
        info!(project_dir = %layout.project_dir.display(), "no sources discovered");
        emitter.task_started(0);
        emitter.task_finished(0, 0, 0);
        return Ok(Vec::new());
    }

    let output_dir = layout.output_dir();
    export::reset_all_results(&output_dir)?;

    emitter.task_started(descriptors.len());
    let run_id = build_service.start_run(conn)?;

    let total = descriptors.len();
    let mut results = Vec::with_capacity(total);
    let mut ok = 0;
    let mut failed = 0;
    let mut skipped = 0;

    for (index, descriptor) in descriptors.iter().enumerate() {
        let datasource_id = descriptor.datasource_id.clone();
        emitter.datasource_started(datasource_id.as_str(), index, total);

        let outcome = process_one(layout, conn, build_service, &plugins, run_id, descriptor);
        let result = match outcome {
            Ok(Some(result)) => {
                ok += 1;
                result
            }
            Ok(None) => {
                skipped += 1;
                warn!(datasource_id = %datasource_id, "no plugin for datasource, skipping");
                BuildDatasourceResult {
                    datasource_id: datasource_id.clone(),
                    status: DatasourceStatus::Skipped,
                    error: None,
                    datasource_type: None,
                    context_file_path: None,
                }
            }
            Err(e) => {
                failed += 1;
                info!(
                    datasource_id = %datasource_id,
                    error = %e,
                    "failed to build source"
                );
                debug!(datasource_id = %datasource_id, "failure chain: {e:?}");
                BuildDatasourceResult {
                    datasource_id: datasource_id.clone(),
                    status: DatasourceStatus::Failed,
                    error: Some(e.to_string()),
                    datasource_type: None,
                    context_file_path: None,
                }
            }
        };

        emitter.datasource_finished(
            datasource_id.as_str(),
            index,
            total,
            result.status,
            result.error.as_deref(),
        );
        results.push(result);
    }

    build_service.finalize_run(conn, run_id)?;
    emitter.task_finished(ok, failed, skipped);
    debug!(ok, failed, skipped, "build finished");

    Ok(results)
}

fn process_one(
    layout: &ProjectLayout,
    conn: &mut Connection,
    build_service: &BuildService,
    plugins: &PluginRegistry,
    run_id: i64,
    descriptor: &crate::datasources::DatasourceDescriptor,
) -> Result<Option<BuildDatasourceResult>> {
    let prepared = discovery::prepare_source(layout, descriptor)?;

    info!(
        full_type = %prepared.datasource_type().full_type,
        name = %prepared.datasource_name(),
        "found datasource"
    );

    let Some(plugin) = plugins.get(prepared.datasource_type()) else {
        return Ok(None);
    };

    let result = build_service.process_prepared_source(conn, run_id, &prepared, plugin)?;

    let output_dir = layout.output_dir();
    let context_file_path = export::export_build_result(&output_dir, &result)?;
    export::append_result_to_all_results(&output_dir, &result)?;

    Ok(Some(BuildDatasourceResult {
        datasource_id: descriptor.datasource_id.clone(),
        status: DatasourceStatus::Ok,
        error: None,
        datasource_type: Some(DatasourceType::new(result.datasource_type.clone())),
        context_file_path: Some(context_file_path),
    }))
}

#[cfg(test)]
mod tests;
