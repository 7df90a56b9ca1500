use std::sync::OnceLock;

use duckdb::Connection;
use regex::Regex;
use tracing::{debug, warn};

use crate::storage::StorageError;
use crate::storage::dtos::EmbeddingModelRegistryRow;
use crate::storage::registry_repository;

fn table_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^embedding_[a-z0-9_]+$").unwrap())
}

/// Shard table name for an `(embedder, model_id, dim)` triple. Unsafe model
/// id characters are folded to underscores.
pub fn build_table_name(embedder: &str, model_id: &str, dim: usize) -> String {
    let safe_model = model_id
        .replace([':', '-', '.', ' '], "_")
        .to_lowercase();
    format!("embedding_{}__{safe_model}__{dim}", embedder.to_lowercase())
}

/// Every repository call that interpolates a shard name revalidates it here
/// before the name reaches SQL.
pub fn validate_table_name(table_name: &str) -> Result<(), StorageError> {
    if !table_name_re().is_match(table_name) {
        return Err(StorageError::InvalidInput(format!(
            "invalid table_name {table_name:?}; expected pattern ^embedding_[a-z0-9_]+$"
        )));
    }
    Ok(())
}

/// Look up the shard registered for `(embedder, model_id)`. Fails when the
/// model was never registered.
pub fn resolve(
    conn: &Connection,
    embedder: &str,
    model_id: &str,
) -> Result<EmbeddingModelRegistryRow, StorageError> {
    registry_repository::get(conn, embedder, model_id)?.ok_or_else(|| {
        StorageError::InvalidInput(format!("model not registered: {embedder}:{model_id}"))
    })
}

/// Idempotently resolve the shard for `(embedder, model_id, dim)`, creating
/// the physical table, its HNSW index and the registry row on first use.
pub fn resolve_or_create(
    conn: &Connection,
    embedder: &str,
    model_id: &str,
    dim: usize,
) -> Result<String, StorageError> {
    if let Some(row) = registry_repository::get(conn, embedder, model_id)? {
        if row.dim != dim {
            return Err(StorageError::InvalidInput(format!(
                "model {embedder}:{model_id} already registered with dim={}, requested dim={dim}",
                row.dim
            )));
        }
        return Ok(row.table_name);
    }

    let table_name = build_table_name(embedder, model_id, dim);
    validate_table_name(&table_name)?;
    create_table_and_index(conn, &table_name, dim)?;

    registry_repository::create(conn, embedder, model_id, dim, &table_name)?;

    Ok(table_name)
}

fn create_table_and_index(
    conn: &Connection,
    table_name: &str,
    dim: usize,
) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS {table_name} (
            chunk_id BIGINT NOT NULL REFERENCES chunk(chunk_id),
            vec FLOAT[{dim}] NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT current_timestamp,
            PRIMARY KEY (chunk_id)
        );
        "
    ))?;

    // Needs the vss extension; without it the shard still answers through a
    // full array_cosine_distance scan.
    let index_sql = format!(
        "CREATE INDEX IF NOT EXISTS emb_hnsw_{table_name} ON {table_name} USING HNSW (vec) WITH (metric = 'cosine');"
    );
    match conn.execute_batch(&index_sql) {
        Ok(()) => debug!(table_name, "created hnsw index"),
        Err(e) => warn!(table_name, error = %e, "could not create hnsw index"),
    }

    Ok(())
}
