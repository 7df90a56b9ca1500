use std::path::Path;

use duckdb::Connection;
use tracing::{debug, warn};

pub mod chunk_repository;
pub mod chunk_search_repository;
pub mod datasource_run_repository;
pub mod dtos;
pub mod error;
pub mod migrations;
pub mod registry_repository;
pub mod run_repository;

pub mod embedding_repository;

pub use error::StorageError;

/// Open the embedded database, load the search extensions and run pending
/// migrations. The connection is not shared across threads.
pub fn open_database(db_path: &Path) -> Result<Connection, StorageError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::InvalidInput(format!(
                "failed to create database directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let mut conn = Connection::open(db_path)?;
    debug!(path = %db_path.display(), "connected to database");

    load_search_extensions(&conn);
    migrations::migrate(&mut conn, &migrations::builtin_migrations())?;

    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, StorageError> {
    let mut conn = Connection::open_in_memory()?;
    load_search_extensions(&conn);
    migrations::migrate(&mut conn, &migrations::builtin_migrations())?;
    Ok(conn)
}

/// Best-effort load of the full-text and vector-search extensions. Cosine
/// distance is a core function, so an offline host still retrieves; only the
/// HNSW index acceleration is lost.
fn load_search_extensions(conn: &Connection) {
    for extension in ["fts", "vss"] {
        if let Err(e) = conn.execute_batch(&format!("INSTALL {extension}; LOAD {extension};")) {
            warn!(extension, error = %e, "could not load search extension");
        }
    }

    if let Err(e) = conn.execute_batch("SET hnsw_enable_experimental_persistence = true;") {
        debug!(error = %e, "hnsw persistence flag not available");
    }
}

/// Run `f` inside a transaction. Commits on success, rolls back when `f`
/// returns an error. Nested use is not supported.
pub fn with_transaction<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Connection) -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}
