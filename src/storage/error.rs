use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("constraint violation: {0}")]
    Integrity(String),
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Database(#[from] duckdb::Error),
}

/// Constraint violations become [`StorageError::Integrity`]; everything else
/// passes through as a database error.
pub(crate) fn map_constraint_err(e: duckdb::Error) -> StorageError {
    if let duckdb::Error::DuckDBFailure(_, Some(ref message)) = e {
        if message.contains("Constraint") {
            return StorageError::Integrity(message.clone());
        }
    }
    StorageError::Database(e)
}
