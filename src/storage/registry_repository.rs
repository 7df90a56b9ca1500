use duckdb::{Connection, Row, params};

use crate::shards::validate_table_name;
use crate::storage::dtos::EmbeddingModelRegistryRow;
use crate::storage::error::{StorageError, map_constraint_err};

const SELECT_COLUMNS: &str = "
          embedder,
          model_id,
          CAST(dim AS BIGINT),
          table_name,
          CAST(created_at AS VARCHAR)";

pub fn create(
    conn: &Connection,
    embedder: &str,
    model_id: &str,
    dim: usize,
    table_name: &str,
) -> Result<EmbeddingModelRegistryRow, StorageError> {
    validate_table_name(table_name)?;
    conn.query_row(
        &format!(
            "
            INSERT INTO embedding_model_registry (embedder, model_id, dim, table_name)
            VALUES (?, ?, ?, ?)
            RETURNING {SELECT_COLUMNS}
            "
        ),
        params![embedder, model_id, dim as i64, table_name],
        row_to_dto,
    )
    .map_err(map_constraint_err)
}

pub fn get(
    conn: &Connection,
    embedder: &str,
    model_id: &str,
) -> Result<Option<EmbeddingModelRegistryRow>, StorageError> {
    let mut statement = conn.prepare(&format!(
        "
        SELECT {SELECT_COLUMNS}
        FROM embedding_model_registry
        WHERE embedder = ? AND model_id = ?
        "
    ))?;

    let mut rows = statement.query(params![embedder, model_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_dto(row)?)),
        None => Ok(None),
    }
}

pub fn delete(conn: &Connection, embedder: &str, model_id: &str) -> Result<usize, StorageError> {
    let deleted = conn.execute(
        "
        DELETE FROM embedding_model_registry
        WHERE embedder = ? AND model_id = ?
        ",
        params![embedder, model_id],
    )?;
    Ok(deleted)
}

pub fn list(conn: &Connection) -> Result<Vec<EmbeddingModelRegistryRow>, StorageError> {
    let mut statement = conn.prepare(&format!(
        "
        SELECT {SELECT_COLUMNS}
        FROM embedding_model_registry
        ORDER BY embedder ASC, model_id ASC
        "
    ))?;

    let mut rows = statement.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row_to_dto(row)?);
    }

    Ok(out)
}

fn row_to_dto(row: &Row) -> Result<EmbeddingModelRegistryRow, duckdb::Error> {
    Ok(EmbeddingModelRegistryRow {
        embedder: row.get(0)?,
        model_id: row.get(1)?,
        dim: row.get::<_, i64>(2)? as usize,
        table_name: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::open_in_memory;

    #[test]
    fn create_enforces_table_name_policy() {
        let conn = open_in_memory().unwrap();

        let err = create(&conn, "ollama", "m", 768, "chunk; DROP TABLE chunk").unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[test]
    fn duplicate_model_key_is_an_integrity_error() {
        let conn = open_in_memory().unwrap();

        create(&conn, "ollama", "nomic-embed-text:v1.5", 768, "embedding_ollama__m__768").unwrap();
        let err = create(
            &conn,
            "ollama",
            "nomic-embed-text:v1.5",
            768,
            "embedding_ollama__other__768",
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Integrity(_)));
    }

    #[test]
    fn get_returns_registered_row() {
        let conn = open_in_memory().unwrap();

        create(&conn, "ollama", "m:v1", 512, "embedding_ollama__m_v1__512").unwrap();
        let row = get(&conn, "ollama", "m:v1").unwrap().unwrap();
        assert_eq!(row.embedder, "ollama");
        assert_eq!(row.model_id, "m:v1");
        assert_eq!(row.dim, 512);
        assert_eq!(row.table_name, "embedding_ollama__m_v1__512");
        assert!(!row.created_at.is_empty());

        assert!(get(&conn, "ollama", "missing").unwrap().is_none());
        assert_eq!(list(&conn).unwrap().len(), 1);
        assert_eq!(delete(&conn, "ollama", "m:v1").unwrap(), 1);
        assert_eq!(delete(&conn, "ollama", "m:v1").unwrap(), 0);
    }
}
