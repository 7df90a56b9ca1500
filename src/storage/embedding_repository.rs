use duckdb::{Connection, Row, params};

use crate::shards::validate_table_name;
use crate::storage::dtos::EmbeddingRow;
use crate::storage::error::{StorageError, map_constraint_err};

/// DuckDB fixed-size arrays are bound as a bracketed literal string and cast
/// with `?::FLOAT[dim]` in the statement.
pub fn vec_literal(vec: &[f32]) -> String {
    let rendered = vec
        .iter()
        .map(|value| format!("{value}"))
        .collect::<Vec<String>>()
        .join(", ");
    format!("[{rendered}]")
}

fn parse_vec_literal(text: &str) -> Result<Vec<f32>, StorageError> {
    let trimmed = text.trim().trim_start_matches('[').trim_end_matches(']');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    trimmed
        .split(',')
        .map(|value| {
            value.trim().parse::<f32>().map_err(|_| {
                StorageError::InvalidInput(format!("unreadable vector component: {value:?}"))
            })
        })
        .collect()
}

pub fn create(
    conn: &Connection,
    table_name: &str,
    chunk_id: i64,
    vec: &[f32],
) -> Result<EmbeddingRow, StorageError> {
    validate_table_name(table_name)?;
    let dim = vec.len();
    conn.query_row(
        &format!(
            "
            INSERT INTO {table_name} (chunk_id, vec)
            VALUES (?, ?::FLOAT[{dim}])
            RETURNING chunk_id, CAST(vec AS VARCHAR), CAST(created_at AS VARCHAR)
            "
        ),
        params![chunk_id, vec_literal(vec)],
        row_to_parts,
    )
    .map_err(map_constraint_err)
    .and_then(parts_to_dto)
}

/// Insert one vector per chunk id, pairing positionally. Lengths must match
/// and every vector must have the declared dimension.
pub fn bulk_insert(
    conn: &Connection,
    table_name: &str,
    chunk_ids: &[i64],
    vecs: &[Vec<f32>],
    dim: usize,
) -> Result<(), StorageError> {
    validate_table_name(table_name)?;
    if chunk_ids.len() != vecs.len() {
        return Err(StorageError::InvalidInput(format!(
            "{} chunk ids but {} vectors",
            chunk_ids.len(),
            vecs.len()
        )));
    }
    if let Some(bad) = vecs.iter().find(|v| v.len() != dim) {
        return Err(StorageError::InvalidInput(format!(
            "vector has dim={} but the shard expects dim={dim}",
            bad.len()
        )));
    }

    let mut statement = conn.prepare(&format!(
        "
        INSERT INTO {table_name} (chunk_id, vec)
        VALUES (?, ?::FLOAT[{dim}])
        "
    ))?;

    for (chunk_id, vec) in chunk_ids.iter().zip(vecs) {
        statement
            .execute(params![chunk_id, vec_literal(vec)])
            .map_err(map_constraint_err)?;
    }

    Ok(())
}

pub fn get(
    conn: &Connection,
    table_name: &str,
    chunk_id: i64,
) -> Result<Option<EmbeddingRow>, StorageError> {
    validate_table_name(table_name)?;
    let mut statement = conn.prepare(&format!(
        "
        SELECT chunk_id, CAST(vec AS VARCHAR), CAST(created_at AS VARCHAR)
        FROM {table_name}
        WHERE chunk_id = ?
        "
    ))?;

    let mut rows = statement.query(params![chunk_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(parts_to_dto(row_to_parts(row)?)?)),
        None => Ok(None),
    }
}

pub fn delete(conn: &Connection, table_name: &str, chunk_id: i64) -> Result<usize, StorageError> {
    validate_table_name(table_name)?;
    let deleted = conn.execute(
        &format!(
            "
            DELETE FROM {table_name}
            WHERE chunk_id = ?
            "
        ),
        params![chunk_id],
    )?;
    Ok(deleted)
}

/// Remove every shard row whose chunk belongs to the datasource. Runs before
/// the chunk delete because the foreign key points embedding → chunk.
pub fn delete_by_datasource_id(
    conn: &Connection,
    table_name: &str,
    datasource_id: &str,
) -> Result<usize, StorageError> {
    validate_table_name(table_name)?;
    let deleted = conn.execute(
        &format!(
            "
            DELETE FROM {table_name}
            WHERE chunk_id IN (
                SELECT chunk_id FROM chunk WHERE datasource_id = ?
            )
            "
        ),
        params![datasource_id],
    )?;
    Ok(deleted)
}

pub fn list(conn: &Connection, table_name: &str) -> Result<Vec<EmbeddingRow>, StorageError> {
    validate_table_name(table_name)?;
    let mut statement = conn.prepare(&format!(
        "
        SELECT chunk_id, CAST(vec AS VARCHAR), CAST(created_at AS VARCHAR)
        FROM {table_name}
        ORDER BY chunk_id DESC
        "
    ))?;

    let mut rows = statement.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(parts_to_dto(row_to_parts(row)?)?);
    }

    Ok(out)
}

pub fn count(conn: &Connection, table_name: &str) -> Result<i64, StorageError> {
    validate_table_name(table_name)?;
    let count =
        conn.query_row(&format!("SELECT COUNT(*) FROM {table_name}"), [], |row| {
            row.get(0)
        })?;
    Ok(count)
}

fn row_to_parts(row: &Row) -> Result<(i64, String, String), duckdb::Error> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn parts_to_dto(parts: (i64, String, String)) -> Result<EmbeddingRow, StorageError> {
    let (chunk_id, vec_text, created_at) = parts;
    Ok(EmbeddingRow {
        chunk_id,
        vec: parse_vec_literal(&vec_text)?,
        created_at,
    })
}
