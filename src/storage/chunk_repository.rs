use duckdb::{Connection, Row, params};

use crate::storage::dtos::ChunkRow;
use crate::storage::error::{StorageError, map_constraint_err};

const SELECT_COLUMNS: &str = "
          chunk_id,
          full_type,
          datasource_id,
          display_text,
          embeddable_text,
          CAST(created_at AS VARCHAR)";

pub fn create(
    conn: &Connection,
    full_type: &str,
    datasource_id: &str,
    display_text: Option<&str>,
    embeddable_text: &str,
) -> Result<ChunkRow, StorageError> {
    conn.query_row(
        &format!(
            "
            INSERT INTO chunk (full_type, datasource_id, display_text, embeddable_text)
            VALUES (?, ?, ?, ?)
            RETURNING {SELECT_COLUMNS}
            "
        ),
        params![full_type, datasource_id, display_text, embeddable_text],
        row_to_dto,
    )
    .map_err(map_constraint_err)
}

/// Insert chunks in input order and return the new ids in that same order.
pub fn bulk_insert(
    conn: &Connection,
    full_type: &str,
    datasource_id: &str,
    chunk_contents: &[(String, Option<String>)],
) -> Result<Vec<i64>, StorageError> {
    let mut statement = conn.prepare(
        "
        INSERT INTO chunk (full_type, datasource_id, display_text, embeddable_text)
        VALUES (?, ?, ?, ?)
        RETURNING chunk_id
        ",
    )?;

    let mut chunk_ids = Vec::with_capacity(chunk_contents.len());
    for (embeddable_text, display_text) in chunk_contents {
        let chunk_id: i64 = statement
            .query_row(
                params![full_type, datasource_id, display_text, embeddable_text],
                |row| row.get(0),
            )
            .map_err(map_constraint_err)?;
        chunk_ids.push(chunk_id);
    }

    Ok(chunk_ids)
}

pub fn get(conn: &Connection, chunk_id: i64) -> Result<Option<ChunkRow>, StorageError> {
    let mut statement = conn.prepare(&format!(
        "
        SELECT {SELECT_COLUMNS}
        FROM chunk
        WHERE chunk_id = ?
        "
    ))?;

    let mut rows = statement.query(params![chunk_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_dto(row)?)),
        None => Ok(None),
    }
}

pub fn update(
    conn: &Connection,
    chunk_id: i64,
    display_text: Option<&str>,
    embeddable_text: Option<&str>,
) -> Result<Option<ChunkRow>, StorageError> {
    let mut sets = Vec::new();
    let mut bindings = Vec::new();

    if let Some(display_text) = display_text {
        sets.push("display_text = ?");
        bindings.push(display_text.to_string());
    }
    if let Some(embeddable_text) = embeddable_text {
        sets.push("embeddable_text = ?");
        bindings.push(embeddable_text.to_string());
    }

    if sets.is_empty() {
        return get(conn, chunk_id);
    }

    bindings.push(chunk_id.to_string());
    conn.execute(
        &format!(
            "
            UPDATE chunk
            SET {}
            WHERE chunk_id = CAST(? AS BIGINT)
            ",
            sets.join(", ")
        ),
        duckdb::params_from_iter(bindings),
    )?;

    get(conn, chunk_id)
}

pub fn delete(conn: &Connection, chunk_id: i64) -> Result<usize, StorageError> {
    let deleted = conn.execute(
        "
        DELETE FROM chunk
        WHERE chunk_id = ?
        ",
        params![chunk_id],
    )?;
    Ok(deleted)
}

pub fn delete_by_datasource_id(
    conn: &Connection,
    datasource_id: &str,
) -> Result<usize, StorageError> {
    let deleted = conn.execute(
        "
        DELETE FROM chunk
        WHERE datasource_id = ?
        ",
        params![datasource_id],
    )?;
    Ok(deleted)
}

pub fn list(conn: &Connection) -> Result<Vec<ChunkRow>, StorageError> {
    let mut statement = conn.prepare(&format!(
        "
        SELECT {SELECT_COLUMNS}
        FROM chunk
        ORDER BY chunk_id DESC
        "
    ))?;

    let mut rows = statement.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row_to_dto(row)?);
    }

    Ok(out)
}

fn row_to_dto(row: &Row) -> Result<ChunkRow, duckdb::Error> {
    Ok(ChunkRow {
        chunk_id: row.get(0)?,
        full_type: row.get(1)?,
        datasource_id: row.get(2)?,
        display_text: row.get(3)?,
        embeddable_text: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::open_in_memory;

    #[test]
    fn bulk_insert_returns_ids_in_input_order() {
        let conn = open_in_memory().unwrap();

        let contents = vec![
            ("alpha".to_string(), None),
            ("beta".to_string(), Some("Beta display".to_string())),
            ("gamma".to_string(), None),
        ];
        let ids = bulk_insert(&conn, "files/md", "files/a.md", &contents).unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids[0] < ids[1] && ids[1] < ids[2]);

        let second = get(&conn, ids[1]).unwrap().unwrap();
        assert_eq!(second.embeddable_text, "beta");
        assert_eq!(second.display_text.as_deref(), Some("Beta display"));
        assert_eq!(second.full_type, "files/md");
        assert!(!second.created_at.is_empty());
    }

    #[test]
    fn delete_by_datasource_id_only_touches_that_source() {
        let conn = open_in_memory().unwrap();

        create(&conn, "files/md", "files/a.md", None, "from a").unwrap();
        create(&conn, "files/md", "files/b.md", None, "from b").unwrap();

        assert_eq!(delete_by_datasource_id(&conn, "files/a.md").unwrap(), 1);

        let remaining = list(&conn).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].datasource_id, "files/b.md");
    }

    #[test]
    fn get_missing_chunk_returns_none() {
        let conn = open_in_memory().unwrap();
        assert!(get(&conn, 7).unwrap().is_none());
        assert_eq!(delete(&conn, 7).unwrap(), 0);
    }

    #[test]
    fn update_changes_only_requested_fields() {
        let conn = open_in_memory().unwrap();
        let chunk = create(&conn, "files/md", "files/a.md", Some("shown"), "embed me").unwrap();

        let updated = update(&conn, chunk.chunk_id, Some("shown differently"), None)
            .unwrap()
            .unwrap();
        assert_eq!(updated.display_text.as_deref(), Some("shown differently"));
        assert_eq!(updated.embeddable_text, "embed me");

        // No fields is a no-op that returns the current row.
        let unchanged = update(&conn, chunk.chunk_id, None, None).unwrap().unwrap();
        assert_eq!(unchanged.display_text.as_deref(), Some("shown differently"));

        assert!(update(&conn, 999, Some("x"), None).unwrap().is_none());
    }
}
