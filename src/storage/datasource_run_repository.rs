use duckdb::{Connection, Row, params};

use crate::storage::dtos::DatasourceRunRow;
use crate::storage::error::{StorageError, map_constraint_err};

const SELECT_COLUMNS: &str = "
          datasource_run_id,
          run_id,
          plugin,
          full_type,
          source_id,
          storage_directory,
          CAST(created_at AS VARCHAR)";

pub fn create(
    conn: &Connection,
    run_id: i64,
    plugin: &str,
    full_type: &str,
    source_id: &str,
    storage_directory: &str,
) -> Result<DatasourceRunRow, StorageError> {
    conn.query_row(
        &format!(
            "
            INSERT INTO datasource_run (run_id, plugin, full_type, source_id, storage_directory)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {SELECT_COLUMNS}
            "
        ),
        params![run_id, plugin, full_type, source_id, storage_directory],
        row_to_dto,
    )
    .map_err(map_constraint_err)
}

pub fn get(
    conn: &Connection,
    datasource_run_id: i64,
) -> Result<Option<DatasourceRunRow>, StorageError> {
    let mut statement = conn.prepare(&format!(
        "
        SELECT {SELECT_COLUMNS}
        FROM datasource_run
        WHERE datasource_run_id = ?
        "
    ))?;

    let mut rows = statement.query(params![datasource_run_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_dto(row)?)),
        None => Ok(None),
    }
}

pub fn delete(conn: &Connection, datasource_run_id: i64) -> Result<usize, StorageError> {
    let deleted = conn.execute(
        "
        DELETE FROM datasource_run
        WHERE datasource_run_id = ?
        ",
        params![datasource_run_id],
    )?;
    Ok(deleted)
}

pub fn list(conn: &Connection) -> Result<Vec<DatasourceRunRow>, StorageError> {
    let mut statement = conn.prepare(&format!(
        "
        SELECT {SELECT_COLUMNS}
        FROM datasource_run
        ORDER BY datasource_run_id DESC
        "
    ))?;

    let mut rows = statement.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row_to_dto(row)?);
    }

    Ok(out)
}

fn row_to_dto(row: &Row) -> Result<DatasourceRunRow, duckdb::Error> {
    Ok(DatasourceRunRow {
        datasource_run_id: row.get(0)?,
        run_id: row.get(1)?,
        plugin: row.get(2)?,
        full_type: row.get(3)?,
        source_id: row.get(4)?,
        storage_directory: row.get(5)?,
        created_at: row.get(6)?,
    })
}
