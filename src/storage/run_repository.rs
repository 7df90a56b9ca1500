use chrono::{DateTime, Utc};
use duckdb::{Connection, Row, params};

use crate::storage::dtos::RunRow;
use crate::storage::error::{StorageError, map_constraint_err};
use crate::util::iso_seconds_string;

const RUN_NAME_PREFIX: &str = "run-";

pub fn build_run_name(started_at: DateTime<Utc>) -> String {
    format!("{RUN_NAME_PREFIX}{}", iso_seconds_string(started_at))
}

const SELECT_COLUMNS: &str = "
          run_id,
          run_name,
          CAST(project_id AS VARCHAR),
          CAST(started_at AS VARCHAR),
          CAST(ended_at AS VARCHAR),
          dce_version";

pub fn create(
    conn: &Connection,
    project_id: &str,
    dce_version: Option<&str>,
    started_at: DateTime<Utc>,
) -> Result<RunRow, StorageError> {
    let run_name = build_run_name(started_at);

    if get_by_run_name(conn, project_id, &run_name)?.is_some() {
        return Err(StorageError::InvalidInput(format!(
            "a run named {run_name} already exists for this project"
        )));
    }

    let started = started_at.format("%Y-%m-%d %H:%M:%S").to_string();
    conn.query_row(
        &format!(
            "
            INSERT INTO run (run_name, project_id, started_at, dce_version)
            VALUES (?, ?::UUID, ?::TIMESTAMP, ?)
            RETURNING {SELECT_COLUMNS}
            "
        ),
        params![run_name, project_id, started, dce_version],
        row_to_dto,
    )
    .map_err(map_constraint_err)
}

pub fn get(conn: &Connection, run_id: i64) -> Result<Option<RunRow>, StorageError> {
    let mut statement = conn.prepare(&format!(
        "
        SELECT {SELECT_COLUMNS}
        FROM run
        WHERE run_id = ?
        "
    ))?;

    let mut rows = statement.query(params![run_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_dto(row)?)),
        None => Ok(None),
    }
}

pub fn get_by_run_name(
    conn: &Connection,
    project_id: &str,
    run_name: &str,
) -> Result<Option<RunRow>, StorageError> {
    let mut statement = conn.prepare(&format!(
        "
        SELECT {SELECT_COLUMNS}
        FROM run
        WHERE CAST(project_id AS VARCHAR) = ? AND run_name = ?
        "
    ))?;

    let mut rows = statement.query(params![project_id, run_name])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_dto(row)?)),
        None => Ok(None),
    }
}

pub fn get_latest_for_project(
    conn: &Connection,
    project_id: &str,
) -> Result<Option<RunRow>, StorageError> {
    let mut statement = conn.prepare(&format!(
        "
        SELECT {SELECT_COLUMNS}
        FROM run
        WHERE CAST(project_id AS VARCHAR) = ?
        ORDER BY started_at DESC
        LIMIT 1
        "
    ))?;

    let mut rows = statement.query(params![project_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_dto(row)?)),
        None => Ok(None),
    }
}

pub fn set_ended_at(
    conn: &Connection,
    run_id: i64,
    ended_at: DateTime<Utc>,
) -> Result<Option<RunRow>, StorageError> {
    let ended = ended_at.format("%Y-%m-%d %H:%M:%S").to_string();
    conn.execute(
        "
        UPDATE run
        SET ended_at = ?::TIMESTAMP
        WHERE run_id = ?
        ",
        params![ended, run_id],
    )?;

    get(conn, run_id)
}

pub fn delete(conn: &Connection, run_id: i64) -> Result<usize, StorageError> {
    let deleted = conn.execute(
        "
        DELETE FROM run
        WHERE run_id = ?
        ",
        params![run_id],
    )?;
    Ok(deleted)
}

pub fn list(conn: &Connection) -> Result<Vec<RunRow>, StorageError> {
    let mut statement = conn.prepare(&format!(
        "
        SELECT {SELECT_COLUMNS}
        FROM run
        ORDER BY run_id DESC
        "
    ))?;

    let mut rows = statement.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row_to_dto(row)?);
    }

    Ok(out)
}

fn row_to_dto(row: &Row) -> Result<RunRow, duckdb::Error> {
    Ok(RunRow {
        run_id: row.get(0)?,
        run_name: row.get(1)?,
        project_id: row.get(2)?,
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
        dce_version: row.get(5)?,
    })
}
