use duckdb::{Connection, params};
use tracing::{debug, info};

use crate::storage::error::StorageError;
use crate::util::sha256_hex;

pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub fn builtin_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        name: "V01__init.sql",
        sql: include_str!("migrations/V01__init.sql"),
    }]
}

struct AppliedMigration {
    version: u32,
    checksum: String,
}

/// Apply all pending migrations. Each migration runs in its own transaction
/// together with its history row; the first failure aborts the whole pass.
pub fn migrate(conn: &mut Connection, migrations: &[Migration]) -> Result<(), StorageError> {
    ensure_history_table(conn)?;
    let applied = load_applied(conn)?;

    for migration in migrations {
        let checksum = sha256_hex(migration.sql.as_bytes());

        if applied.iter().any(|a| a.checksum == checksum) {
            debug!(name = migration.name, "migration already applied");
            continue;
        }

        if applied.iter().any(|a| a.version == migration.version) {
            return Err(StorageError::Migration(format!(
                "version {} ({}) was already applied with a different checksum",
                migration.version, migration.name
            )));
        }

        apply_one(conn, migration, &checksum).map_err(|e| {
            StorageError::Migration(format!("{} failed: {e}", migration.name))
        })?;
        info!(name = migration.name, "applied migration");
    }

    Ok(())
}

fn ensure_history_table(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        CREATE SEQUENCE IF NOT EXISTS migration_history_id_seq START 1;
        CREATE TABLE IF NOT EXISTS migration_history (
            id BIGINT PRIMARY KEY DEFAULT nextval('migration_history_id_seq'),
            name VARCHAR NOT NULL,
            version INTEGER NOT NULL,
            checksum VARCHAR NOT NULL,
            applied_at TIMESTAMP NOT NULL DEFAULT current_timestamp
        );
        ",
    )?;
    Ok(())
}

fn load_applied(conn: &Connection) -> Result<Vec<AppliedMigration>, StorageError> {
    let mut statement = conn.prepare(
        "
        SELECT
          CAST(version AS BIGINT),
          checksum
        FROM migration_history
        ORDER BY id ASC
        ",
    )?;

    let mut rows = statement.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(AppliedMigration {
            version: row.get::<_, i64>(0)? as u32,
            checksum: row.get(1)?,
        });
    }

    Ok(out)
}

fn apply_one(
    conn: &mut Connection,
    migration: &Migration,
    checksum: &str,
) -> Result<(), duckdb::Error> {
    let tx = conn.transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "
        INSERT INTO migration_history (name, version, checksum)
        VALUES (?, ?, ?)
        ",
        params![migration.name, migration.version as i64, checksum],
    )?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_creates_schema_and_history() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn, &builtin_migrations()).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM duckdb_tables() WHERE table_name IN ('run', 'datasource_run', 'chunk', 'embedding_model_registry')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);

        let history: i64 = conn
            .query_row("SELECT COUNT(*) FROM migration_history", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(history, 1);
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn, &builtin_migrations()).unwrap();
        migrate(&mut conn, &builtin_migrations()).unwrap();

        let history: i64 = conn
            .query_row("SELECT COUNT(*) FROM migration_history", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(history, 1);
    }

    #[test]
    fn changed_checksum_for_applied_version_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn, &builtin_migrations()).unwrap();

        let tampered = [Migration {
            version: 1,
            name: "V01__init.sql",
            sql: "CREATE TABLE tampered (x INTEGER);",
        }];
        let err = migrate(&mut conn, &tampered).unwrap_err();
        assert!(matches!(err, StorageError::Migration(_)));
    }

    #[test]
    fn failing_migration_rolls_back() {
        let mut conn = Connection::open_in_memory().unwrap();
        let broken = [Migration {
            version: 1,
            name: "V01__broken.sql",
            sql: "CREATE TABLE half_done (x INTEGER); SELECT * FROM does_not_exist;",
        }];

        assert!(migrate(&mut conn, &broken).is_err());

        let half_done: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM duckdb_tables() WHERE table_name = 'half_done'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(half_done, 0);

        let history: i64 = conn
            .query_row("SELECT COUNT(*) FROM migration_history", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(history, 0);
    }
}
