use std::collections::BTreeMap;

use duckdb::Connection;
use duckdb::types::ValueRef;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pluginlib::{EmbeddableChunk, PluginError, SqlExecutionResult, to_context_value};
use crate::plugins::databases::sampling::{SamplingConfig, SamplingScopeMatcher};
use crate::plugins::databases::scope::{IntrospectionScope, IntrospectionScopeMatcher};

pub mod attached;
pub mod duckdb_plugin;
pub mod sampling;
pub mod scope;

const IGNORED_CATALOGS: &[&str] = &["system", "temp"];
const IGNORED_SCHEMAS: &[&str] = &["information_schema", "pg_catalog"];
const SAMPLE_ROW_LIMIT: usize = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    pub database: String,
}

/// Shared config shape for database datasources.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfigFile {
    #[serde(default)]
    pub name: Option<String>,
    pub r#type: String,
    pub connection: ConnectionConfig,
    #[serde(default, rename = "introspection-scope")]
    pub introspection_scope: Option<IntrospectionScope>,
    #[serde(default)]
    pub sampling: Option<SamplingConfig>,
}

impl DatabaseConfigFile {
    pub fn validate(&self) -> Result<(), PluginError> {
        if let Some(scope) = &self.introspection_scope {
            scope.validate().map_err(PluginError::InvalidConfig)?;
        }
        if let Some(sampling) = &self.sampling {
            sampling.validate().map_err(PluginError::InvalidConfig)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseColumn {
    pub name: String,
    pub r#type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseTable {
    pub name: String,
    pub columns: Vec<DatabaseColumn>,
    #[serde(default)]
    pub samples: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub name: String,
    pub tables: Vec<DatabaseTable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseCatalog {
    pub name: String,
    pub schemas: Vec<DatabaseSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseIntrospectionResult {
    pub catalogs: Vec<DatabaseCatalog>,
}

/// Walk the catalog → schema → table tree of whatever is reachable through
/// the given connection, honouring introspection and sampling scopes.
pub fn introspect_with_connection(
    conn: &Connection,
    config: &DatabaseConfigFile,
) -> Result<DatabaseIntrospectionResult, PluginError> {
    let catalogs = list_catalogs(conn)?;
    let schemas_per_catalog = list_schemas(conn, &catalogs)?;

    let matcher =
        IntrospectionScopeMatcher::new(config.introspection_scope.clone(), IGNORED_SCHEMAS);
    let selection = matcher.filter_scopes(&catalogs, &schemas_per_catalog);
    let sampler = SamplingScopeMatcher::new(config.sampling.clone());

    let mut introspected = Vec::new();
    for catalog in &selection.catalogs {
        let mut schemas = Vec::new();
        for schema in selection
            .schemas_per_catalog
            .get(catalog)
            .unwrap_or(&Vec::new())
        {
            let columns_per_table = collect_columns(conn, catalog, schema)?;
            let mut tables = Vec::new();
            for (table, columns) in columns_per_table {
                let samples = if sampler.should_sample(catalog, schema, &table) {
                    sample_table(conn, catalog, schema, &table, &columns)?
                } else {
                    Vec::new()
                };
                tables.push(DatabaseTable {
                    name: table,
                    columns,
                    samples,
                });
            }
            schemas.push(DatabaseSchema {
                name: schema.clone(),
                tables,
            });
        }
        introspected.push(DatabaseCatalog {
            name: catalog.clone(),
            schemas,
        });
    }

    Ok(DatabaseIntrospectionResult {
        catalogs: introspected,
    })
}

fn list_catalogs(conn: &Connection) -> Result<Vec<String>, PluginError> {
    let mut statement = conn
        .prepare("SELECT database_name FROM duckdb_databases()")
        .map_err(map_db_err)?;
    let mut rows = statement.query([]).map_err(map_db_err)?;

    let mut catalogs = Vec::new();
    while let Some(row) = rows.next().map_err(map_db_err)? {
        let name: String = row.get(0).map_err(map_db_err)?;
        if !IGNORED_CATALOGS.contains(&name.to_lowercase().as_str()) {
            catalogs.push(name);
        }
    }

    Ok(catalogs)
}

fn list_schemas(
    conn: &Connection,
    catalogs: &[String],
) -> Result<BTreeMap<String, Vec<String>>, PluginError> {
    let mut statement = conn
        .prepare(
            "
            SELECT catalog_name, schema_name
            FROM information_schema.schemata
            ORDER BY catalog_name, schema_name
            ",
        )
        .map_err(map_db_err)?;
    let mut rows = statement.query([]).map_err(map_db_err)?;

    let mut schemas_per_catalog: BTreeMap<String, Vec<String>> = BTreeMap::new();
    while let Some(row) = rows.next().map_err(map_db_err)? {
        let catalog: String = row.get(0).map_err(map_db_err)?;
        let schema: String = row.get(1).map_err(map_db_err)?;
        if catalogs.contains(&catalog) {
            schemas_per_catalog.entry(catalog).or_default().push(schema);
        }
    }

    Ok(schemas_per_catalog)
}

fn collect_columns(
    conn: &Connection,
    catalog: &str,
    schema: &str,
) -> Result<BTreeMap<String, Vec<DatabaseColumn>>, PluginError> {
    let mut statement = conn
        .prepare(
            "
            SELECT table_name, column_name, data_type, is_nullable
            FROM information_schema.columns
            WHERE table_catalog = ? AND table_schema = ?
            ORDER BY table_name, ordinal_position
            ",
        )
        .map_err(map_db_err)?;
    let mut rows = statement
        .query(duckdb::params![catalog, schema])
        .map_err(map_db_err)?;

    let mut tables: BTreeMap<String, Vec<DatabaseColumn>> = BTreeMap::new();
    while let Some(row) = rows.next().map_err(map_db_err)? {
        let table: String = row.get(0).map_err(map_db_err)?;
        let nullable: String = row.get(3).map_err(map_db_err)?;
        tables.entry(table).or_default().push(DatabaseColumn {
            name: row.get(1).map_err(map_db_err)?,
            r#type: row.get(2).map_err(map_db_err)?,
            nullable: nullable.eq_ignore_ascii_case("yes"),
        });
    }

    Ok(tables)
}

fn sample_table(
    conn: &Connection,
    catalog: &str,
    schema: &str,
    table: &str,
    columns: &[DatabaseColumn],
) -> Result<Vec<BTreeMap<String, String>>, PluginError> {
    let qualified = format!(
        "{}.{}.{}",
        quote_ident(catalog),
        quote_ident(schema),
        quote_ident(table)
    );

    debug!(table = %qualified, "sampling table");
    let mut statement = conn
        .prepare(&format!("SELECT * FROM {qualified} LIMIT {SAMPLE_ROW_LIMIT}"))
        .map_err(map_db_err)?;
    let mut rows = statement.query([]).map_err(map_db_err)?;

    let mut samples = Vec::new();
    while let Some(row) = rows.next().map_err(map_db_err)? {
        let mut sample = BTreeMap::new();
        for (index, column) in columns.iter().enumerate() {
            let value = row.get_ref(index).map_err(map_db_err)?;
            sample.insert(column.name.clone(), value_to_string(value));
        }
        samples.push(sample);
    }

    Ok(samples)
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub(crate) fn map_db_err(e: duckdb::Error) -> PluginError {
    PluginError::Execution(e.to_string())
}

pub(crate) fn value_to_string(value: ValueRef) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Boolean(v) => v.to_string(),
        ValueRef::TinyInt(v) => v.to_string(),
        ValueRef::SmallInt(v) => v.to_string(),
        ValueRef::Int(v) => v.to_string(),
        ValueRef::BigInt(v) => v.to_string(),
        ValueRef::Float(v) => v.to_string(),
        ValueRef::Double(v) => v.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<{} bytes>", bytes.len()),
        other => format!("{other:?}"),
    }
}

/// Execute already-gated SQL, binding any positional parameters to its `?`
/// placeholders, and stringify the result set.
pub fn run_sql_on_connection(
    conn: &Connection,
    sql: &str,
    params: Option<&[String]>,
) -> Result<SqlExecutionResult, PluginError> {
    let mut statement = conn.prepare(sql).map_err(map_db_err)?;
    let mut rows = match params {
        Some(values) if !values.is_empty() => statement
            .query(duckdb::params_from_iter(values))
            .map_err(map_db_err)?,
        _ => statement.query([]).map_err(map_db_err)?,
    };

    let columns = rows
        .as_ref()
        .map(|s| {
            s.column_names()
                .iter()
                .map(|name| name.to_string())
                .collect::<Vec<String>>()
        })
        .unwrap_or_default();

    let mut out_rows = Vec::new();
    while let Some(row) = rows.next().map_err(map_db_err)? {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(value_to_string(row.get_ref(index).map_err(map_db_err)?));
        }
        out_rows.push(values);
    }

    Ok(SqlExecutionResult {
        columns,
        rows: out_rows,
    })
}

/// One chunk per table plus one per column.
pub fn build_database_chunks(
    result: &DatabaseIntrospectionResult,
) -> Result<Vec<EmbeddableChunk>, PluginError> {
    let mut chunks = Vec::new();

    for catalog in &result.catalogs {
        for schema in &catalog.schemas {
            for table in &schema.tables {
                let column_names = table
                    .columns
                    .iter()
                    .map(|c| c.name.clone())
                    .collect::<Vec<String>>()
                    .join(", ");
                chunks.push(EmbeddableChunk {
                    embeddable_text: format!(
                        "Table {} in catalog {} and schema {}, with columns: {column_names}",
                        table.name, catalog.name, schema.name
                    ),
                    content: to_context_value(&TableChunkContent {
                        catalog_name: catalog.name.clone(),
                        schema_name: schema.name.clone(),
                        table: table.clone(),
                    })?,
                });

                for column in &table.columns {
                    chunks.push(EmbeddableChunk {
                        embeddable_text: format!(
                            "Column {} of type {} in table {}.{}.{}",
                            column.name, column.r#type, catalog.name, schema.name, table.name
                        ),
                        content: to_context_value(&ColumnChunkContent {
                            catalog_name: catalog.name.clone(),
                            schema_name: schema.name.clone(),
                            table_name: table.name.clone(),
                            column: column.clone(),
                        })?,
                    });
                }
            }
        }
    }

    Ok(chunks)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableChunkContent {
    pub catalog_name: String,
    pub schema_name: String,
    pub table: DatabaseTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnChunkContent {
    pub catalog_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub column: DatabaseColumn,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "
            CREATE SCHEMA app;
            CREATE TABLE app.users (id BIGINT NOT NULL, name VARCHAR);
            INSERT INTO app.users VALUES (1, 'ada'), (2, 'grace');
            CREATE TABLE app.orders (order_id BIGINT, total DOUBLE);
            ",
        )
        .unwrap();
        conn
    }

    fn config(yaml: &str) -> DatabaseConfigFile {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn introspection_yields_catalog_schema_table_tree() {
        let conn = seeded_connection();
        let config = config("type: duckdb\nconnection:\n  database: ':memory:'\n");

        let result = introspect_with_connection(&conn, &config).unwrap();
        let catalog = result
            .catalogs
            .iter()
            .find(|c| c.name == "memory")
            .expect("memory catalog");
        let app = catalog
            .schemas
            .iter()
            .find(|s| s.name == "app")
            .expect("app schema");
        assert_eq!(app.tables.len(), 2);

        let users = app.tables.iter().find(|t| t.name == "users").unwrap();
        assert_eq!(users.columns.len(), 2);
        assert!(!users.columns[0].nullable);
        assert_eq!(users.samples.len(), 2);
        assert_eq!(users.samples[0]["name"], "ada");
    }

    #[test]
    fn sampling_can_be_disabled() {
        let conn = seeded_connection();
        let config = config(
            "type: duckdb\nconnection:\n  database: ':memory:'\nsampling:\n  enabled: false\n",
        );

        let result = introspect_with_connection(&conn, &config).unwrap();
        for catalog in &result.catalogs {
            for schema in &catalog.schemas {
                for table in &schema.tables {
                    assert!(table.samples.is_empty());
                }
            }
        }
    }

    #[test]
    fn scope_exclude_drops_schemas() {
        let conn = seeded_connection();
        let config = config(
            "type: duckdb\nconnection:\n  database: ':memory:'\nintrospection-scope:\n  exclude:\n    - schemas: ['app']\n",
        );

        let result = introspect_with_connection(&conn, &config).unwrap();
        for catalog in &result.catalogs {
            assert!(catalog.schemas.iter().all(|s| s.name != "app"));
        }
    }

    #[test]
    fn chunker_emits_table_and_column_chunks() {
        let result = DatabaseIntrospectionResult {
            catalogs: vec![DatabaseCatalog {
                name: "memory".to_string(),
                schemas: vec![DatabaseSchema {
                    name: "app".to_string(),
                    tables: vec![DatabaseTable {
                        name: "users".to_string(),
                        columns: vec![
                            DatabaseColumn {
                                name: "id".to_string(),
                                r#type: "BIGINT".to_string(),
                                nullable: false,
                            },
                            DatabaseColumn {
                                name: "name".to_string(),
                                r#type: "VARCHAR".to_string(),
                                nullable: true,
                            },
                        ],
                        samples: Vec::new(),
                    }],
                }],
            }],
        };

        let chunks = build_database_chunks(&result).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].embeddable_text.contains("Table users"));
        assert!(chunks[1].embeddable_text.contains("Column id"));
    }

    #[test]
    fn run_sql_returns_columns_and_stringified_rows() {
        let conn = seeded_connection();

        let result =
            run_sql_on_connection(&conn, "SELECT id, name FROM app.users ORDER BY id", None)
                .unwrap();
        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0], vec!["1", "ada"]);
    }

    #[test]
    fn run_sql_binds_positional_parameters() {
        let conn = seeded_connection();

        let params = vec!["grace".to_string()];
        let result = run_sql_on_connection(
            &conn,
            "SELECT id FROM app.users WHERE name = ?",
            Some(params.as_slice()),
        )
        .unwrap();
        assert_eq!(result.rows, vec![vec!["2".to_string()]]);
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let err = serde_yaml::from_str::<DatabaseConfigFile>(
            "type: duckdb\nconnection:\n  database: x\nbogus: true\n",
        );
        assert!(err.is_err());
    }
}
