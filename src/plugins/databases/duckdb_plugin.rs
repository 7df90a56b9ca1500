use duckdb::Connection;
use serde_yaml::Value;

use crate::pluginlib::{
    BuildDatasourcePlugin, BuildPlugin, DatasourceType, EmbeddableChunk, PluginError,
    SqlExecutionResult, parse_config, parse_context, to_context_value,
};
use crate::plugins::databases::{
    DatabaseConfigFile, DatabaseIntrospectionResult, build_database_chunks,
    introspect_with_connection, map_db_err, run_sql_on_connection,
};
use crate::sqlguard::ensure_read_only;

/// Introspects DuckDB database files.
pub struct DuckDbPlugin;

impl DuckDbPlugin {
    fn connect(config: &DatabaseConfigFile) -> Result<Connection, PluginError> {
        Connection::open(&config.connection.database).map_err(map_db_err)
    }

    fn parse_and_validate(config: &Value) -> Result<DatabaseConfigFile, PluginError> {
        let parsed: DatabaseConfigFile = parse_config(config)?;
        parsed.validate()?;
        Ok(parsed)
    }
}

impl BuildPlugin for DuckDbPlugin {
    fn id(&self) -> &'static str {
        "dce/duckdb"
    }

    fn name(&self) -> &'static str {
        "DuckDB Plugin"
    }

    fn supported_types(&self) -> Vec<DatasourceType> {
        vec![DatasourceType::new("duckdb")]
    }

    fn divide_context_into_chunks(
        &self,
        context: &Value,
    ) -> Result<Vec<EmbeddableChunk>, PluginError> {
        let result: DatabaseIntrospectionResult = parse_context(context)?;
        build_database_chunks(&result)
    }
}

impl BuildDatasourcePlugin for DuckDbPlugin {
    fn build_context(
        &self,
        _full_type: &str,
        _datasource_name: &str,
        config: &Value,
    ) -> Result<Value, PluginError> {
        let config = Self::parse_and_validate(config)?;
        let conn = Self::connect(&config)?;
        let result = introspect_with_connection(&conn, &config)?;
        to_context_value(&result)
    }

    fn check_connection(
        &self,
        _full_type: &str,
        _datasource_name: &str,
        config: &Value,
    ) -> Result<(), PluginError> {
        let config = Self::parse_and_validate(config)?;
        let conn = Self::connect(&config)?;
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(map_db_err)
    }

    fn run_sql(
        &self,
        config: &Value,
        sql: &str,
        params: Option<&[String]>,
        read_only: bool,
    ) -> Result<SqlExecutionResult, PluginError> {
        if read_only {
            ensure_read_only(sql)?;
        }
        let config = Self::parse_and_validate(config)?;
        let conn = Self::connect(&config)?;
        run_sql_on_connection(&conn, sql, params)
    }
}
