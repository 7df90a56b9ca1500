use duckdb::Connection;
use serde_yaml::Value;
use tracing::debug;

use crate::pluginlib::{
    BuildDatasourcePlugin, BuildPlugin, DatasourceType, EmbeddableChunk, PluginError,
    SqlExecutionResult, parse_config, parse_context, to_context_value,
};
use crate::plugins::databases::{
    DatabaseConfigFile, DatabaseIntrospectionResult, build_database_chunks,
    introspect_with_connection, map_db_err, run_sql_on_connection,
};
use crate::sqlguard::ensure_read_only;

/// Database plugin backed by a DuckDB scanner extension: the target database
/// is `ATTACH`ed read-only and introspected through information_schema, so
/// no per-dialect driver is needed.
pub struct AttachedDatabasePlugin {
    plugin_id: &'static str,
    plugin_name: &'static str,
    full_type: &'static str,
    extension: &'static str,
}

impl AttachedDatabasePlugin {
    pub fn sqlite() -> Self {
        Self {
            plugin_id: "dce/sqlite",
            plugin_name: "SQLite Plugin",
            full_type: "sqlite",
            extension: "sqlite",
        }
    }

    pub fn postgres() -> Self {
        Self {
            plugin_id: "dce/postgres",
            plugin_name: "PostgreSQL Plugin",
            full_type: "postgres",
            extension: "postgres",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    fn connect(&self, config: &DatabaseConfigFile) -> Result<Connection, PluginError> {
        let conn = Connection::open_in_memory().map_err(map_db_err)?;
        conn.execute_batch(&format!(
            "INSTALL {ext}; LOAD {ext};",
            ext = self.extension
        ))
        .map_err(|e| {
            PluginError::Execution(format!(
                "the {} extension is not available: {e}",
                self.extension
            ))
        })?;

        let target = config.connection.database.replace('\'', "''");
        conn.execute_batch(&format!(
            "ATTACH '{target}' AS src (TYPE {}, READ_ONLY);",
            self.extension
        ))
        .map_err(map_db_err)?;

        Ok(conn)
    }

    fn parse_and_validate(config: &Value) -> Result<DatabaseConfigFile, PluginError> {
        let parsed: DatabaseConfigFile = parse_config(config)?;
        parsed.validate()?;
        Ok(parsed)
    }
}

impl BuildPlugin for AttachedDatabasePlugin {
    fn id(&self) -> &'static str {
        self.plugin_id
    }

    fn name(&self) -> &'static str {
        self.plugin_name
    }

    fn supported_types(&self) -> Vec<DatasourceType> {
        vec![DatasourceType::new(self.full_type)]
    }

    fn divide_context_into_chunks(
        &self,
        context: &Value,
    ) -> Result<Vec<EmbeddableChunk>, PluginError> {
        let result: DatabaseIntrospectionResult = parse_context(context)?;
        build_database_chunks(&result)
    }
}

impl BuildDatasourcePlugin for AttachedDatabasePlugin {
    fn build_context(
        &self,
        _full_type: &str,
        _datasource_name: &str,
        config: &Value,
    ) -> Result<Value, PluginError> {
        let config = Self::parse_and_validate(config)?;
        let conn = self.connect(&config)?;
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
        let conn = self.connect(&config)?;
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
        let conn = self.connect(&config)?;
        run_sql_on_connection(&conn, sql, params)
    }
}

/// Capability probe used by the plugin loader: a scanner extension that can
/// not be installed silently omits its plugin.
pub fn extension_available(extension: &str) -> bool {
    let Ok(conn) = Connection::open_in_memory() else {
        return false;
    };
    let available = conn
        .execute_batch(&format!("INSTALL {extension}; LOAD {extension};"))
        .is_ok();
    debug!(extension, available, "probed scanner extension");
    available
}
