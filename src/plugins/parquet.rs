use std::collections::BTreeMap;

use duckdb::Connection;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::pluginlib::{
    BuildDatasourcePlugin, BuildPlugin, DatasourceType, EmbeddableChunk, PluginError,
    parse_config, parse_context, to_context_value,
};
use crate::plugins::databases::map_db_err;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParquetConfigFile {
    #[serde(default)]
    pub name: Option<String>,
    pub r#type: String,
    /// Parquet resource location: a local path or a glob over local files.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetColumn {
    pub name: String,
    pub r#type: String,
    pub row_groups: usize,
    pub num_values: i64,
    pub stats_min: String,
    pub stats_max: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetFile {
    pub name: String,
    pub columns: Vec<ParquetColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetIntrospectionResult {
    pub files: Vec<ParquetFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetColumnChunkContent {
    pub file_name: String,
    pub column: ParquetColumn,
}

/// Introspects parquet resources through `parquet_metadata(...)`.
pub struct ParquetPlugin;

impl ParquetPlugin {
    fn introspect(config: &ParquetConfigFile) -> Result<ParquetIntrospectionResult, PluginError> {
        let conn = Connection::open_in_memory().map_err(map_db_err)?;
        let url = config.url.replace('\'', "''");

        let mut statement = conn
            .prepare(&format!(
                "
                SELECT
                  file_name,
                  CAST(column_id AS BIGINT),
                  path_in_schema,
                  COALESCE(CAST(\"type\" AS VARCHAR), ''),
                  CAST(num_values AS BIGINT),
                  COALESCE(CAST(stats_min AS VARCHAR), ''),
                  COALESCE(CAST(stats_max AS VARCHAR), '')
                FROM parquet_metadata('{url}')
                "
            ))
            .map_err(map_db_err)?;
        let mut rows = statement.query([]).map_err(map_db_err)?;

        let mut columns_per_file: BTreeMap<String, BTreeMap<i64, ParquetColumn>> = BTreeMap::new();
        while let Some(row) = rows.next().map_err(map_db_err)? {
            let file_name: String = row.get(0).map_err(map_db_err)?;
            let column_id: i64 = row.get(1).map_err(map_db_err)?;
            let num_values: i64 = row.get(4).map_err(map_db_err)?;

            let columns = columns_per_file.entry(file_name).or_default();
            if let Some(column) = columns.get_mut(&column_id) {
                // One row per row group; fold the counts together.
                column.num_values += num_values;
                column.row_groups += 1;
            } else {
                columns.insert(
                    column_id,
                    ParquetColumn {
                        name: row.get(2).map_err(map_db_err)?,
                        r#type: row.get(3).map_err(map_db_err)?,
                        row_groups: 1,
                        num_values,
                        stats_min: row.get(5).map_err(map_db_err)?,
                        stats_max: row.get(6).map_err(map_db_err)?,
                    },
                );
            }
        }

        Ok(ParquetIntrospectionResult {
            files: columns_per_file
                .into_iter()
                .map(|(name, columns)| ParquetFile {
                    name,
                    columns: columns.into_values().collect(),
                })
                .collect(),
        })
    }
}

impl BuildPlugin for ParquetPlugin {
    fn id(&self) -> &'static str {
        "dce/parquet"
    }

    fn name(&self) -> &'static str {
        "Parquet Plugin"
    }

    fn supported_types(&self) -> Vec<DatasourceType> {
        vec![DatasourceType::new("parquet")]
    }

    fn divide_context_into_chunks(
        &self,
        context: &Value,
    ) -> Result<Vec<EmbeddableChunk>, PluginError> {
        let result: ParquetIntrospectionResult = parse_context(context)?;

        let mut chunks = Vec::new();
        for file in &result.files {
            for column in &file.columns {
                chunks.push(EmbeddableChunk {
                    embeddable_text: format!(
                        "Column [name = {}, type = {}, number of values = {}] in parquet file {}",
                        column.name, column.r#type, column.num_values, file.name
                    ),
                    content: to_context_value(&ParquetColumnChunkContent {
                        file_name: file.name.clone(),
                        column: column.clone(),
                    })?,
                });
            }
        }

        Ok(chunks)
    }
}

impl BuildDatasourcePlugin for ParquetPlugin {
    fn build_context(
        &self,
        _full_type: &str,
        _datasource_name: &str,
        config: &Value,
    ) -> Result<Value, PluginError> {
        let config: ParquetConfigFile = parse_config(config)?;
        to_context_value(&Self::introspect(&config)?)
    }

    fn check_connection(
        &self,
        _full_type: &str,
        _datasource_name: &str,
        config: &Value,
    ) -> Result<(), PluginError> {
        let config: ParquetConfigFile = parse_config(config)?;
        let conn = Connection::open_in_memory().map_err(map_db_err)?;
        let url = config.url.replace('\'', "''");

        let found: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM parquet_file_metadata('{url}')"),
                [],
                |row| row.get(0),
            )
            .map_err(map_db_err)?;
        if found == 0 {
            return Err(PluginError::Execution(format!(
                "no parquet files found at {}",
                config.url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parquet_fixture() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.parquet");
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!(
            "
            CREATE TABLE events (id BIGINT, kind VARCHAR);
            INSERT INTO events VALUES (1, 'click'), (2, 'view'), (3, 'click');
            COPY events TO '{}' (FORMAT parquet);
            ",
            path.display()
        ))
        .unwrap();
        (dir, path.display().to_string())
    }

    fn config_value(url: &str) -> Value {
        serde_yaml::from_str(&format!("type: parquet\nname: events\nurl: \"{url}\"\n")).unwrap()
    }

    #[test]
    fn introspects_columns_with_value_counts() {
        let (_dir, url) = parquet_fixture();
        let plugin = ParquetPlugin;

        let context = plugin
            .build_context("parquet", "events", &config_value(&url))
            .unwrap();
        let result: ParquetIntrospectionResult = serde_yaml::from_value(context.clone()).unwrap();

        assert_eq!(result.files.len(), 1);
        let columns = &result.files[0].columns;
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[0].num_values, 3);

        let chunks = plugin.divide_context_into_chunks(&context).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].embeddable_text.contains("name = kind"));
    }

    #[test]
    fn check_connection_fails_for_missing_file() {
        let plugin = ParquetPlugin;
        let err = plugin
            .check_connection("parquet", "x", &config_value("/nonexistent/*.parquet"))
            .unwrap_err();
        assert!(matches!(err, PluginError::Execution(_)));
    }
}
