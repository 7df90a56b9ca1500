use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::pluginlib::{DatasourceType, Plugin};

pub mod databases;
pub mod dbt;
pub mod files;
pub mod parquet;

use databases::attached::{AttachedDatabasePlugin, extension_available};
use databases::duckdb_plugin::DuckDbPlugin;
use dbt::DbtPlugin;
use files::UnstructuredFilesPlugin;
use parquet::ParquetPlugin;

#[derive(Debug, Error)]
#[error("plugin type '{full_type}' is provided by both {first} and {second}")]
pub struct DuplicatePluginTypeError {
    pub full_type: String,
    pub first: String,
    pub second: String,
}

#[derive(Debug)]
pub struct PluginRegistry {
    plugins: Vec<Plugin>,
    by_type: BTreeMap<DatasourceType, usize>,
}

impl PluginRegistry {
    pub fn get(&self, datasource_type: &DatasourceType) -> Option<&Plugin> {
        self.by_type
            .get(datasource_type)
            .map(|index| &self.plugins[*index])
    }

    pub fn plugins(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.iter()
    }

    pub fn supported_types(&self) -> Vec<DatasourceType> {
        self.by_type.keys().cloned().collect()
    }
}

/// Load builtin and external plugins and merge them into one registry. A
/// datasource type claimed twice is a hard error.
pub fn load_plugins(exclude_file_plugins: bool) -> Result<PluginRegistry, DuplicatePluginTypeError> {
    let mut plugins = load_builtin_plugins(exclude_file_plugins);
    plugins.extend(load_external_plugins());

    merge_plugins(plugins)
}

fn load_builtin_plugins(exclude_file_plugins: bool) -> Vec<Plugin> {
    let mut plugins: Vec<Plugin> = vec![
        Plugin::Datasource(Box::new(DuckDbPlugin)),
        Plugin::Datasource(Box::new(ParquetPlugin)),
        Plugin::Datasource(Box::new(DbtPlugin)),
    ];

    // Scanner-backed plugins are capability-gated: no extension, no plugin.
    for candidate in [
        AttachedDatabasePlugin::sqlite(),
        AttachedDatabasePlugin::postgres(),
    ] {
        if extension_available(candidate.extension()) {
            plugins.push(Plugin::Datasource(Box::new(candidate)));
        } else {
            debug!(
                extension = candidate.extension(),
                "omitting scanner-backed plugin"
            );
        }
    }

    if !exclude_file_plugins {
        plugins.push(Plugin::File(Box::new(UnstructuredFilesPlugin::default())));
    }

    plugins
}

// Reserved for an entry-point mechanism; empty by default.
fn load_external_plugins() -> Vec<Plugin> {
    Vec::new()
}

fn merge_plugins(plugins: Vec<Plugin>) -> Result<PluginRegistry, DuplicatePluginTypeError> {
    let mut by_type = BTreeMap::new();

    for (index, plugin) in plugins.iter().enumerate() {
        for datasource_type in plugin.supported_types() {
            if let Some(existing) = by_type.insert(datasource_type.clone(), index) {
                let existing: &Plugin = &plugins[existing];
                return Err(DuplicatePluginTypeError {
                    full_type: datasource_type.full_type,
                    first: existing.name().to_string(),
                    second: plugin.name().to_string(),
                });
            }
        }
    }

    Ok(PluginRegistry { plugins, by_type })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pluginlib::{BuildPlugin, EmbeddableChunk, PluginError};
    use serde_yaml::Value;

    #[test]
    fn builtin_plugins_cover_the_expected_types() {
        let registry = load_plugins(false).unwrap();

        for full_type in ["duckdb", "parquet", "dbt", "files/md", "files/txt"] {
            assert!(
                registry.get(&DatasourceType::new(full_type)).is_some(),
                "missing plugin for {full_type}"
            );
        }
        assert!(registry.get(&DatasourceType::new("unknown")).is_none());
    }

    #[test]
    fn excluding_file_plugins_drops_files_types() {
        let registry = load_plugins(true).unwrap();
        assert!(registry.get(&DatasourceType::new("files/md")).is_none());
        assert!(registry.get(&DatasourceType::new("duckdb")).is_some());
    }

    struct FakePlugin {
        plugin_name: &'static str,
        types: Vec<&'static str>,
    }

    impl BuildPlugin for FakePlugin {
        fn id(&self) -> &'static str {
            "tests/fake"
        }

        fn name(&self) -> &'static str {
            self.plugin_name
        }

        fn supported_types(&self) -> Vec<DatasourceType> {
            self.types.iter().map(|t| DatasourceType::new(*t)).collect()
        }

        fn divide_context_into_chunks(
            &self,
            _context: &Value,
        ) -> Result<Vec<EmbeddableChunk>, PluginError> {
            Ok(Vec::new())
        }
    }

    impl crate::pluginlib::BuildDatasourcePlugin for FakePlugin {
        fn build_context(
            &self,
            _full_type: &str,
            _datasource_name: &str,
            _config: &Value,
        ) -> Result<Value, PluginError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn duplicate_type_claims_name_both_plugins() {
        let plugins = vec![
            Plugin::Datasource(Box::new(FakePlugin {
                plugin_name: "First Plugin",
                types: vec!["databases/postgres"],
            })),
            Plugin::Datasource(Box::new(FakePlugin {
                plugin_name: "Second Plugin",
                types: vec!["databases/postgres"],
            })),
        ];

        let err = merge_plugins(plugins).unwrap_err();
        assert_eq!(err.full_type, "databases/postgres");
        assert_eq!(err.first, "First Plugin");
        assert_eq!(err.second, "Second Plugin");
    }

    #[test]
    fn loaded_plugins_have_disjoint_type_sets() {
        let registry = load_plugins(false).unwrap();
        let mut seen = std::collections::HashSet::new();
        for plugin in registry.plugins() {
            for datasource_type in plugin.supported_types() {
                assert!(seen.insert(datasource_type.full_type.clone()));
            }
        }
    }
}
