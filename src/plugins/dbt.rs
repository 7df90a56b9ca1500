use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::pluginlib::{
    BuildDatasourcePlugin, BuildPlugin, DatasourceType, EmbeddableChunk, PluginError,
    parse_config, parse_context, to_context_value,
};

const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DbtConfigFile {
    #[serde(default)]
    pub name: Option<String>,
    pub r#type: String,
    pub dbt_target_folder_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbtColumn {
    pub name: String,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbtModel {
    pub id: String,
    pub name: String,
    pub database: String,
    pub schema: String,
    #[serde(default)]
    pub description: Option<String>,
    pub columns: Vec<DbtColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbtSemanticModel {
    pub id: String,
    pub name: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbtContext {
    pub models: Vec<DbtModel>,
    pub semantic_models: Vec<DbtSemanticModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbtColumnChunkContent {
    pub database_name: String,
    pub schema_name: String,
    pub model_name: String,
    pub column: DbtColumn,
}

// Only the manifest fields the context needs; dbt adds keys freely between
// versions.
#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    nodes: BTreeMap<String, ManifestNode>,
    #[serde(default)]
    semantic_models: BTreeMap<String, ManifestSemanticModel>,
}

#[derive(Debug, Deserialize)]
struct ManifestNode {
    resource_type: String,
    name: String,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    columns: BTreeMap<String, ManifestColumn>,
}

#[derive(Debug, Deserialize)]
struct ManifestColumn {
    name: String,
    #[serde(default)]
    data_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestSemanticModel {
    name: String,
    #[serde(default)]
    model: Option<String>,
}

/// Builds context from a compiled dbt project's target artifacts.
pub struct DbtPlugin;

impl DbtPlugin {
    fn load_manifest(config: &DbtConfigFile) -> Result<Manifest, PluginError> {
        let manifest_path = config.dbt_target_folder_path.join(MANIFEST_FILE_NAME);
        let raw = fs::read_to_string(&manifest_path).map_err(|e| {
            PluginError::Execution(format!(
                "failed to read dbt manifest {}: {e}",
                manifest_path.display()
            ))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            PluginError::Execution(format!(
                "invalid dbt manifest {}: {e}",
                manifest_path.display()
            ))
        })
    }

    fn extract_context(manifest: Manifest) -> DbtContext {
        let models = manifest
            .nodes
            .into_iter()
            .filter(|(_, node)| node.resource_type == "model")
            .map(|(unique_id, node)| DbtModel {
                id: unique_id,
                name: node.name,
                database: node.database.unwrap_or_default(),
                schema: node.schema.unwrap_or_default(),
                description: node.description.filter(|d| !d.is_empty()),
                columns: node
                    .columns
                    .into_values()
                    .map(|column| DbtColumn {
                        name: column.name,
                        r#type: column.data_type,
                        description: column.description.filter(|d| !d.is_empty()),
                    })
                    .collect(),
            })
            .collect();

        let semantic_models = manifest
            .semantic_models
            .into_iter()
            .map(|(unique_id, semantic_model)| DbtSemanticModel {
                id: unique_id,
                name: semantic_model.name,
                model: semantic_model.model.unwrap_or_default(),
            })
            .collect();

        DbtContext {
            models,
            semantic_models,
        }
    }
}

impl BuildPlugin for DbtPlugin {
    fn id(&self) -> &'static str {
        "dce/dbt"
    }

    fn name(&self) -> &'static str {
        "Dbt Plugin"
    }

    fn supported_types(&self) -> Vec<DatasourceType> {
        vec![DatasourceType::new("dbt")]
    }

    fn divide_context_into_chunks(
        &self,
        context: &Value,
    ) -> Result<Vec<EmbeddableChunk>, PluginError> {
        let context: DbtContext = parse_context(context)?;

        let mut chunks = Vec::new();
        for model in &context.models {
            chunks.push(EmbeddableChunk {
                embeddable_text: format!(
                    "Model {} in database {} and schema {}, with unique id {}",
                    model.name, model.database, model.schema, model.id
                ),
                content: to_context_value(model)?,
            });

            for column in &model.columns {
                chunks.push(EmbeddableChunk {
                    embeddable_text: format!("Column {} in model {}", column.name, model.id),
                    content: to_context_value(&DbtColumnChunkContent {
                        database_name: model.database.clone(),
                        schema_name: model.schema.clone(),
                        model_name: model.name.clone(),
                        column: column.clone(),
                    })?,
                });
            }
        }

        for semantic_model in &context.semantic_models {
            chunks.push(EmbeddableChunk {
                embeddable_text: format!(
                    "Semantic model {} with id {}, referencing model {}",
                    semantic_model.name, semantic_model.id, semantic_model.model
                ),
                content: to_context_value(semantic_model)?,
            });
        }

        Ok(chunks)
    }
}

impl BuildDatasourcePlugin for DbtPlugin {
    fn build_context(
        &self,
        _full_type: &str,
        _datasource_name: &str,
        config: &Value,
    ) -> Result<Value, PluginError> {
        let config: DbtConfigFile = parse_config(config)?;
        let manifest = Self::load_manifest(&config)?;
        to_context_value(&Self::extract_context(manifest))
    }

    fn check_connection(
        &self,
        _full_type: &str,
        _datasource_name: &str,
        config: &Value,
    ) -> Result<(), PluginError> {
        let config: DbtConfigFile = parse_config(config)?;
        Self::load_manifest(&config).map(|_| ())
    }
}
