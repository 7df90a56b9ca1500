use std::io::Read;

use serde::de::DeserializeOwned;
use serde_yaml::Value;
use thiserror::Error;

/// A chunk emitted by a plugin: the text to embed plus the structured content
/// returned when the chunk is selected by a search.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddableChunk {
    pub embeddable_text: String,
    pub content: Value,
}

/// Plugin routing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasourceType {
    pub full_type: String,
}

impl DatasourceType {
    pub fn new(full_type: impl Into<String>) -> Self {
        Self {
            full_type: full_type.into(),
        }
    }
}

impl std::fmt::Display for DatasourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_type)
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("{0} is not supported by this plugin")]
    NotSupported(&'static str),
    #[error("sql rejected: {0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Execution(String),
}

/// Result of a read-only SQL execution through a plugin.
#[derive(Debug, Clone)]
pub struct SqlExecutionResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub trait BuildPlugin {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn supported_types(&self) -> Vec<DatasourceType>;
    fn divide_context_into_chunks(&self, context: &Value)
    -> Result<Vec<EmbeddableChunk>, PluginError>;
}

/// Plugin driven by a validated YAML config file.
pub trait BuildDatasourcePlugin: BuildPlugin {
    fn build_context(
        &self,
        full_type: &str,
        datasource_name: &str,
        config: &Value,
    ) -> Result<Value, PluginError>;

    fn check_connection(
        &self,
        _full_type: &str,
        _datasource_name: &str,
        _config: &Value,
    ) -> Result<(), PluginError> {
        Err(PluginError::NotSupported("check_connection"))
    }

    fn run_sql(
        &self,
        _config: &Value,
        _sql: &str,
        _params: Option<&[String]>,
        _read_only: bool,
    ) -> Result<SqlExecutionResult, PluginError> {
        Err(PluginError::NotSupported("run_sql"))
    }
}

/// Plugin driven by a raw file stream.
pub trait BuildFilePlugin: BuildPlugin {
    fn build_file_context(
        &self,
        full_type: &str,
        file_name: &str,
        reader: &mut dyn Read,
    ) -> Result<Value, PluginError>;
}

pub enum Plugin {
    Datasource(Box<dyn BuildDatasourcePlugin>),
    File(Box<dyn BuildFilePlugin>),
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Plugin::Datasource(p) => f.debug_tuple("Datasource").field(&p.id()).finish(),
            Plugin::File(p) => f.debug_tuple("File").field(&p.id()).finish(),
        }
    }
}

impl Plugin {
    pub fn base(&self) -> &dyn BuildPlugin {
        match self {
            Plugin::Datasource(p) => p.as_ref(),
            Plugin::File(p) => p.as_ref(),
        }
    }

    pub fn id(&self) -> &'static str {
        self.base().id()
    }

    pub fn name(&self) -> &'static str {
        self.base().name()
    }

    pub fn supported_types(&self) -> Vec<DatasourceType> {
        self.base().supported_types()
    }

    pub fn divide_context_into_chunks(
        &self,
        context: &Value,
    ) -> Result<Vec<EmbeddableChunk>, PluginError> {
        self.base().divide_context_into_chunks(context)
    }
}

/// Validate a raw YAML config against a plugin's typed config shape.
pub fn parse_config<T: DeserializeOwned>(config: &Value) -> Result<T, PluginError> {
    serde_yaml::from_value(config.clone()).map_err(|e| PluginError::InvalidConfig(e.to_string()))
}

/// Deserialize a structured context back into a plugin's typed context shape.
pub fn parse_context<T: DeserializeOwned>(context: &Value) -> Result<T, PluginError> {
    serde_yaml::from_value(context.clone())
        .map_err(|e| PluginError::Execution(format!("unreadable context: {e}")))
}

pub fn to_context_value<T: serde::Serialize>(context: &T) -> Result<Value, PluginError> {
    serde_yaml::to_value(context)
        .map_err(|e| PluginError::Execution(format!("unserializable context: {e}")))
}
