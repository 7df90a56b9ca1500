use std::path::{Path, PathBuf};

use serde_yaml::Value;
use thiserror::Error;

use crate::pluginlib::DatasourceType;
use crate::templating::TemplateError;

pub mod discovery;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DatasourceKind {
    Config,
    File,
}

/// Stable identifier of a datasource within a project: its config-file path
/// relative to `src/`, with `/` separators on every platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasourceId(String);

impl DatasourceId {
    pub fn from_string_repr(repr: impl AsRef<str>) -> Self {
        Self(repr.as_ref().to_string())
    }

    pub fn from_config_file_path(src_dir: &Path, config_file: &Path) -> Result<Self, DiscoveryError> {
        let relative = config_file
            .strip_prefix(src_dir)
            .map_err(|_| DiscoveryError::OutsideSrcDir(config_file.to_path_buf()))?;

        let repr = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<String>>()
            .join("/");

        Ok(Self(repr))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn relative_path_to_config_file(&self) -> PathBuf {
        PathBuf::from_iter(self.0.split('/'))
    }

    /// Exported context path: the config path with its extension replaced by
    /// `yaml`.
    pub fn relative_path_to_context_file(&self) -> PathBuf {
        let mut path = self.relative_path_to_config_file();
        path.set_extension("yaml");
        path
    }
}

impl std::fmt::Display for DatasourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct DatasourceDescriptor {
    pub datasource_id: DatasourceId,
    pub path: PathBuf,
    pub main_type: String,
    pub kind: DatasourceKind,
}

#[derive(Debug, Clone)]
pub enum PreparedDatasource {
    Config {
        datasource_id: DatasourceId,
        datasource_type: DatasourceType,
        path: PathBuf,
        config: Value,
        datasource_name: String,
    },
    File {
        datasource_id: DatasourceId,
        datasource_type: DatasourceType,
        path: PathBuf,
    },
}

impl PreparedDatasource {
    pub fn datasource_id(&self) -> &DatasourceId {
        match self {
            Self::Config { datasource_id, .. } | Self::File { datasource_id, .. } => datasource_id,
        }
    }

    pub fn datasource_type(&self) -> &DatasourceType {
        match self {
            Self::Config {
                datasource_type, ..
            }
            | Self::File {
                datasource_type, ..
            } => datasource_type,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Config { path, .. } | Self::File { path, .. } => path,
        }
    }

    pub fn datasource_name(&self) -> String {
        match self {
            Self::Config {
                datasource_name, ..
            } => datasource_name.clone(),
            Self::File { path, .. } => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("src directory does not exist in {}", .0.display())]
    SrcDirMissing(PathBuf),
    #[error("datasource config file not found: {}", .0.display())]
    ConfigFileNotFound(PathBuf),
    #[error("datasource file is outside the src directory: {}", .0.display())]
    OutsideSrcDir(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid yaml in {}: {message}", .path.display())]
    InvalidYaml { path: PathBuf, message: String },
    #[error("config missing a string 'type' key at {}", .0.display())]
    MissingType(PathBuf),
    #[error(transparent)]
    Template(#[from] TemplateError),
}
