use std::fs;
use std::path::Path;

use thiserror::Error;
use uuid::Uuid;

const DEFAULT_SECTION: &str = "DEFAULT";
const PROJECT_ID_PROPERTY: &str = "project-id";
const EMBED_MODEL_PROPERTY: &str = "embed-model";
const EMBED_DIM_PROPERTY: &str = "embed-dim";

#[derive(Debug, Error)]
pub enum ProjectConfigError {
    #[error("failed to read project config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("project config {path} is missing the '{PROJECT_ID_PROPERTY}' property")]
    MissingProjectId { path: String },
    #[error("project config {path} has an invalid value for '{key}': {value}")]
    InvalidValue {
        path: String,
        key: String,
        value: String,
    },
}

/// Contents of `dce.ini`: the project identity plus optional model defaults.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub project_id: Uuid,
    pub embed_model: Option<String>,
    pub embed_dim: Option<usize>,
}

impl ProjectConfig {
    pub fn new() -> Self {
        Self {
            project_id: Uuid::new_v4(),
            embed_model: None,
            embed_dim: None,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ProjectConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ProjectConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut project_id = None;
        let mut embed_model = None;
        let mut embed_dim = None;
        let mut section = DEFAULT_SECTION.to_string();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_string();
                continue;
            }
            if section != DEFAULT_SECTION {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                PROJECT_ID_PROPERTY => {
                    let parsed =
                        Uuid::parse_str(value).map_err(|_| ProjectConfigError::InvalidValue {
                            path: path.display().to_string(),
                            key: key.to_string(),
                            value: value.to_string(),
                        })?;
                    project_id = Some(parsed);
                }
                EMBED_MODEL_PROPERTY => embed_model = Some(value.to_string()),
                EMBED_DIM_PROPERTY => {
                    let parsed =
                        value
                            .parse::<usize>()
                            .map_err(|_| ProjectConfigError::InvalidValue {
                                path: path.display().to_string(),
                                key: key.to_string(),
                                value: value.to_string(),
                            })?;
                    embed_dim = Some(parsed);
                }
                _ => {}
            }
        }

        let project_id = project_id.ok_or_else(|| ProjectConfigError::MissingProjectId {
            path: path.display().to_string(),
        })?;

        Ok(Self {
            project_id,
            embed_model,
            embed_dim,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ProjectConfigError> {
        let mut out = format!("[{DEFAULT_SECTION}]\n{PROJECT_ID_PROPERTY} = {}\n", self.project_id);
        if let Some(model) = &self.embed_model {
            out.push_str(&format!("{EMBED_MODEL_PROPERTY} = {model}\n"));
        }
        if let Some(dim) = self.embed_dim {
            out.push_str(&format!("{EMBED_DIM_PROPERTY} = {dim}\n"));
        }

        fs::write(path, out).map_err(|source| ProjectConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}
