use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

pub mod config;
pub mod paths;

pub use config::{ProjectConfig, ProjectConfigError};

pub const SOURCE_FOLDER_NAME: &str = "src";
pub const OUTPUT_FOLDER_NAME: &str = "output";
pub const EXAMPLES_FOLDER_NAME: &str = "examples";
pub const LOGS_FOLDER_NAME: &str = "logs";
pub const CONFIG_FILE_NAME: &str = "dce.ini";
pub const DEPRECATED_CONFIG_FILE_NAME: &str = "nemory.ini";
pub const ALL_RESULTS_FILE_NAME: &str = "all_results.yaml";

const EXAMPLE_DATABASE_CONFIG: &str = include_str!("resources/example_database.yaml");
const EXAMPLE_NOTE: &str = include_str!("resources/example_note.md");

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("the project directory is not valid: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error(
        "the project directory has not been initialised, it should contain a {} config file [project_dir: {}]",
        CONFIG_FILE_NAME,
        .0.display()
    )]
    MissingConfigFile(PathBuf),
    #[error(
        "the project directory has not been initialised, it should contain a {} directory [project_dir: {}]",
        SOURCE_FOLDER_NAME,
        .0.display()
    )]
    MissingSrcDir(PathBuf),
    #[error(transparent)]
    Config(#[from] ProjectConfigError),
}

#[derive(Debug, Error)]
pub enum InitProjectError {
    #[error("{} does not exist", .0.display())]
    ProjectDirDoesntExist(PathBuf),
    #[error("{} is not a directory", .0.display())]
    ProjectDirNotADirectory(PathBuf),
    #[error("the folder already contains {1} [project_dir: {}]", .0.display())]
    AlreadyInitialised(PathBuf, String),
    #[error("failed to create {}: {1}", .0.display())]
    Io(PathBuf, std::io::Error),
    #[error(transparent)]
    Config(#[from] ProjectConfigError),
}

/// A validated project directory: the config file exists and `src/` is a
/// directory. All other paths are derived from `project_dir`.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub project_dir: PathBuf,
    pub config_file: PathBuf,
}

impl ProjectLayout {
    pub fn src_dir(&self) -> PathBuf {
        src_dir(&self.project_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        output_dir(&self.project_dir)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.project_dir.join(LOGS_FOLDER_NAME)
    }

    pub fn examples_dir(&self) -> PathBuf {
        self.project_dir.join(EXAMPLES_FOLDER_NAME)
    }

    pub fn db_path(&self) -> PathBuf {
        paths::db_path(&self.project_dir)
    }

    pub fn read_config(&self) -> Result<ProjectConfig, ProjectError> {
        Ok(ProjectConfig::from_file(&self.config_file)?)
    }
}

pub fn src_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(SOURCE_FOLDER_NAME)
}

pub fn output_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(OUTPUT_FOLDER_NAME)
}

pub fn ensure_project_dir(project_dir: &Path) -> Result<ProjectLayout, ProjectError> {
    if !project_dir.is_dir() {
        return Err(ProjectError::NotADirectory(project_dir.to_path_buf()));
    }

    let Some(config_file) = find_config_file(project_dir) else {
        return Err(ProjectError::MissingConfigFile(project_dir.to_path_buf()));
    };

    if !src_dir(project_dir).is_dir() {
        return Err(ProjectError::MissingSrcDir(project_dir.to_path_buf()));
    }

    Ok(ProjectLayout {
        project_dir: project_dir.to_path_buf(),
        config_file,
    })
}

pub fn validate_project_dir(project_dir: &Path) -> Option<ProjectLayout> {
    ensure_project_dir(project_dir).ok()
}

fn find_config_file(project_dir: &Path) -> Option<PathBuf> {
    let deprecated = project_dir.join(DEPRECATED_CONFIG_FILE_NAME);
    if deprecated.is_file() {
        warn!(
            "{DEPRECATED_CONFIG_FILE_NAME} project config file is deprecated, please rename it to {CONFIG_FILE_NAME}"
        );
        return Some(deprecated);
    }

    let config_file = project_dir.join(CONFIG_FILE_NAME);
    if config_file.is_file() {
        return Some(config_file);
    }
    None
}

/// Create the project skeleton: `src/databases`, `src/files`, `logs/`,
/// `examples/` (seeded) and a fresh `dce.ini`. Refuses to touch a directory
/// that already carries any of those.
pub fn init_project_dir(project_dir: &Path) -> Result<ProjectLayout, InitProjectError> {
    if !project_dir.exists() {
        return Err(InitProjectError::ProjectDirDoesntExist(
            project_dir.to_path_buf(),
        ));
    }
    if !project_dir.is_dir() {
        return Err(InitProjectError::ProjectDirNotADirectory(
            project_dir.to_path_buf(),
        ));
    }

    let config_file = project_dir.join(CONFIG_FILE_NAME);
    let deprecated_config_file = project_dir.join(DEPRECATED_CONFIG_FILE_NAME);
    if config_file.is_file() || deprecated_config_file.is_file() {
        return Err(InitProjectError::AlreadyInitialised(
            project_dir.to_path_buf(),
            "a config file".to_string(),
        ));
    }

    let src = src_dir(project_dir);
    if src.is_dir() {
        return Err(InitProjectError::AlreadyInitialised(
            project_dir.to_path_buf(),
            format!("a {SOURCE_FOLDER_NAME} directory"),
        ));
    }

    let examples = project_dir.join(EXAMPLES_FOLDER_NAME);
    if examples.exists() {
        return Err(InitProjectError::AlreadyInitialised(
            project_dir.to_path_buf(),
            format!("an {EXAMPLES_FOLDER_NAME} directory"),
        ));
    }

    create_dir(&src)?;
    create_dir(&src.join("databases"))?;
    create_dir(&src.join("files"))?;
    create_dir(&project_dir.join(LOGS_FOLDER_NAME))?;
    create_dir(&examples)?;
    write_file(&examples.join("database.yaml"), EXAMPLE_DATABASE_CONFIG)?;
    write_file(&examples.join("note.md"), EXAMPLE_NOTE)?;

    ProjectConfig::new().save(&config_file)?;

    Ok(ProjectLayout {
        project_dir: project_dir.to_path_buf(),
        config_file,
    })
}

fn create_dir(path: &Path) -> Result<(), InitProjectError> {
    fs::create_dir(path).map_err(|e| InitProjectError::Io(path.to_path_buf(), e))
}

fn write_file(path: &Path, content: &str) -> Result<(), InitProjectError> {
    fs::write(path, content).map_err(|e| InitProjectError::Io(path.to_path_buf(), e))
}
