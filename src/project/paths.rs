use std::env;
use std::path::{Path, PathBuf};

const STATE_DIR_ENV_VAR: &str = "DATABAO_CONTEXT_ENGINE_PATH";
const LEGACY_STATE_DIR_ENV_VAR: &str = "NEMORY_PATH";
const DEFAULT_STATE_DIR_NAME: &str = ".dce";
const DB_FILE_NAME: &str = "dce.duckdb";

/// Global (per-user) state directory, overridable through the environment.
pub fn state_dir() -> PathBuf {
    if let Ok(path) = env::var(STATE_DIR_ENV_VAR) {
        return PathBuf::from(path);
    }
    if let Ok(path) = env::var(LEGACY_STATE_DIR_ENV_VAR) {
        return PathBuf::from(path);
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_STATE_DIR_NAME)
}

pub fn db_path(project_dir: &Path) -> PathBuf {
    super::output_dir(project_dir).join(DB_FILE_NAME)
}

pub fn journal_file(state_dir: &Path) -> PathBuf {
    state_dir.join("event-journal").join("journal.txt")
}
