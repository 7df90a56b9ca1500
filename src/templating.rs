use std::env;
use std::path::Path;

use minijinja::{Environment, context};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("error in template: {0}")]
    Render(String),
    #[error(
        "error in template: the environment variable {0} is missing and no default was provided"
    )]
    UnknownEnvVar(String),
}

/// Render a datasource config template. The environment exposes exactly
/// `env_var(name, default?)`, `PROJECT_DIR` and `SRC_DIR`; nothing else from
/// the host is reachable.
pub fn render_template(
    project_dir: &Path,
    src_dir: &Path,
    source: &str,
) -> Result<String, TemplateError> {
    let mut env = Environment::new();
    env.add_function(
        "env_var",
        |name: String, default: Option<String>| -> Result<String, minijinja::Error> {
            resolve_env_var(&name, default.as_deref()).map_err(|e| {
                minijinja::Error::new(minijinja::ErrorKind::UndefinedError, e.to_string())
            })
        },
    );

    env.render_str(
        source,
        context! {
            PROJECT_DIR => project_dir.display().to_string(),
            SRC_DIR => src_dir.display().to_string(),
        },
    )
    .map_err(|e| {
        // Surface the missing-env-var case under its own kind.
        let message = e.to_string();
        if message.contains("environment variable") {
            TemplateError::UnknownEnvVar(message)
        } else {
            TemplateError::Render(message)
        }
    })
}

fn resolve_env_var(name: &str, default: Option<&str>) -> Result<String, TemplateError> {
    if let Ok(value) = env::var(name) {
        return Ok(value);
    }
    if let Some(default) = default {
        return Ok(default.to_string());
    }
    Err(TemplateError::UnknownEnvVar(name.to_string()))
}
