use std::fs;

use anyhow::{Result, bail};
use tracing::debug;

use crate::cli::{DatasourceAddArgs, DatasourceSqlArgs, DatasourceValidateArgs};
use crate::datasources::{DatasourceId, PreparedDatasource, discovery};
use crate::pluginlib::{Plugin, PluginError};
use crate::plugins::load_plugins;
use crate::project;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ValidationStatus {
    Valid,
    Invalid,
    Unknown,
}

impl ValidationStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Invalid => "Invalid",
            Self::Unknown => "Unknown",
        }
    }
}

struct ValidationResult {
    status: ValidationStatus,
    summary: Option<String>,
    full_message: Option<String>,
}

pub fn add(args: DatasourceAddArgs) -> Result<()> {
    let layout = project::ensure_project_dir(&args.project_dir)?;

    let Some((directory, template)) = config_template(&args.datasource_type) else {
        bail!(
            "unknown datasource type '{}'; expected one of duckdb, sqlite, postgres, parquet, dbt",
            args.datasource_type
        );
    };

    let target_dir = layout.src_dir().join(directory);
    fs::create_dir_all(&target_dir)?;
    let target = target_dir.join(format!("{}.yaml", args.name));
    if target.exists() && !args.overwrite {
        bail!(
            "a config file already exists at {} (use --overwrite to replace it)",
            target.display()
        );
    }

    fs::write(&target, template.replace("{name}", &args.name))?;
    println!("Wrote {}", target.display());
    println!("Edit the connection details, then check it with `dce datasource validate`.");

    Ok(())
}

fn config_template(datasource_type: &str) -> Option<(&'static str, &'static str)> {
    match datasource_type {
        "duckdb" => Some((
            "databases",
            "type: duckdb\nname: {name}\nconnection:\n  database: \"{{ PROJECT_DIR }}/{name}.duckdb\"\n",
        )),
        "sqlite" => Some((
            "databases",
            "type: sqlite\nname: {name}\nconnection:\n  database: \"{{ PROJECT_DIR }}/{name}.sqlite\"\n",
        )),
        "postgres" => Some((
            "databases",
            "type: postgres\nname: {name}\nconnection:\n  database: \"dbname={name} host=localhost user={{ env_var('USER') }}\"\n",
        )),
        "parquet" => Some((
            "resources",
            "type: parquet\nname: {name}\nurl: \"{{ PROJECT_DIR }}/data/*.parquet\"\n",
        )),
        "dbt" => Some((
            "projects",
            "type: dbt\nname: {name}\ndbt_target_folder_path: \"{{ PROJECT_DIR }}/{name}/target\"\n",
        )),
        _ => None,
    }
}

pub fn validate(args: DatasourceValidateArgs) -> Result<()> {
    let layout = project::ensure_project_dir(&args.project_dir)?;

    let descriptors = if args.datasource_ids.is_empty() {
        discovery::discover_datasources(&layout)?
    } else {
        let ids = args
            .datasource_ids
            .iter()
            .map(|id| DatasourceId::from_string_repr(id.as_str()))
            .collect::<Vec<DatasourceId>>();
        discovery::get_datasource_descriptors(&layout, &ids)?
    };

    let plugins = load_plugins(true)?;

    let mut any_invalid = false;
    for descriptor in &descriptors {
        let result = validate_one(&layout, &plugins, descriptor);
        if result.status == ValidationStatus::Invalid {
            any_invalid = true;
        }

        let mut line = format!(
            "{}: {}",
            descriptor.datasource_id,
            result.status.as_str()
        );
        if let Some(summary) = &result.summary {
            line.push_str(&format!(" - {summary}"));
        }
        println!("{line}");
        if args.verbose {
            if let Some(full_message) = &result.full_message {
                println!("{full_message}");
            }
        }
    }

    if any_invalid {
        bail!("one or more datasources failed validation");
    }
    Ok(())
}

fn validate_one(
    layout: &project::ProjectLayout,
    plugins: &crate::plugins::PluginRegistry,
    descriptor: &crate::datasources::DatasourceDescriptor,
) -> ValidationResult {
    let prepared = match discovery::prepare_source(layout, descriptor) {
        Ok(prepared) => prepared,
        Err(e) => {
            return ValidationResult {
                status: ValidationStatus::Invalid,
                summary: Some("Failed to prepare source".to_string()),
                full_message: Some(e.to_string()),
            };
        }
    };

    let Some(plugin) = plugins.get(prepared.datasource_type()) else {
        return ValidationResult {
            status: ValidationStatus::Invalid,
            summary: Some("No compatible plugin found".to_string()),
            full_message: None,
        };
    };

    let (PreparedDatasource::Config { config, .. }, Plugin::Datasource(plugin)) =
        (&prepared, plugin)
    else {
        return ValidationResult {
            status: ValidationStatus::Unknown,
            summary: Some("Only config datasources can be validated".to_string()),
            full_message: None,
        };
    };

    match plugin.check_connection(
        &prepared.datasource_type().full_type,
        &prepared.datasource_name(),
        config,
    ) {
        Ok(()) => ValidationResult {
            status: ValidationStatus::Valid,
            summary: None,
            full_message: None,
        },
        Err(PluginError::InvalidConfig(message)) => ValidationResult {
            status: ValidationStatus::Invalid,
            summary: Some("Config file is invalid".to_string()),
            full_message: Some(message),
        },
        Err(PluginError::NotSupported(_)) => ValidationResult {
            status: ValidationStatus::Unknown,
            summary: Some("Plugin doesn't support validating its config".to_string()),
            full_message: None,
        },
        Err(e) => {
            debug!(datasource_id = %descriptor.datasource_id, error = %e, "connection check failed");
            ValidationResult {
                status: ValidationStatus::Invalid,
                summary: Some("Connection with the datasource can not be established".to_string()),
                full_message: Some(e.to_string()),
            }
        }
    }
}

pub fn sql(args: DatasourceSqlArgs) -> Result<()> {
    let layout = project::ensure_project_dir(&args.project_dir)?;

    let id = DatasourceId::from_string_repr(&args.datasource_id);
    let descriptors = discovery::get_datasource_descriptors(&layout, std::slice::from_ref(&id))?;
    let Some(descriptor) = descriptors.first() else {
        bail!("datasource not found: {id}");
    };

    let prepared = discovery::prepare_source(&layout, descriptor)?;
    let PreparedDatasource::Config { config, .. } = &prepared else {
        bail!("SQL can only run against config datasources");
    };

    let plugins = load_plugins(true)?;
    let Some(Plugin::Datasource(plugin)) = plugins.get(prepared.datasource_type()) else {
        bail!(
            "no SQL-capable plugin for datasource type '{}'",
            prepared.datasource_type()
        );
    };

    let params = if args.params.is_empty() {
        None
    } else {
        Some(args.params.as_slice())
    };
    let result = plugin.run_sql(config, &args.sql, params, !args.allow_write)?;

    println!("{}", result.columns.join("\t"));
    for row in &result.rows {
        println!("{}", row.join("\t"));
    }

    Ok(())
}
