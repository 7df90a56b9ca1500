mod build;
mod cli;
mod commands;
mod datasources;
mod journal;
mod llm;
mod pluginlib;
mod plugins;
mod progress;
mod project;
mod retrieve;
mod services;
mod shards;
mod sqlguard;
mod storage;
mod templating;
#[cfg(test)]
mod testutil;
mod util;

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Cli, Commands, DatasourceCommands};

fn main() {
    let cli = Cli::parse();
    init_tracing(logs_dir_of(&cli).as_deref());

    if let Err(err) = run(cli) {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init(args) => commands::init::run(args),
        Commands::Datasource(DatasourceCommands::Add(args)) => commands::datasource::add(args),
        Commands::Datasource(DatasourceCommands::Validate(args)) => {
            commands::datasource::validate(args)
        }
        Commands::Datasource(DatasourceCommands::Sql(args)) => commands::datasource::sql(args),
        Commands::Build(args) => commands::build::run(args),
        Commands::Retrieve(args) => commands::retrieve::run(args),
        Commands::Reindex(args) => commands::reindex::run(args),
        Commands::Info(args) => commands::info::run(args),
    }
}

fn logs_dir_of(cli: &Cli) -> Option<std::path::PathBuf> {
    let project_dir = match &cli.command {
        Commands::Init(_) => return None,
        Commands::Datasource(DatasourceCommands::Add(args)) => &args.project_dir,
        Commands::Datasource(DatasourceCommands::Validate(args)) => &args.project_dir,
        Commands::Datasource(DatasourceCommands::Sql(args)) => &args.project_dir,
        Commands::Build(args) => &args.project_dir,
        Commands::Retrieve(args) => &args.project_dir,
        Commands::Reindex(args) => &args.project_dir,
        Commands::Info(args) => &args.project_dir,
    };

    project::validate_project_dir(project_dir).map(|layout| layout.logs_dir())
}

fn init_tracing(logs_dir: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    match logs_dir.and_then(open_monthly_log_file) {
        Some(log_file) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(log_file)),
            )
            .init(),
        None => registry.init(),
    }
}

// One log file per month, appended across invocations.
fn open_monthly_log_file(logs_dir: &Path) -> Option<File> {
    std::fs::create_dir_all(logs_dir).ok()?;
    let file_name = chrono::Utc::now().format("log-%Y-%m.txt").to_string();
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join(file_name))
        .ok()
}
