use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::services::ChunkEmbeddingMode;

#[derive(Parser, Debug)]
#[command(
    name = "dce",
    version,
    about = "Local-first context build and retrieval engine"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the project skeleton in an existing directory
    Init(InitArgs),
    /// Manage datasource configs
    #[command(subcommand)]
    Datasource(DatasourceCommands),
    /// Discover sources, build their contexts and embed them
    Build(BuildArgs),
    /// Semantic search over the built contexts
    Retrieve(RetrieveArgs),
    /// Re-embed previously exported contexts
    Reindex(ReindexArgs),
    /// Print version, paths and project id
    Info(InfoArgs),
}

#[derive(Subcommand, Debug)]
pub enum DatasourceCommands {
    /// Write a template config for a datasource type
    Add(DatasourceAddArgs),
    /// Check datasource connections
    Validate(DatasourceValidateArgs),
    /// Run a read-only SQL statement through a datasource plugin
    Sql(DatasourceSqlArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = ChunkEmbeddingMode::EmbeddableTextOnly)]
    pub chunk_embedding_mode: ChunkEmbeddingMode,

    #[arg(long)]
    pub embed_model: Option<String>,

    #[arg(long)]
    pub embed_dim: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct RetrieveArgs {
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Search text
    #[arg(required = true, trailing_var_arg = true)]
    pub text: Vec<String>,

    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Restrict the search to these datasource ids
    #[arg(long = "ds")]
    pub datasource_ids: Vec<String>,

    #[arg(long)]
    pub embed_model: Option<String>,

    #[arg(long)]
    pub embed_dim: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReindexArgs {
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = ChunkEmbeddingMode::EmbeddableTextOnly)]
    pub chunk_embedding_mode: ChunkEmbeddingMode,

    #[arg(long)]
    pub embed_model: Option<String>,

    #[arg(long)]
    pub embed_dim: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct InfoArgs {
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct DatasourceAddArgs {
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Datasource type (duckdb, sqlite, postgres, parquet, dbt)
    #[arg(long = "type")]
    pub datasource_type: String,

    #[arg(long)]
    pub name: String,

    #[arg(long, default_value_t = false)]
    pub overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DatasourceValidateArgs {
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Validate only these datasource ids
    #[arg(long = "id")]
    pub datasource_ids: Vec<String>,

    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DatasourceSqlArgs {
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    #[arg(long = "id")]
    pub datasource_id: String,

    /// SQL to execute (read-only unless --allow-write is set)
    pub sql: String,

    /// Positional parameters bound to `?` placeholders, in order
    #[arg(long = "param")]
    pub params: Vec<String>,

    /// Skip the read-only gate and send the statement as-is
    #[arg(long, default_value_t = false)]
    pub allow_write: bool,
}
