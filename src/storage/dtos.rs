#[derive(Debug, Clone)]
pub struct RunRow {
    pub run_id: i64,
    pub run_name: String,
    pub project_id: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub dce_version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatasourceRunRow {
    pub datasource_run_id: i64,
    pub run_id: i64,
    pub plugin: String,
    pub full_type: String,
    pub source_id: String,
    pub storage_directory: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ChunkRow {
    pub chunk_id: i64,
    pub full_type: String,
    pub datasource_id: String,
    pub display_text: Option<String>,
    pub embeddable_text: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingModelRegistryRow {
    pub embedder: String,
    pub model_id: String,
    pub dim: usize,
    pub table_name: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingRow {
    pub chunk_id: i64,
    pub vec: Vec<f32>,
    pub created_at: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchResult {
    pub display_text: String,
    pub embeddable_text: String,
    pub cosine_distance: f64,
    pub full_type: String,
    pub datasource_id: String,
}
