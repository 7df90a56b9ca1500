use std::cell::RefCell;
use std::fs;

use super::*;
use crate::progress::ProgressKind;
use crate::services::{ChunkEmbeddingMode, ChunkEmbeddingService};
use crate::storage::open_in_memory;
use crate::testutil::StubEmbeddingProvider;

const DIM: usize = 8;

fn project_with_sources(sources: &[(&str, &str)]) -> (tempfile::TempDir, ProjectLayout) {
    let dir = tempfile::tempdir().unwrap();
    let layout = crate::project::init_project_dir(dir.path()).unwrap();
    for (relative, content) in sources {
        let path = layout.src_dir().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    (dir, layout)
}

fn service_for<'a>(
    layout: &ProjectLayout,
    provider: &'a StubEmbeddingProvider,
) -> BuildService<'a> {
    let project_id = layout.read_config().unwrap().project_id.to_string();
    let chunk_embedding_service =
        ChunkEmbeddingService::new(provider, None, ChunkEmbeddingMode::EmbeddableTextOnly).unwrap();
    BuildService::new(project_id, chunk_embedding_service)
}

fn long_markdown(words: usize) -> String {
    (0..words)
        .map(|i| format!("word{i}"))
        .collect::<Vec<String>>()
        .join(" ")
}

fn table_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn empty_project_builds_nothing() {
    let (_dir, layout) = project_with_sources(&[]);
    let mut conn = open_in_memory().unwrap();
    let provider = StubEmbeddingProvider::new(DIM);
    let service = service_for(&layout, &provider);

    let events = RefCell::new(Vec::new());
    let cb = |event: &crate::progress::ProgressEvent| events.borrow_mut().push(event.clone());
    let results = build(&layout, &mut conn, &service, Some(&cb)).unwrap();

    assert!(results.is_empty());
    assert!(
        !layout
            .output_dir()
            .join(crate::project::ALL_RESULTS_FILE_NAME)
            .exists()
    );
    assert_eq!(table_count(&conn, "chunk"), 0);
    assert_eq!(table_count(&conn, "run"), 0);

    let events = events.borrow();
    assert_eq!(events[0].kind, ProgressKind::TaskStarted);
    assert_eq!(events[0].datasource_total, Some(0));
    assert_eq!(events[1].kind, ProgressKind::TaskFinished);
}

#[test]
fn single_file_produces_chunks_shard_rows_and_registry_row() {
    let (_dir, layout) = project_with_sources(&[("files/note.md", &long_markdown(700))]);
    let mut conn = open_in_memory().unwrap();
    let provider = StubEmbeddingProvider::new(DIM);
    let service = service_for(&layout, &provider);

    let results = build(&layout, &mut conn, &service, None).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, crate::progress::DatasourceStatus::Ok);
    assert_eq!(
        results[0].datasource_type.as_ref().map(|t| t.full_type.as_str()),
        Some("files/md")
    );
    assert!(
        results[0]
            .context_file_path
            .as_ref()
            .is_some_and(|p| p.ends_with("files/note.yaml"))
    );

    // A 700-word file chunks into three overlapping 300-word windows.
    assert_eq!(table_count(&conn, "chunk"), 3);
    assert_eq!(table_count(&conn, "embedding_model_registry"), 1);

    let table_name = crate::shards::build_table_name("tests", "stub:v1", DIM);
    assert_eq!(table_count(&conn, &table_name), 3);

    let run_count = table_count(&conn, "run");
    assert_eq!(run_count, 1);
    let ended_at: Option<String> = conn
        .query_row("SELECT CAST(ended_at AS VARCHAR) FROM run", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert!(ended_at.is_some());
    assert_eq!(table_count(&conn, "datasource_run"), 1);

    assert!(layout.output_dir().join("files").join("note.yaml").is_file());
    let aggregated = fs::read_to_string(
        layout
            .output_dir()
            .join(crate::project::ALL_RESULTS_FILE_NAME),
    )
    .unwrap();
    assert!(aggregated.contains("# ===== files/note.md ====="));
}

#[test]
fn rebuilding_replaces_rows_without_duplicates() {
    let (dir, layout) = project_with_sources(&[("files/note.md", &long_markdown(700))]);
    let mut conn = open_in_memory().unwrap();
    let provider = StubEmbeddingProvider::new(DIM);
    let service = service_for(&layout, &provider);

    build(&layout, &mut conn, &service, None).unwrap();
    assert_eq!(table_count(&conn, "chunk"), 3);

    fs::write(
        layout.src_dir().join("files").join("note.md"),
        "just one tiny note",
    )
    .unwrap();

    // Run names have second precision; a rebuild in the same second collides.
    std::thread::sleep(std::time::Duration::from_secs(1));
    build(&layout, &mut conn, &service, None).unwrap();

    assert_eq!(table_count(&conn, "chunk"), 1);
    let table_name = crate::shards::build_table_name("tests", "stub:v1", DIM);
    assert_eq!(table_count(&conn, &table_name), 1);
    assert_eq!(table_count(&conn, "run"), 2);
    drop(dir);
}

#[test]
fn one_failing_source_does_not_poison_the_others() {
    let (_dir, layout) = project_with_sources(&[
        ("files/good.md", "healthy content here"),
        (
            "databases/broken.yaml",
            "type: duckdb\nconnection:\n  database: /nonexistent/dir/warehouse.duckdb\n",
        ),
        ("databases/unrouted.yaml", "type: nosuchtype\nname: x\n"),
    ]);
    let mut conn = open_in_memory().unwrap();
    let provider = StubEmbeddingProvider::new(DIM);
    let service = service_for(&layout, &provider);

    let events = RefCell::new(Vec::new());
    let cb = |event: &crate::progress::ProgressEvent| events.borrow_mut().push(event.clone());
    let results = build(&layout, &mut conn, &service, Some(&cb)).unwrap();

    assert_eq!(results.len(), 3);
    let by_id = |id: &str| {
        results
            .iter()
            .find(|r| r.datasource_id.as_str() == id)
            .unwrap()
    };
    assert_eq!(
        by_id("databases/broken.yaml").status,
        crate::progress::DatasourceStatus::Failed
    );
    assert!(by_id("databases/broken.yaml").error.is_some());
    assert_eq!(
        by_id("databases/unrouted.yaml").status,
        crate::progress::DatasourceStatus::Skipped
    );
    assert_eq!(
        by_id("files/good.md").status,
        crate::progress::DatasourceStatus::Ok
    );

    // The healthy source still landed in the store and on disk.
    assert_eq!(table_count(&conn, "chunk"), 1);
    assert!(layout.output_dir().join("files").join("good.yaml").is_file());

    let events = events.borrow();
    let finished = events
        .iter()
        .filter(|e| e.kind == ProgressKind::DatasourceFinished)
        .count();
    assert_eq!(finished, 3);
    let task_finished = events.iter().last().unwrap();
    assert_eq!(task_finished.kind, ProgressKind::TaskFinished);
    assert!(task_finished.message.contains("ok=1"));
    assert!(task_finished.message.contains("failed=1"));
    assert!(task_finished.message.contains("skipped=1"));
}

#[test]
fn reembedding_exported_contexts_restores_the_store() {
    let (_dir, layout) = project_with_sources(&[("files/note.md", "restorable content")]);
    let mut conn = open_in_memory().unwrap();
    let provider = StubEmbeddingProvider::new(DIM);
    let service = service_for(&layout, &provider);

    build(&layout, &mut conn, &service, None).unwrap();
    assert_eq!(table_count(&conn, "chunk"), 1);

    // Wipe the store, then rebuild it from the exported contexts alone.
    let mut fresh = open_in_memory().unwrap();
    let contexts = export::read_all_contexts(&layout.output_dir()).unwrap();
    assert_eq!(contexts.len(), 1);

    let plugins = load_plugins(false).unwrap();
    let chunk_embedding_service =
        ChunkEmbeddingService::new(&provider, None, ChunkEmbeddingMode::EmbeddableTextOnly)
            .unwrap();
    let (ok, failed) =
        export::reembed_contexts(&mut fresh, &plugins, &chunk_embedding_service, &contexts)
            .unwrap();

    assert_eq!((ok, failed), (1, 0));
    assert_eq!(table_count(&fresh, "chunk"), 1);
}
