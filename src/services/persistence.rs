use duckdb::Connection;
use tracing::debug;

use crate::services::ChunkEmbedding;
use crate::shards::validate_table_name;
use crate::storage::error::StorageError;
use crate::storage::{chunk_repository, embedding_repository, with_transaction};

/// Atomically persist chunks and their vectors into a shard.
///
/// With `override_existing`, rows for the datasource are purged first. The
/// purge runs outside the transaction: the store's FK checks misbehave when
/// related rows are deleted and re-inserted inside one transaction, and
/// cascade deletes are not available, so re-ingest is a two-phase protocol.
/// Shard rows go first because the foreign key points embedding → chunk.
pub fn write_chunks_and_embeddings(
    conn: &mut Connection,
    chunk_embeddings: &[ChunkEmbedding],
    table_name: &str,
    full_type: &str,
    datasource_id: &str,
    dim: usize,
    override_existing: bool,
) -> Result<(), StorageError> {
    if chunk_embeddings.is_empty() {
        return Err(StorageError::InvalidInput(
            "chunk_embeddings must be non-empty".to_string(),
        ));
    }
    validate_table_name(table_name)?;
    if let Some(bad) = chunk_embeddings.iter().find(|ce| ce.vec.len() != dim) {
        return Err(StorageError::InvalidInput(format!(
            "vector has dim={} but the shard expects dim={dim}",
            bad.vec.len()
        )));
    }

    if override_existing {
        let embeddings_deleted =
            embedding_repository::delete_by_datasource_id(conn, table_name, datasource_id)?;
        let chunks_deleted = chunk_repository::delete_by_datasource_id(conn, datasource_id)?;
        debug!(
            datasource_id,
            embeddings_deleted, chunks_deleted, "purged previous rows for datasource"
        );
    }

    with_transaction(conn, |tx| {
        let chunk_contents = chunk_embeddings
            .iter()
            .map(|ce| (ce.chunk.embeddable_text.clone(), Some(ce.display_text.clone())))
            .collect::<Vec<(String, Option<String>)>>();

        let chunk_ids = chunk_repository::bulk_insert(tx, full_type, datasource_id, &chunk_contents)?;

        let vecs = chunk_embeddings
            .iter()
            .map(|ce| ce.vec.clone())
            .collect::<Vec<Vec<f32>>>();

        embedding_repository::bulk_insert(tx, table_name, &chunk_ids, &vecs, dim)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pluginlib::EmbeddableChunk;
    use crate::shards;
    use crate::storage::{embedding_repository, open_in_memory};

    fn chunk_embedding(text: &str, vec: Vec<f32>) -> ChunkEmbedding {
        ChunkEmbedding {
            chunk: EmbeddableChunk {
                embeddable_text: text.to_string(),
                content: serde_yaml::Value::String(text.to_string()),
            },
            vec,
            display_text: text.to_string(),
            generated_description: String::new(),
        }
    }

    fn chunk_count(conn: &Connection, datasource_id: &str) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM chunk WHERE datasource_id = ?",
            [datasource_id],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn writes_chunks_and_vectors_together() {
        let mut conn = open_in_memory().unwrap();
        let table_name = shards::resolve_or_create(&conn, "tests", "persist:v1", 2).unwrap();

        let embeddings = vec![
            chunk_embedding("alpha", vec![1.0, 0.0]),
            chunk_embedding("beta", vec![0.0, 1.0]),
        ];
        write_chunks_and_embeddings(
            &mut conn,
            &embeddings,
            &table_name,
            "files/md",
            "files/a.md",
            2,
            false,
        )
        .unwrap();

        assert_eq!(chunk_count(&conn, "files/a.md"), 2);
        assert_eq!(embedding_repository::count(&conn, &table_name).unwrap(), 2);
    }

    #[test]
    fn empty_input_is_rejected() {
        let mut conn = open_in_memory().unwrap();
        let table_name = shards::resolve_or_create(&conn, "tests", "persist:v1", 2).unwrap();

        let err = write_chunks_and_embeddings(
            &mut conn,
            &[],
            &table_name,
            "files/md",
            "files/a.md",
            2,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[test]
    fn override_replaces_previous_rows_without_duplicates() {
        let mut conn = open_in_memory().unwrap();
        let table_name = shards::resolve_or_create(&conn, "tests", "persist:v1", 2).unwrap();

        let first = vec![
            chunk_embedding("alpha", vec![1.0, 0.0]),
            chunk_embedding("beta", vec![0.0, 1.0]),
            chunk_embedding("gamma", vec![0.5, 0.5]),
        ];
        write_chunks_and_embeddings(
            &mut conn,
            &first,
            &table_name,
            "files/md",
            "files/a.md",
            2,
            true,
        )
        .unwrap();

        let second = vec![chunk_embedding("delta", vec![0.3, 0.7])];
        write_chunks_and_embeddings(
            &mut conn,
            &second,
            &table_name,
            "files/md",
            "files/a.md",
            2,
            true,
        )
        .unwrap();

        assert_eq!(chunk_count(&conn, "files/a.md"), 1);
        assert_eq!(embedding_repository::count(&conn, &table_name).unwrap(), 1);

        // No orphan shard rows after the purge.
        let orphans: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM {table_name} e WHERE e.chunk_id NOT IN (SELECT chunk_id FROM chunk)"
                ),
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn override_leaves_other_datasources_alone() {
        let mut conn = open_in_memory().unwrap();
        let table_name = shards::resolve_or_create(&conn, "tests", "persist:v1", 2).unwrap();

        let other = vec![chunk_embedding("other", vec![1.0, 0.0])];
        write_chunks_and_embeddings(
            &mut conn,
            &other,
            &table_name,
            "files/md",
            "files/b.md",
            2,
            true,
        )
        .unwrap();

        let replaced = vec![chunk_embedding("mine", vec![0.0, 1.0])];
        write_chunks_and_embeddings(
            &mut conn,
            &replaced,
            &table_name,
            "files/md",
            "files/a.md",
            2,
            true,
        )
        .unwrap();

        assert_eq!(chunk_count(&conn, "files/b.md"), 1);
        assert_eq!(chunk_count(&conn, "files/a.md"), 1);
    }

    #[test]
    fn failed_insert_rolls_back_all_chunks() {
        let mut conn = open_in_memory().unwrap();
        let table_name = shards::resolve_or_create(&conn, "tests", "persist:v1", 2).unwrap();

        // Second vector has the wrong length; bulk validation refuses the
        // whole batch before anything is written.
        let embeddings = vec![
            chunk_embedding("alpha", vec![1.0, 0.0]),
            chunk_embedding("beta", vec![0.0, 1.0, 0.5]),
        ];
        let err = write_chunks_and_embeddings(
            &mut conn,
            &embeddings,
            &table_name,
            "files/md",
            "files/a.md",
            2,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));

        assert_eq!(chunk_count(&conn, "files/a.md"), 0);
        assert_eq!(embedding_repository::count(&conn, &table_name).unwrap(), 0);
    }
}
