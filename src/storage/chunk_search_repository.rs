use duckdb::{Connection, params_from_iter};

use crate::shards::validate_table_name;
use crate::storage::dtos::SearchResult;
use crate::storage::embedding_repository::vec_literal;
use crate::storage::error::StorageError;

/// Cosine k-NN over one shard, joined back to the chunk rows. Matches above
/// the distance threshold are dropped; closer is better.
pub fn search_by_similarity(
    conn: &Connection,
    table_name: &str,
    query_vec: &[f32],
    dim: usize,
    max_distance: f64,
    limit: usize,
    datasource_ids: Option<&[String]>,
) -> Result<Vec<SearchResult>, StorageError> {
    validate_table_name(table_name)?;
    if query_vec.len() != dim {
        return Err(StorageError::InvalidInput(format!(
            "query vector has dim={} but the shard expects dim={dim}",
            query_vec.len()
        )));
    }

    let literal = vec_literal(query_vec);
    let mut bindings = vec![literal.clone(), literal];

    let datasource_filter = match datasource_ids {
        Some(ids) if !ids.is_empty() => {
            let placeholders = vec!["?"; ids.len()].join(", ");
            bindings.extend(ids.iter().cloned());
            format!("AND c.datasource_id IN ({placeholders})")
        }
        _ => String::new(),
    };

    let mut statement = conn.prepare(&format!(
        "
        SELECT
          COALESCE(c.display_text, c.embeddable_text) AS display_text,
          c.embeddable_text,
          CAST(array_cosine_distance(e.vec, ?::FLOAT[{dim}]) AS DOUBLE) AS cosine_distance,
          c.full_type,
          c.datasource_id
        FROM {table_name} e
        JOIN chunk c ON e.chunk_id = c.chunk_id
        WHERE CAST(array_cosine_distance(e.vec, ?::FLOAT[{dim}]) AS DOUBLE) < {max_distance}
          {datasource_filter}
        ORDER BY cosine_distance ASC
        LIMIT {limit}
        "
    ))?;

    let mut rows = statement.query(params_from_iter(bindings))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(SearchResult {
            display_text: row.get(0)?,
            embeddable_text: row.get(1)?,
            cosine_distance: row.get(2)?,
            full_type: row.get(3)?,
            datasource_id: row.get(4)?,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shards;
    use crate::storage::{chunk_repository, embedding_repository, open_in_memory};

    fn seeded_shard(conn: &Connection) -> String {
        let table_name = shards::resolve_or_create(conn, "tests", "search:v1", 3).unwrap();

        for (datasource_id, text, vec) in [
            ("files/a.md", "alpha", vec![1.0_f32, 0.0, 0.0]),
            ("files/a.md", "beta", vec![0.0, 1.0, 0.0]),
            ("files/b.md", "gamma", vec![0.0, 0.0, 1.0]),
        ] {
            let chunk =
                chunk_repository::create(conn, "files/md", datasource_id, None, text).unwrap();
            embedding_repository::create(conn, &table_name, chunk.chunk_id, &vec).unwrap();
        }

        table_name
    }

    #[test]
    fn closest_match_ranks_first() {
        let conn = open_in_memory().unwrap();
        let table_name = seeded_shard(&conn);

        let results =
            search_by_similarity(&conn, &table_name, &[0.0, 1.0, 0.0], 3, 0.75, 10, None).unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].embeddable_text, "beta");
        assert!(results[0].cosine_distance < 1e-6);
        for pair in results.windows(2) {
            assert!(pair[0].cosine_distance <= pair[1].cosine_distance);
        }
    }

    #[test]
    fn distance_threshold_filters_far_matches() {
        let conn = open_in_memory().unwrap();
        let table_name = seeded_shard(&conn);

        // Orthogonal vectors sit at distance 1.0, strictly above the cutoff.
        let results =
            search_by_similarity(&conn, &table_name, &[0.0, 1.0, 0.0], 3, 0.75, 10, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].embeddable_text, "beta");
    }

    #[test]
    fn datasource_scoping_limits_the_candidate_set() {
        let conn = open_in_memory().unwrap();
        let table_name = seeded_shard(&conn);

        let scoped = vec!["files/b.md".to_string()];
        let results = search_by_similarity(
            &conn,
            &table_name,
            &[0.0, 0.0, 1.0],
            3,
            0.75,
            10,
            Some(scoped.as_slice()),
        )
        .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].embeddable_text, "gamma");
        assert_eq!(results[0].datasource_id, "files/b.md");
    }

    #[test]
    fn wrong_query_dim_is_rejected() {
        let conn = open_in_memory().unwrap();
        let table_name = seeded_shard(&conn);

        let err =
            search_by_similarity(&conn, &table_name, &[0.0, 1.0], 3, 0.75, 10, None).unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }
}
