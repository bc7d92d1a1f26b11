//! Place neighbor list repository.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use mohe_core::{Error, PlaceId, Result, TopKEntry, TopKStore};

/// PostgreSQL implementation of TopKStore.
#[derive(Clone)]
pub struct PgTopKStore {
    pool: Pool<Postgres>,
}

impl PgTopKStore {
    /// Create a new PgTopKStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_topk_row(row: sqlx::postgres::PgRow) -> TopKEntry {
        TopKEntry {
            place_id: row.get("place_id"),
            neighbor_place_id: row.get("neighbor_place_id"),
            rank: row.get("rank"),
            jaccard: row.get("jaccard"),
            cosine_bin: row.get("cosine_bin"),
            description_cosine_bin: row.get("description_cosine_bin"),
            co_occurrence_count: row.get("co_occurrence_count"),
            score: row.get("score"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl TopKStore for PgTopKStore {
    async fn replace_for_place(&self, place_id: PlaceId, entries: &[TopKEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Serialise concurrent replacements of one place until commit.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(place_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query("DELETE FROM place_similarity_topk WHERE place_id = $1")
            .bind(place_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        for entry in entries {
            sqlx::query(
                "INSERT INTO place_similarity_topk
                     (place_id, neighbor_place_id, rank, jaccard, cosine_bin,
                      description_cosine_bin, co_occurrence_count, score, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(place_id)
            .bind(entry.neighbor_place_id)
            .bind(entry.rank)
            .bind(entry.jaccard)
            .bind(entry.cosine_bin)
            .bind(entry.description_cosine_bin)
            .bind(entry.co_occurrence_count)
            .bind(entry.score)
            .bind(entry.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn get_for_place(&self, place_id: PlaceId) -> Result<Vec<TopKEntry>> {
        let rows = sqlx::query(
            "SELECT place_id, neighbor_place_id, rank, jaccard, cosine_bin,
                    description_cosine_bin, co_occurrence_count, score, updated_at
             FROM place_similarity_topk
             WHERE place_id = $1
             ORDER BY rank",
        )
        .bind(place_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_topk_row).collect())
    }
}
