//! Cached user-place similarity repository.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use mohe_core::{
    CachedSimilarity, Error, PlaceId, Result, SimilarityCache, SimilarityResult, UserId,
};

/// PostgreSQL implementation of SimilarityCache.
#[derive(Clone)]
pub struct PgSimilarityCache {
    pool: Pool<Postgres>,
}

impl PgSimilarityCache {
    /// Create a new PgSimilarityCache with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_cache_row(row: sqlx::postgres::PgRow) -> CachedSimilarity {
        let common: i32 = row.get("common_keyword_count");
        CachedSimilarity {
            user_id: row.get("user_id"),
            place_id: row.get("place_id"),
            result: SimilarityResult {
                cosine: row.get("cosine"),
                jaccard: row.get("jaccard"),
                euclidean: row.get("euclidean"),
                trait_boost_factor: row.get("trait_boost_factor"),
                weighted_similarity: row.get("weighted_similarity"),
                common_keyword_count: common.max(0) as usize,
                keyword_overlap_ratio: row.get("keyword_overlap_ratio"),
            },
            trait_tag: row.get("trait_tag"),
            calculated_at: row.get("calculated_at"),
            user_vector_version: row.get("user_vector_version"),
            place_vector_version: row.get("place_vector_version"),
        }
    }
}

#[async_trait]
impl SimilarityCache for PgSimilarityCache {
    async fn get(&self, user_id: UserId, place_id: PlaceId) -> Result<Option<CachedSimilarity>> {
        let row = sqlx::query(
            "SELECT user_id, place_id, cosine, jaccard, euclidean, trait_boost_factor,
                    weighted_similarity, common_keyword_count, keyword_overlap_ratio,
                    trait_tag, user_vector_version, place_vector_version, calculated_at
             FROM vector_similarity
             WHERE user_id = $1 AND place_id = $2",
        )
        .bind(user_id)
        .bind(place_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_cache_row))
    }

    async fn put(&self, entry: &CachedSimilarity) -> Result<()> {
        let r = &entry.result;
        sqlx::query(
            "INSERT INTO vector_similarity
                 (user_id, place_id, cosine, jaccard, euclidean, trait_boost_factor,
                  weighted_similarity, common_keyword_count, keyword_overlap_ratio,
                  trait_tag, user_vector_version, place_vector_version, calculated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (user_id, place_id) DO UPDATE
             SET cosine = EXCLUDED.cosine,
                 jaccard = EXCLUDED.jaccard,
                 euclidean = EXCLUDED.euclidean,
                 trait_boost_factor = EXCLUDED.trait_boost_factor,
                 weighted_similarity = EXCLUDED.weighted_similarity,
                 common_keyword_count = EXCLUDED.common_keyword_count,
                 keyword_overlap_ratio = EXCLUDED.keyword_overlap_ratio,
                 trait_tag = EXCLUDED.trait_tag,
                 user_vector_version = EXCLUDED.user_vector_version,
                 place_vector_version = EXCLUDED.place_vector_version,
                 calculated_at = EXCLUDED.calculated_at",
        )
        .bind(entry.user_id)
        .bind(entry.place_id)
        .bind(r.cosine)
        .bind(r.jaccard)
        .bind(r.euclidean)
        .bind(r.trait_boost_factor)
        .bind(r.weighted_similarity)
        .bind(r.common_keyword_count as i32)
        .bind(r.keyword_overlap_ratio)
        .bind(entry.trait_tag.as_deref())
        .bind(entry.user_vector_version)
        .bind(entry.place_vector_version)
        .bind(entry.calculated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn invalidate_user(&self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM vector_similarity WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn invalidate_place(&self, place_id: PlaceId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM vector_similarity WHERE place_id = $1")
            .bind(place_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
