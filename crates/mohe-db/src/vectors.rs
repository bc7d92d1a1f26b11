//! Preference and description vector repository.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};

use mohe_core::{
    DescriptionVector, Error, PlaceId, PreferenceVector, Result, SelectedKeyword, UserId,
    VectorStore,
};

/// PostgreSQL + pgvector implementation of VectorStore.
#[derive(Clone)]
pub struct PgVectorStore {
    pool: Pool<Postgres>,
}

impl PgVectorStore {
    /// Create a new PgVectorStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_preference_row(row: sqlx::postgres::PgRow) -> PreferenceVector {
        let vector: Vector = row.get("vector");
        let keywords: Json<Vec<SelectedKeyword>> = row.get("selected_keywords");
        PreferenceVector {
            user_id: row.get("user_id"),
            version: row.get("version"),
            vector: vector.to_vec(),
            selected_keywords: keywords.0,
            model_name: row.get("model_name"),
            model_version: row.get("model_version"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn parse_description_row(row: sqlx::postgres::PgRow) -> DescriptionVector {
        let vector: Vector = row.get("vector");
        let keywords: Json<Vec<SelectedKeyword>> = row.get("selected_keywords");
        DescriptionVector {
            place_id: row.get("place_id"),
            version: row.get("version"),
            vector: vector.to_vec(),
            selected_keywords: keywords.0,
            model_name: row.get("model_name"),
            model_version: row.get("model_version"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn get_preference_vector(&self, user_id: UserId) -> Result<Option<PreferenceVector>> {
        let row = sqlx::query(
            "SELECT user_id, version, vector, selected_keywords, model_name, model_version,
                    created_at, updated_at
             FROM user_preference_vector
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_preference_row))
    }

    async fn get_description_vector(
        &self,
        place_id: PlaceId,
    ) -> Result<Option<DescriptionVector>> {
        let row = sqlx::query(
            "SELECT place_id, version, vector, selected_keywords, model_name, model_version,
                    created_at, updated_at
             FROM place_description_vector
             WHERE place_id = $1",
        )
        .bind(place_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_description_row))
    }

    async fn get_description_vectors(
        &self,
        place_ids: &[PlaceId],
    ) -> Result<Vec<DescriptionVector>> {
        if place_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT place_id, version, vector, selected_keywords, model_name, model_version,
                    created_at, updated_at
             FROM place_description_vector
             WHERE place_id = ANY($1)
             ORDER BY place_id",
        )
        .bind(place_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_description_row).collect())
    }

    async fn upsert_preference_vector(&self, vector: &PreferenceVector) -> Result<i64> {
        let version: i64 = sqlx::query_scalar(
            "INSERT INTO user_preference_vector
                 (user_id, version, vector, selected_keywords, model_name, model_version,
                  created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (user_id) DO UPDATE
             SET version = user_preference_vector.version + 1,
                 vector = EXCLUDED.vector,
                 selected_keywords = EXCLUDED.selected_keywords,
                 model_name = EXCLUDED.model_name,
                 model_version = EXCLUDED.model_version,
                 updated_at = EXCLUDED.updated_at
             RETURNING version",
        )
        .bind(vector.user_id)
        .bind(vector.version)
        .bind(Vector::from(vector.vector.clone()))
        .bind(Json(&vector.selected_keywords))
        .bind(&vector.model_name)
        .bind(&vector.model_version)
        .bind(vector.created_at)
        .bind(vector.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(version)
    }

    async fn upsert_description_vector(&self, vector: &DescriptionVector) -> Result<i64> {
        let version: i64 = sqlx::query_scalar(
            "INSERT INTO place_description_vector
                 (place_id, version, vector, selected_keywords, model_name, model_version,
                  created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (place_id) DO UPDATE
             SET version = place_description_vector.version + 1,
                 vector = EXCLUDED.vector,
                 selected_keywords = EXCLUDED.selected_keywords,
                 model_name = EXCLUDED.model_name,
                 model_version = EXCLUDED.model_version,
                 updated_at = EXCLUDED.updated_at
             RETURNING version",
        )
        .bind(vector.place_id)
        .bind(vector.version)
        .bind(Vector::from(vector.vector.clone()))
        .bind(Json(&vector.selected_keywords))
        .bind(&vector.model_name)
        .bind(&vector.model_version)
        .bind(vector.created_at)
        .bind(vector.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(version)
    }

    async fn list_described_place_ids(&self) -> Result<Vec<PlaceId>> {
        sqlx::query_scalar("SELECT place_id FROM place_description_vector ORDER BY place_id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn described_place_ids_in_range(
        &self,
        start: PlaceId,
        end: PlaceId,
    ) -> Result<Vec<PlaceId>> {
        sqlx::query_scalar(
            "SELECT place_id FROM place_description_vector
             WHERE place_id BETWEEN $1 AND $2
             ORDER BY place_id",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn count_described_places(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM place_description_vector")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn described_place_id_bounds(&self) -> Result<Option<(PlaceId, PlaceId)>> {
        let row = sqlx::query(
            "SELECT MIN(place_id) AS min_id, MAX(place_id) AS max_id FROM place_description_vector",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let min_id: Option<i64> = row.get("min_id");
        let max_id: Option<i64> = row.get("max_id");
        Ok(min_id.zip(max_id))
    }
}
