//! Keyword catalog repository (read-only seed data).

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use mohe_core::{Error, KeywordCatalogEntry, KeywordCatalogRepository, Result};

/// PostgreSQL implementation of KeywordCatalogRepository.
#[derive(Clone)]
pub struct PgKeywordCatalogRepository {
    pool: Pool<Postgres>,
}

impl PgKeywordCatalogRepository {
    /// Create a new PgKeywordCatalogRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_keyword_row(row: sqlx::postgres::PgRow) -> KeywordCatalogEntry {
        KeywordCatalogEntry {
            id: row.get("id"),
            keyword: row.get("keyword"),
            category: row.get("category"),
            vector_position: row.get("vector_position"),
        }
    }
}

#[async_trait]
impl KeywordCatalogRepository for PgKeywordCatalogRepository {
    async fn list_all(&self) -> Result<Vec<KeywordCatalogEntry>> {
        let rows = sqlx::query(
            "SELECT id, keyword, category, vector_position
             FROM keyword_catalog
             ORDER BY vector_position",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_keyword_row).collect())
    }

    async fn find_by_keyword(&self, keyword: &str) -> Result<Option<KeywordCatalogEntry>> {
        let row = sqlx::query(
            "SELECT id, keyword, category, vector_position
             FROM keyword_catalog
             WHERE keyword = $1",
        )
        .bind(keyword)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_keyword_row))
    }
}
