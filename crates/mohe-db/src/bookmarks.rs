//! Bookmark graph reads used for co-occurrence signals.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use mohe_core::{Bookmark, BookmarkGraph, Error, PlaceId, Result, UserId};

/// PostgreSQL implementation of BookmarkGraph.
#[derive(Clone)]
pub struct PgBookmarkGraph {
    pool: Pool<Postgres>,
}

impl PgBookmarkGraph {
    /// Create a new PgBookmarkGraph with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Record a bookmark. Idempotent.
    pub async fn add(&self, user_id: UserId, place_id: PlaceId) -> Result<()> {
        sqlx::query(
            "INSERT INTO bookmark (user_id, place_id) VALUES ($1, $2)
             ON CONFLICT (user_id, place_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(place_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Record or replace a user's MBTI.
    pub async fn set_user_mbti(&self, user_id: UserId, mbti: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_mbti (user_id, mbti) VALUES ($1, $2)
             ON CONFLICT (user_id) DO UPDATE SET mbti = EXCLUDED.mbti, updated_at = NOW()",
        )
        .bind(user_id)
        .bind(mbti)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl BookmarkGraph for PgBookmarkGraph {
    async fn bookmarks_for_places(
        &self,
        place_ids: &[PlaceId],
    ) -> Result<HashMap<PlaceId, Vec<Bookmark>>> {
        let mut bookmarks: HashMap<PlaceId, Vec<Bookmark>> =
            place_ids.iter().map(|id| (*id, Vec::new())).collect();
        if place_ids.is_empty() {
            return Ok(bookmarks);
        }

        let rows = sqlx::query(
            "SELECT b.place_id, b.user_id, b.created_at, m.mbti
             FROM bookmark b
             LEFT JOIN user_mbti m ON m.user_id = b.user_id
             WHERE b.place_id = ANY($1)
             ORDER BY b.place_id, b.user_id",
        )
        .bind(place_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        for row in rows {
            let bookmark = Bookmark {
                user_id: row.get("user_id"),
                place_id: row.get("place_id"),
                user_mbti: row.get("mbti"),
                created_at: row.get("created_at"),
            };
            bookmarks.entry(bookmark.place_id).or_default().push(bookmark);
        }
        Ok(bookmarks)
    }

    async fn places_for_user(&self, user_id: UserId) -> Result<Vec<PlaceId>> {
        sqlx::query_scalar("SELECT place_id FROM bookmark WHERE user_id = $1 ORDER BY place_id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn co_bookmarked_places(&self, place_id: PlaceId) -> Result<Vec<PlaceId>> {
        sqlx::query_scalar(
            "SELECT DISTINCT other.place_id
             FROM bookmark target
             JOIN bookmark other ON other.user_id = target.user_id
             WHERE target.place_id = $1 AND other.place_id <> $1
             ORDER BY other.place_id",
        )
        .bind(place_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }
}
