use sqlx::{Result as SqlxResult, SqlitePool};
use tracing::instrument;

use crate::db::models::community::CommunityId;

/// Existence records gating the monthly report: one per (community, month).
pub struct MarkerRepository {
    pool: SqlitePool,
}

impl MarkerRepository {
    pub fn new(pool: &SqlitePool) -> Self {
        Self { pool: pool.clone() }
    }

    #[instrument(skip(self))]
    pub async fn exists(&self, community: &CommunityId, year_month: &str) -> SqlxResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM monthly_markers WHERE community = ? AND year_month = ?)",
        )
        .bind(community)
        .bind(year_month)
        .fetch_one(&self.pool)
        .await
    }

    #[instrument(skip(self))]
    pub async fn insert(&self, community: &CommunityId, year_month: &str) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO monthly_markers (community, year_month)
            VALUES (?, ?)
            ON CONFLICT (community, year_month)
            DO NOTHING
            "#,
        )
        .bind(community)
        .bind(year_month)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_marker_existence() {
        let pool = crate::db::in_memory().await.unwrap();
        let repo = MarkerRepository::new(&pool);
        let community = CommunityId::from("guild-1");

        assert!(!repo.exists(&community, "2026-08").await.unwrap());
        repo.insert(&community, "2026-08").await.unwrap();
        repo.insert(&community, "2026-08").await.unwrap();
        assert!(repo.exists(&community, "2026-08").await.unwrap());
        assert!(!repo.exists(&community, "2026-09").await.unwrap());
    }
}
