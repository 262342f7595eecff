use chrono::Utc;
use sqlx::{Result as SqlxResult, SqlitePool};
use tracing::instrument;

use crate::db::models::community::{CommunityConfig, CommunityId};

pub struct CommunityRepository {
    pool: SqlitePool,
}

impl CommunityRepository {
    pub fn new(pool: &SqlitePool) -> Self {
        Self { pool: pool.clone() }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &CommunityId) -> SqlxResult<Option<CommunityConfig>> {
        sqlx::query_as::<_, CommunityConfig>(
            r#"
            SELECT
                id,
                source_handle,
                report_channel,
                timezone,
                weekly_day,
                weekly_hour,
                weekly_minute,
                created_at,
                updated_at
            FROM communities
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Existing config, or a fresh default row that has not been persisted
    /// yet. Communities come into existence on their first configuration
    /// write, so the default is only stored once the caller upserts it.
    #[instrument(skip(self, default_tz))]
    pub async fn get_or_default(
        &self,
        id: &CommunityId,
        default_tz: &str,
    ) -> SqlxResult<CommunityConfig> {
        Ok(self
            .get(id)
            .await?
            .unwrap_or_else(|| CommunityConfig::new(id.clone(), default_tz)))
    }

    #[instrument(skip(self, cfg), fields(community = %cfg.id))]
    pub async fn upsert(&self, cfg: &CommunityConfig) -> SqlxResult<()> {
        match sqlx::query(
            r#"
            INSERT INTO communities (
                id,
                source_handle,
                report_channel,
                timezone,
                weekly_day,
                weekly_hour,
                weekly_minute,
                created_at,
                updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id)
            DO UPDATE SET
                source_handle = excluded.source_handle,
                report_channel = excluded.report_channel,
                timezone = excluded.timezone,
                weekly_day = excluded.weekly_day,
                weekly_hour = excluded.weekly_hour,
                weekly_minute = excluded.weekly_minute,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&cfg.id)
        .bind(&cfg.source_handle)
        .bind(&cfg.report_channel)
        .bind(&cfg.timezone)
        .bind(cfg.weekly_day)
        .bind(cfg.weekly_hour)
        .bind(cfg.weekly_minute)
        .bind(cfg.created_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(error = ?e, "failure during community config upsert");
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn all(&self) -> SqlxResult<Vec<CommunityConfig>> {
        sqlx::query_as::<_, CommunityConfig>(
            r#"
            SELECT
                id,
                source_handle,
                report_channel,
                timezone,
                weekly_day,
                weekly_hour,
                weekly_minute,
                created_at,
                updated_at
            FROM communities
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_upsert_roundtrip() {
        let pool = crate::db::in_memory().await.unwrap();
        let repo = CommunityRepository::new(&pool);
        let id = CommunityId::from("guild-1");

        assert!(repo.get(&id).await.unwrap().is_none());

        let mut cfg = repo.get_or_default(&id, "Etc/UTC").await.unwrap();
        cfg.source_handle = Some("hostess".to_string());
        cfg.report_channel = Some("chan-9".to_string());
        repo.upsert(&cfg).await.unwrap();

        let stored = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.source_handle.as_deref(), Some("hostess"));
        assert_eq!(stored.weekly_day, 6);

        cfg.timezone = "Australia/Sydney".to_string();
        repo.upsert(&cfg).await.unwrap();
        let stored = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.timezone, "Australia/Sydney");
        assert_eq!(repo.all().await.unwrap().len(), 1);
    }
}
