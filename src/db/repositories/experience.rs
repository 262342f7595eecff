use sqlx::{Result as SqlxResult, SqlitePool};
use tracing::instrument;

use crate::db::models::community::CommunityId;
use crate::db::models::member::MemberId;

/// Cumulative experience totals. Records come into existence at zero on the
/// first award; totals only ever grow.
pub struct ExperienceRepository {
    pool: SqlitePool,
}

impl ExperienceRepository {
    pub fn new(pool: &SqlitePool) -> Self {
        Self { pool: pool.clone() }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, community: &CommunityId, member: &MemberId) -> SqlxResult<i64> {
        let xp = sqlx::query_scalar::<_, i64>(
            "SELECT xp FROM experience WHERE community = ? AND member_id = ?",
        )
        .bind(community)
        .bind(member)
        .fetch_optional(&self.pool)
        .await?;

        Ok(xp.unwrap_or_default())
    }

    /// Adds `amount` and returns the new total.
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        community: &CommunityId,
        member: &MemberId,
        amount: i64,
    ) -> SqlxResult<i64> {
        match sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO experience (community, member_id, xp)
            VALUES (?, ?, ?)
            ON CONFLICT (community, member_id)
            DO UPDATE SET xp = experience.xp + excluded.xp
            RETURNING xp
            "#,
        )
        .bind(community)
        .bind(member)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        {
            Ok(total) => Ok(total),
            Err(e) => {
                tracing::error!(error = ?e, "failure during experience update");
                Err(e)
            }
        }
    }
}
