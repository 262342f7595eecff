use chrono::{DateTime, Utc};
use sqlx::{Result as SqlxResult, SqlitePool};
use tracing::instrument;

use crate::db::models::community::CommunityId;
use crate::db::models::session::{LiveSession, SessionId};
use crate::db::models::tally::{HandleCount, Metric, TallyRecord};

/// Durable record of broadcast sessions and their per-performer tallies.
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    pub fn new(pool: &SqlitePool) -> Self {
        Self { pool: pool.clone() }
    }

    #[instrument(skip(self, started_at))]
    pub async fn open_session(
        &self,
        community: &CommunityId,
        host_handle: &str,
        started_at: DateTime<Utc>,
    ) -> SqlxResult<LiveSession> {
        let session = LiveSession {
            id: SessionId::generate(),
            community: community.clone(),
            host_handle: host_handle.to_string(),
            started_at,
            ended_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO sessions (id, community, host_handle, started_at, ended_at)
            VALUES (?, ?, ?, ?, NULL)
            "#,
        )
        .bind(&session.id)
        .bind(&session.community)
        .bind(&session.host_handle)
        .bind(session.started_at)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    #[instrument(skip(self, ended_at))]
    pub async fn close_session(
        &self,
        id: &SessionId,
        ended_at: DateTime<Utc>,
    ) -> SqlxResult<()> {
        sqlx::query("UPDATE sessions SET ended_at = ? WHERE id = ?")
            .bind(ended_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Writes the final accumulator state for a session in one transaction.
    /// Rows are inserted in accumulator order so `rowid` preserves
    /// first-seen ordering for roll-up tie-breaks.
    #[instrument(skip(self, rows), fields(row_count = rows.len()))]
    pub async fn insert_tallies(
        &self,
        session: &SessionId,
        community: &CommunityId,
        rows: &[(String, Metric, i64)],
    ) -> SqlxResult<()> {
        let mut tx = self.pool.begin().await?;

        for (handle, metric, count) in rows {
            sqlx::query(
                r#"
                INSERT INTO tallies (session_id, community, performer_handle, metric, count)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(session)
            .bind(community)
            .bind(handle)
            .bind(metric.as_str())
            .bind(count)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn sessions_for(&self, community: &CommunityId) -> SqlxResult<Vec<LiveSession>> {
        sqlx::query_as::<_, LiveSession>(
            r#"
            SELECT id, community, host_handle, started_at, ended_at
            FROM sessions
            WHERE community = ?
            ORDER BY started_at ASC
            "#,
        )
        .bind(community)
        .fetch_all(&self.pool)
        .await
    }

    #[instrument(skip(self))]
    pub async fn tallies_for_session(&self, session: &SessionId) -> SqlxResult<Vec<TallyRecord>> {
        sqlx::query_as::<_, TallyRecord>(
            r#"
            SELECT session_id, community, performer_handle, metric, count
            FROM tallies
            WHERE session_id = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(session)
        .fetch_all(&self.pool)
        .await
    }

    /// Per-performer sums for one metric across a set of sessions, ordered
    /// by earliest persisted row (first-seen across the whole set).
    #[instrument(skip(self, sessions), fields(session_count = sessions.len()))]
    pub async fn sum_by_metric(
        &self,
        sessions: &[SessionId],
        metric: Metric,
    ) -> SqlxResult<Vec<HandleCount>> {
        if sessions.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = sessions.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            r#"
            SELECT performer_handle AS handle, SUM(count) AS total
            FROM tallies
            WHERE metric = ? AND session_id IN ({placeholders})
            GROUP BY performer_handle
            ORDER BY MIN(rowid) ASC
            "#,
        );

        let mut query = sqlx::query_as::<_, HandleCount>(&sql).bind(metric.as_str());
        for id in sessions {
            query = query.bind(id);
        }

        query.fetch_all(&self.pool).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_session_lifecycle_and_sums() {
        let pool = crate::db::in_memory().await.unwrap();
        let repo = LedgerRepository::new(&pool);
        let community = CommunityId::from("guild-1");

        let opened = repo
            .open_session(&community, "hostess", Utc::now())
            .await
            .unwrap();
        assert!(opened.is_open());

        repo.insert_tallies(
            &opened.id,
            &community,
            &[
                ("alice".to_string(), Metric::Gift, 3),
                ("bob".to_string(), Metric::Gift, 1),
                ("alice".to_string(), Metric::Like, 40),
            ],
        )
        .await
        .unwrap();
        repo.close_session(&opened.id, Utc::now()).await.unwrap();

        let sessions = repo.sessions_for(&community).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(!sessions[0].is_open());

        let gifts = repo
            .sum_by_metric(&[opened.id.clone()], Metric::Gift)
            .await
            .unwrap();
        assert_eq!(gifts.len(), 2);
        assert_eq!((gifts[0].handle.as_str(), gifts[0].total), ("alice", 3));
        assert_eq!((gifts[1].handle.as_str(), gifts[1].total), ("bob", 1));

        assert!(
            repo.sum_by_metric(&[], Metric::Like).await.unwrap().is_empty(),
            "empty session set short-circuits"
        );
    }

    #[tokio::test]
    async fn test_sums_span_sessions_in_first_seen_order() {
        let pool = crate::db::in_memory().await.unwrap();
        let repo = LedgerRepository::new(&pool);
        let community = CommunityId::from("guild-1");

        let s1 = repo
            .open_session(&community, "hostess", Utc::now())
            .await
            .unwrap();
        repo.insert_tallies(
            &s1.id,
            &community,
            &[
                ("bob".to_string(), Metric::Gift, 2),
                ("alice".to_string(), Metric::Gift, 2),
            ],
        )
        .await
        .unwrap();

        let s2 = repo
            .open_session(&community, "hostess", Utc::now())
            .await
            .unwrap();
        repo.insert_tallies(&s2.id, &community, &[("alice".to_string(), Metric::Gift, 1)])
            .await
            .unwrap();

        let sums = repo
            .sum_by_metric(&[s1.id.clone(), s2.id.clone()], Metric::Gift)
            .await
            .unwrap();

        // bob was seen first even though alice now out-totals him
        assert_eq!((sums[0].handle.as_str(), sums[0].total), ("bob", 2));
        assert_eq!((sums[1].handle.as_str(), sums[1].total), ("alice", 3));
    }
}
