use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;

pub mod models;
pub mod repositories;

pub mod prelude {
    pub use super::models::{
        CommunityConfig, CommunityId, HandleCount, LiveSession, MemberId, Metric, SessionId,
        TallyRecord,
    };
    pub use super::repositories::community::CommunityRepository;
    pub use super::repositories::experience::ExperienceRepository;
    pub use super::repositories::ledger::LedgerRepository;
    pub use super::repositories::link::LinkRepository;
    pub use super::repositories::marker::MarkerRepository;
}

pub type DbResult<T> = core::result::Result<T, DbErr>;

#[derive(Debug, Error)]
pub enum DbErr {
    #[error("sqlx error: {0}")]
    SqlxError(#[from] sqlx::Error),
}

pub async fn connect(url: &str) -> DbResult<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Ephemeral database for tests and dry runs. Pinned to a single pooled
/// connection; every `:memory:` connection is its own database.
pub async fn in_memory() -> DbResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> DbResult<()> {
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(pool).await?;
    }

    tracing::debug!(statements = SCHEMA.len(), "schema ensured");
    Ok(())
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS communities (
        id              TEXT PRIMARY KEY,
        source_handle   TEXT,
        report_channel  TEXT,
        timezone        TEXT NOT NULL DEFAULT 'Etc/UTC',
        weekly_day      INTEGER NOT NULL DEFAULT 6,
        weekly_hour     INTEGER NOT NULL DEFAULT 19,
        weekly_minute   INTEGER NOT NULL DEFAULT 0,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id           TEXT PRIMARY KEY,
        community    TEXT NOT NULL,
        host_handle  TEXT NOT NULL,
        started_at   TEXT NOT NULL,
        ended_at     TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_sessions_community ON sessions (community)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tallies (
        session_id        TEXT NOT NULL,
        community         TEXT NOT NULL,
        performer_handle  TEXT NOT NULL,
        metric            TEXT NOT NULL,
        count             INTEGER NOT NULL,
        PRIMARY KEY (session_id, performer_handle, metric)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS links (
        community         TEXT NOT NULL,
        performer_handle  TEXT NOT NULL,
        member_id         TEXT NOT NULL,
        PRIMARY KEY (community, performer_handle)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS experience (
        community  TEXT NOT NULL,
        member_id  TEXT NOT NULL,
        xp         INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (community, member_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS monthly_markers (
        community   TEXT NOT NULL,
        year_month  TEXT NOT NULL,
        PRIMARY KEY (community, year_month)
    )
    "#,
];

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let pool = in_memory().await.unwrap();
        migrate(&pool).await.unwrap();
        migrate(&pool).await.unwrap();
    }
}
