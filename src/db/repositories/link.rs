use std::sync::LazyLock;

use regex::Regex;
use sqlx::{Result as SqlxResult, SqlitePool};
use tracing::instrument;

use crate::db::models::community::CommunityId;
use crate::db::models::member::MemberId;

/// Matches `somesite.com/@handle` style profile links as well as bare
/// `@handle` mentions in free-form chat text.
static HANDLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:tiktok\.com/@|\B@)([A-Za-z0-9._-]{2,24})").expect("handle pattern compiles")
});

/// Identity link store: external performer handle -> local member, scoped
/// per community.
pub struct LinkRepository {
    pool: SqlitePool,
}

impl LinkRepository {
    pub fn new(pool: &SqlitePool) -> Self {
        Self { pool: pool.clone() }
    }

    /// Upsert; re-linking a handle overwrites the previous member (last
    /// write wins).
    #[instrument(skip(self))]
    pub async fn link(
        &self,
        community: &CommunityId,
        handle: &str,
        member: &MemberId,
    ) -> SqlxResult<()> {
        let handle = normalize(handle);
        sqlx::query(
            r#"
            INSERT INTO links (community, performer_handle, member_id)
            VALUES (?, ?, ?)
            ON CONFLICT (community, performer_handle)
            DO UPDATE SET member_id = excluded.member_id
            "#,
        )
        .bind(community)
        .bind(handle)
        .bind(member)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn member_for(
        &self,
        community: &CommunityId,
        handle: &str,
    ) -> SqlxResult<Option<MemberId>> {
        sqlx::query_scalar::<_, MemberId>(
            "SELECT member_id FROM links WHERE community = ? AND performer_handle = ?",
        )
        .bind(community)
        .bind(normalize(handle))
        .fetch_optional(&self.pool)
        .await
    }

    /// Passive handle-scan over a batch of (author, text) chat messages;
    /// links every handle found in a message to its author. Returns the
    /// number of links written.
    #[instrument(skip(self, messages), fields(message_count = messages.len()))]
    pub async fn scan_messages(
        &self,
        community: &CommunityId,
        messages: &[(MemberId, String)],
    ) -> SqlxResult<usize> {
        let mut linked = 0;
        for (author, text) in messages {
            for capture in HANDLE_RE.captures_iter(text) {
                let handle = capture[1].trim_matches('@');
                self.link(community, handle, author).await?;
                linked += 1;
            }
        }

        tracing::debug!(linked, "handle scan complete");
        Ok(linked)
    }
}

fn normalize(handle: &str) -> &str {
    handle.trim().trim_start_matches('@')
}
