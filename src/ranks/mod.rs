use sqlx::{Result as SqlxResult, SqlitePool};
use tracing::instrument;

use crate::db::models::community::CommunityId;
use crate::db::models::member::MemberId;
use crate::db::repositories::experience::ExperienceRepository;

/// One rung of the ladder. Thresholds are strictly increasing and the first
/// entry is zero, so every total maps to a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank {
    pub name: &'static str,
    pub min_xp: i64,
}

pub const LADDER: &[Rank] = &[
    Rank { name: "Bronze", min_xp: 0 },
    Rank { name: "Silver", min_xp: 1_500 },
    Rank { name: "Gold", min_xp: 5_000 },
    Rank { name: "Platinum", min_xp: 12_000 },
    Rank { name: "Diamond", min_xp: 25_000 },
];

/// Index of the highest rung whose threshold does not exceed `xp`.
pub fn highest_threshold(table: &[Rank], xp: i64) -> usize {
    table
        .iter()
        .rposition(|rank| rank.min_xp <= xp)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankUp {
    pub member: MemberId,
    pub old_rank: &'static str,
    pub new_rank: &'static str,
    pub total: i64,
}

pub struct RankLadder {
    table: &'static [Rank],
    experience: ExperienceRepository,
}

impl RankLadder {
    pub fn new(pool: &SqlitePool, table: &'static [Rank]) -> Self {
        Self {
            table,
            experience: ExperienceRepository::new(pool),
        }
    }

    /// Adds `amount` to a member's total and reports a rank-up when the
    /// post-award rung index strictly exceeds the pre-award one. Experience
    /// never decreases, so rank-down cannot occur.
    #[instrument(skip(self))]
    pub async fn award(
        &self,
        community: &CommunityId,
        member: &MemberId,
        amount: i64,
    ) -> SqlxResult<Option<RankUp>> {
        let before = self.experience.get(community, member).await?;
        let old_rank = highest_threshold(self.table, before);

        let total = self.experience.add(community, member, amount).await?;
        let new_rank = highest_threshold(self.table, total);

        if new_rank > old_rank {
            let up = RankUp {
                member: member.clone(),
                old_rank: self.table[old_rank].name,
                new_rank: self.table[new_rank].name,
                total,
            };
            tracing::info!(member = %member, from = up.old_rank, to = up.new_rank, total, "rank up");
            return Ok(Some(up));
        }

        Ok(None)
    }
}
