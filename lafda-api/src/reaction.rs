use std::collections::BTreeMap;

use crate::{PostId, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactionType {
    Like,
    Dislike,
    Fire,
    Heart,
    Cry,
}

impl ReactionType {
    pub const ALL: [ReactionType; 5] = [
        ReactionType::Like,
        ReactionType::Dislike,
        ReactionType::Fire,
        ReactionType::Heart,
        ReactionType::Cry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionType::Like => "LIKE",
            ReactionType::Dislike => "DISLIKE",
            ReactionType::Fire => "FIRE",
            ReactionType::Heart => "HEART",
            ReactionType::Cry => "CRY",
        }
    }

    pub fn parse(s: &str) -> Option<ReactionType> {
        ReactionType::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: UserId,
    pub post_id: PostId,
    #[serde(rename = "type")]
    pub reaction_type: ReactionType,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReaction {
    pub post_id: PostId,
    #[serde(rename = "type")]
    pub reaction_type: ReactionType,
}

/// Reaction counts of a post, as seen by one user
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    /// Types with no reaction may be missing
    pub counts: BTreeMap<ReactionType, u64>,
    pub user_reaction: Option<ReactionType>,
}

impl ReactionSummary {
    pub fn count(&self, r: ReactionType) -> u64 {
        self.counts.get(&r).copied().unwrap_or(0)
    }
}
