use crate::{CommentId, UserId};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteType {
    Upvote,
    Downvote,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Upvote => "UPVOTE",
            VoteType::Downvote => "DOWNVOTE",
        }
    }

    pub fn parse(s: &str) -> Option<VoteType> {
        match s {
            "UPVOTE" => Some(VoteType::Upvote),
            "DOWNVOTE" => Some(VoteType::Downvote),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub user_id: UserId,
    pub comment_id: CommentId,
    #[serde(rename = "type")]
    pub vote_type: VoteType,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVote {
    pub comment_id: CommentId,
    #[serde(rename = "type")]
    pub vote_type: VoteType,
}
