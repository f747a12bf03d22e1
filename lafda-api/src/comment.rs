use uuid::Uuid;

use crate::{Error, PostId, Time, UserId, VoteType};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    /// Fresh id for a comment that the server has not acknowledged yet
    pub fn placeholder() -> CommentId {
        CommentId(Uuid::new_v4())
    }
}

/// Denormalized summary of a comment's author
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<String>,
}

/// A comment as returned by the server: flat, replies are only linked
/// through `parent_id`
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub content: String,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub created_at: Time,
    pub user: Author,

    pub upvotes: u32,
    pub downvotes: u32,

    /// The requesting user's own vote, if any
    pub user_vote: Option<VoteType>,

    /// Number of direct replies
    #[serde(default)]
    pub reply_count: u32,
}

impl Comment {
    pub fn score(&self) -> i64 {
        i64::from(self.upvotes) - i64::from(self.downvotes)
    }

    pub fn mentions(&self) -> Vec<String> {
        crate::mentions(&self.content)
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub post_id: PostId,
    pub content: String,
    pub parent_id: Option<CommentId>,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_content(&self.content)
    }
}
