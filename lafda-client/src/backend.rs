use async_trait::async_trait;

use crate::{
    api::{
        Comment, CommentId, NewComment, NewReaction, NewVote, PostId, Reaction, ReactionSummary,
        User, Vote,
    },
    Error,
};

/// The server, as seen by a logged-in (or anonymous) client
///
/// Implemented over HTTP by `HttpBackend`, and in memory by the mock server.
#[async_trait]
pub trait Backend {
    async fn whoami(&self) -> Result<User, Error>;

    /// Flat list of the comments of `post`, in creation order
    async fn fetch_comments(&self, post: PostId) -> Result<Vec<Comment>, Error>;
    async fn create_comment(&self, comment: NewComment) -> Result<Comment, Error>;
    async fn delete_comment(&self, comment: CommentId) -> Result<(), Error>;

    /// Returns `None` if this toggled off an identical vote
    async fn cast_vote(&self, vote: NewVote) -> Result<Option<Vote>, Error>;
    async fn remove_vote(&self, comment: CommentId) -> Result<(), Error>;

    async fn fetch_reactions(&self, post: PostId) -> Result<ReactionSummary, Error>;

    /// Returns `None` if this toggled off an identical reaction
    async fn react(&self, reaction: NewReaction) -> Result<Option<Reaction>, Error>;
    async fn unreact(&self, post: PostId) -> Result<(), Error>;
}
