use chrono::Utc;

use crate::{
    api::{Author, Comment, CommentId, NewComment, NewVote, PostId, Time, User, VoteType},
    Backend, Error, Forest, Optimistic, VoteChange,
};

#[derive(Clone, Debug)]
pub struct SectionConfig {
    /// How long after a vote the whole section gets refetched
    pub revalidate_after: chrono::Duration,
}

impl Default for SectionConfig {
    fn default() -> SectionConfig {
        SectionConfig {
            revalidate_after: chrono::Duration::seconds(1),
        }
    }
}

/// The comment section of one post, as displayed to one viewer
///
/// Every mutation is applied locally first, then sent to the backend. If the
/// backend refuses it, the local state goes back to what it was and the error
/// is kept for display in `last_error`.
pub struct CommentSection<B> {
    backend: B,
    post: PostId,
    viewer: Option<User>,
    config: SectionConfig,
    forest: Forest,
    revalidate_at: Option<Time>,
    last_error: Option<String>,
}

impl<B: Backend> CommentSection<B> {
    pub fn new(
        backend: B,
        post: PostId,
        viewer: Option<User>,
        config: SectionConfig,
    ) -> CommentSection<B> {
        CommentSection {
            backend,
            post,
            viewer,
            config,
            forest: Forest::default(),
            revalidate_at: None,
            last_error: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn post(&self) -> PostId {
        self.post
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn revalidation_due_at(&self) -> Option<Time> {
        self.revalidate_at
    }

    /// Whether the reply and vote controls should be enabled
    pub fn can_write(&self) -> bool {
        matches!(&self.viewer, Some(u) if !u.banned)
    }

    /// Whether the delete control should be enabled for `comment`
    pub fn can_delete(&self, comment: &Comment) -> bool {
        match &self.viewer {
            Some(u) if !u.banned => u.id == comment.user.id || u.is_admin(),
            _ => false,
        }
    }

    fn fail(&mut self, action: &str, err: Error) -> Error {
        tracing::warn!(%err, post = ?self.post, "{action} failed");
        self.last_error = Some(format!("{action} failed: {err}"));
        err
    }

    /// Replaces the local state with the server's
    pub async fn load(&mut self) -> Result<(), Error> {
        self.last_error = None;
        match self.backend.fetch_comments(self.post).await {
            Ok(comments) => {
                tracing::debug!(post = ?self.post, num = comments.len(), "fetched comments");
                self.forest = Forest::build(comments);
                self.revalidate_at = None;
                Ok(())
            }
            Err(e) => Err(self.fail("loading comments", e)),
        }
    }

    /// Refetches everything if a revalidation was scheduled before `now`
    ///
    /// Returns whether a refetch happened.
    pub async fn revalidate_if_due(&mut self, now: Time) -> Result<bool, Error> {
        match self.revalidate_at {
            Some(at) if at <= now => self.load().await.map(|()| true),
            _ => Ok(false),
        }
    }

    /// Posts a comment, or a reply to `parent`, returning its id
    pub async fn submit(
        &mut self,
        content: String,
        parent: Option<CommentId>,
    ) -> Result<CommentId, Error> {
        self.last_error = None;
        let author = match &self.viewer {
            Some(u) if !u.banned => Author {
                id: u.id,
                name: u.name.clone(),
                avatar: u.avatar.clone(),
            },
            _ => return Err(Error::permission_denied()),
        };
        let new = NewComment {
            post_id: self.post,
            content,
            parent_id: parent,
        };
        new.validate()?;

        let placeholder = Comment {
            id: CommentId::placeholder(),
            content: new.content.clone(),
            post_id: self.post,
            parent_id: parent,
            created_at: Utc::now(),
            user: author,
            upvotes: 0,
            downvotes: 0,
            user_vote: None,
            reply_count: 0,
        };
        let placeholder_id = placeholder.id;
        let (pending, ()) = Optimistic::apply(&mut self.forest, |f| {
            *f = std::mem::take(f).insert(placeholder)
        });
        tracing::debug!(?placeholder_id, ?parent, "submitting comment");
        match self.backend.create_comment(new).await {
            Ok(comment) => {
                let id = comment.id;
                pending.commit_with(|f| *f = std::mem::take(f).replace(placeholder_id, comment));
                Ok(id)
            }
            Err(e) => {
                pending.rollback();
                Err(self.fail("posting comment", e))
            }
        }
    }

    /// Deletes a comment along with all its replies
    pub async fn delete(&mut self, id: CommentId) -> Result<(), Error> {
        self.last_error = None;
        let comment = match self.forest.find(id) {
            Some(node) => &node.comment,
            None => return Err(Error::not_found(id.0)),
        };
        if !self.can_delete(comment) {
            return Err(Error::permission_denied());
        }
        let (pending, removed) = Optimistic::apply(&mut self.forest, |f| {
            let (rest, removed) = std::mem::take(f).remove(id);
            *f = rest;
            removed.map(|r| r.len()).unwrap_or(0)
        });
        tracing::debug!(?id, removed, "deleting comment");
        match self.backend.delete_comment(id).await {
            Ok(()) => {
                pending.commit();
                Ok(())
            }
            Err(e) => {
                pending.rollback();
                Err(self.fail("deleting comment", e))
            }
        }
    }

    /// Toggles the viewer's vote on a comment, then schedules a revalidation
    pub async fn vote(&mut self, id: CommentId, requested: VoteType) -> Result<(), Error> {
        self.last_error = None;
        if !self.can_write() {
            return Err(Error::permission_denied());
        }
        let (pending, change) = Optimistic::apply(&mut self.forest, |f| {
            let (forest, change) = std::mem::take(f).vote(id, requested);
            *f = forest;
            change
        });
        let change = match change {
            Some(change) => change,
            None => {
                pending.rollback();
                return Err(Error::not_found(id.0));
            }
        };
        tracing::debug!(?id, ?change, "voting");
        let res = match change {
            VoteChange::Cast(vote_type) => self
                .backend
                .cast_vote(NewVote {
                    comment_id: id,
                    vote_type,
                })
                .await
                .map(|vote| vote.is_some()),
            VoteChange::Removed => self.backend.remove_vote(id).await.map(|()| true),
        };
        match res {
            Ok(true) => {
                pending.commit();
                self.revalidate_at = Some(Utc::now() + self.config.revalidate_after);
                Ok(())
            }
            Ok(false) => {
                // the server already had this vote and toggled it off
                tracing::debug!(?id, "server toggled off our vote, revalidating now");
                pending.commit_with(|f| {
                    *f = std::mem::take(f).vote(id, requested).0;
                });
                self.revalidate_at = Some(Utc::now());
                Ok(())
            }
            Err(e) => {
                pending.rollback();
                Err(self.fail("voting", e))
            }
        }
    }
}
