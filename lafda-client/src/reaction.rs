use std::collections::BTreeMap;

use crate::{
    api::{NewReaction, PostId, ReactionSummary, ReactionType, User},
    Backend, Error, Optimistic,
};

/// What the server must be told after a local reaction toggle
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReactionChange {
    Set(ReactionType),
    Cleared,
}

/// Reaction counts of a post, with the viewer's own reaction
///
/// Every reaction type always has a count, possibly 0.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReactionBoard {
    counts: BTreeMap<ReactionType, u64>,
    user_reaction: Option<ReactionType>,
}

impl Default for ReactionBoard {
    fn default() -> ReactionBoard {
        ReactionBoard::from(ReactionSummary::default())
    }
}

impl From<ReactionSummary> for ReactionBoard {
    fn from(s: ReactionSummary) -> ReactionBoard {
        ReactionBoard {
            counts: ReactionType::ALL
                .into_iter()
                .map(|r| (r, s.count(r)))
                .collect(),
            user_reaction: s.user_reaction,
        }
    }
}

impl ReactionBoard {
    pub fn count(&self, r: ReactionType) -> u64 {
        self.counts.get(&r).copied().unwrap_or(0)
    }

    pub fn user_reaction(&self) -> Option<ReactionType> {
        self.user_reaction
    }

    /// Applies the viewer's click on the `requested` reaction
    ///
    /// A viewer has at most one reaction per post: clicking the current one
    /// clears it, clicking another one moves it.
    pub fn toggle(&mut self, requested: ReactionType) -> ReactionChange {
        let previous = self.user_reaction.take();
        if let Some(previous) = previous {
            let count = self.counts.entry(previous).or_insert(0);
            *count = count.saturating_sub(1);
        }
        if previous == Some(requested) {
            return ReactionChange::Cleared;
        }
        *self.counts.entry(requested).or_insert(0) += 1;
        self.user_reaction = Some(requested);
        ReactionChange::Set(requested)
    }

    pub fn summary(&self) -> ReactionSummary {
        ReactionSummary {
            counts: self.counts.clone(),
            user_reaction: self.user_reaction,
        }
    }
}

/// The reaction bar of one post, as displayed to one viewer
pub struct PostReactions<B> {
    backend: B,
    post: PostId,
    viewer: Option<User>,
    board: ReactionBoard,
    last_error: Option<String>,
}

impl<B: Backend> PostReactions<B> {
    pub fn new(backend: B, post: PostId, viewer: Option<User>) -> PostReactions<B> {
        PostReactions {
            backend,
            post,
            viewer,
            board: ReactionBoard::default(),
            last_error: None,
        }
    }

    pub fn board(&self) -> &ReactionBoard {
        &self.board
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub async fn load(&mut self) -> Result<(), Error> {
        self.last_error = None;
        match self.backend.fetch_reactions(self.post).await {
            Ok(summary) => {
                self.board = ReactionBoard::from(summary);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%e, post = ?self.post, "fetching reactions failed");
                self.last_error = Some(format!("loading reactions failed: {e}"));
                Err(e)
            }
        }
    }

    pub async fn toggle(&mut self, requested: ReactionType) -> Result<ReactionChange, Error> {
        self.last_error = None;
        if !matches!(&self.viewer, Some(u) if !u.banned) {
            return Err(Error::permission_denied());
        }
        let (pending, change) = Optimistic::apply(&mut self.board, |b| b.toggle(requested));
        tracing::debug!(post = ?self.post, ?change, "reacting");
        let res = match change {
            ReactionChange::Set(reaction_type) => self
                .backend
                .react(NewReaction {
                    post_id: self.post,
                    reaction_type,
                })
                .await
                .map(|reaction| reaction.is_some()),
            ReactionChange::Cleared => self.backend.unreact(self.post).await.map(|()| true),
        };
        match res {
            Ok(true) => {
                pending.commit();
                Ok(change)
            }
            Ok(false) => {
                // the server already had this reaction and toggled it off
                tracing::debug!(post = ?self.post, "server toggled off our reaction, reloading");
                pending.commit_with(|b| {
                    b.toggle(requested);
                });
                match self.backend.fetch_reactions(self.post).await {
                    Ok(summary) => self.board = ReactionBoard::from(summary),
                    Err(e) => tracing::warn!(%e, post = ?self.post, "reloading reactions failed"),
                }
                Ok(ReactionChange::Cleared)
            }
            Err(e) => {
                pending.rollback();
                tracing::warn!(%e, post = ?self.post, "reacting failed");
                self.last_error = Some(format!("reacting failed: {e}"));
                Err(e)
            }
        }
    }
}
