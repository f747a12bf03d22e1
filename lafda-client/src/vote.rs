use crate::api::{Comment, VoteType};

/// What the server must be told after a local vote toggle
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VoteChange {
    Cast(VoteType),
    Removed,
}

fn counter(c: &mut Comment, t: VoteType) -> &mut u32 {
    match t {
        VoteType::Upvote => &mut c.upvotes,
        VoteType::Downvote => &mut c.downvotes,
    }
}

/// Applies the viewer's click on the `requested` vote button
///
/// Voting the same way twice removes the vote, voting the other way moves it.
/// Counters saturate at 0, so that a comment fetched with stale counts can not
/// underflow.
pub fn toggle_vote(c: &mut Comment, requested: VoteType) -> VoteChange {
    let previous = c.user_vote.take();
    if let Some(previous) = previous {
        let count = counter(c, previous);
        *count = count.saturating_sub(1);
    }
    if previous == Some(requested) {
        return VoteChange::Removed;
    }
    *counter(c, requested) += 1;
    c.user_vote = Some(requested);
    VoteChange::Cast(requested)
}
