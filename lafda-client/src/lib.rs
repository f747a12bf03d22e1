mod backend;
pub use backend::Backend;

mod error;
pub use error::Error;

mod forest;
pub use forest::{CommentNode, Forest};

mod optimistic;
pub use optimistic::Optimistic;

mod reaction;
pub use reaction::{PostReactions, ReactionBoard, ReactionChange};

mod remote;
pub use remote::HttpBackend;

mod section;
pub use section::{CommentSection, SectionConfig};

mod vote;
pub use vote::{toggle_vote, VoteChange};

pub mod api {
    pub use lafda_api::*;
}

#[cfg(test)]
mod testutil;
