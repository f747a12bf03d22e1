use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};

use crate::{
    api::{
        Author, Comment, CommentId, NewComment, NewReaction, NewVote, PostId, Reaction,
        ReactionSummary, User, UserId, Uuid, Vote,
    },
    Backend, Error,
};

pub fn cid(id: u128) -> CommentId {
    CommentId(Uuid::from_u128(id))
}

pub fn post() -> PostId {
    PostId(Uuid::from_u128(0xb0b))
}

pub fn author(id: u128) -> Author {
    Author {
        id: UserId(Uuid::from_u128(id)),
        name: format!("user{id}"),
        avatar: None,
    }
}

/// Comment `id`, created `id` seconds after the epoch of the tests
pub fn comment(id: u128, parent: Option<u128>) -> Comment {
    Comment {
        id: cid(id),
        content: format!("comment {id}"),
        post_id: post(),
        parent_id: parent.map(cid),
        created_at: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
            + Duration::seconds(id as i64),
        user: author(1),
        upvotes: 0,
        downvotes: 0,
        user_vote: None,
        reply_count: 0,
    }
}

#[derive(Default)]
struct Script {
    comments: Vec<Comment>,
    calls: Vec<String>,
    fail_next: bool,
}

/// Backend answering from a fixed list of comments, and recording its calls
#[derive(Clone, Default)]
pub struct ScriptedBackend(Arc<Mutex<Script>>);

impl ScriptedBackend {
    pub fn new(comments: Vec<Comment>) -> ScriptedBackend {
        ScriptedBackend(Arc::new(Mutex::new(Script {
            comments,
            ..Script::default()
        })))
    }

    /// Makes the next call fail with a transport error
    pub fn fail_next(&self) {
        self.0.lock().unwrap().fail_next = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().calls.clone()
    }

    fn call(&self, name: String) -> Result<MutexGuard<'_, Script>, Error> {
        let mut script = self.0.lock().unwrap();
        script.calls.push(name);
        match std::mem::take(&mut script.fail_next) {
            true => Err(Error::Transport(String::from("connection reset"))),
            false => Ok(script),
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn whoami(&self) -> Result<User, Error> {
        self.call(String::from("whoami"))?;
        Err(Error::permission_denied())
    }

    async fn fetch_comments(&self, _post: PostId) -> Result<Vec<Comment>, Error> {
        Ok(self.call(String::from("fetch"))?.comments.clone())
    }

    async fn create_comment(&self, new: NewComment) -> Result<Comment, Error> {
        let mut script = self.call(String::from("create"))?;
        let comment = Comment {
            id: CommentId(Uuid::new_v4()),
            content: new.content,
            post_id: new.post_id,
            parent_id: new.parent_id,
            created_at: Utc::now(),
            user: author(1),
            upvotes: 0,
            downvotes: 0,
            user_vote: None,
            reply_count: 0,
        };
        script.comments.push(comment.clone());
        Ok(comment)
    }

    async fn delete_comment(&self, id: CommentId) -> Result<(), Error> {
        let mut script = self.call(String::from("delete"))?;
        script.comments.retain(|c| c.id != id);
        Ok(())
    }

    async fn cast_vote(&self, vote: NewVote) -> Result<Option<Vote>, Error> {
        self.call(format!("cast {}", vote.vote_type.as_str()))?;
        Ok(Some(Vote {
            user_id: author(1).id,
            comment_id: vote.comment_id,
            vote_type: vote.vote_type,
        }))
    }

    async fn remove_vote(&self, _comment: CommentId) -> Result<(), Error> {
        self.call(String::from("remove vote"))?;
        Ok(())
    }

    async fn fetch_reactions(&self, _post: PostId) -> Result<ReactionSummary, Error> {
        self.call(String::from("fetch reactions"))?;
        Ok(ReactionSummary::default())
    }

    async fn react(&self, reaction: NewReaction) -> Result<Option<Reaction>, Error> {
        self.call(format!("react {}", reaction.reaction_type.as_str()))?;
        Ok(Some(Reaction {
            user_id: author(1).id,
            post_id: reaction.post_id,
            reaction_type: reaction.reaction_type,
        }))
    }

    async fn unreact(&self, _post: PostId) -> Result<(), Error> {
        self.call(String::from("unreact"))?;
        Ok(())
    }
}
