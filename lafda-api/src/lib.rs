mod auth;
pub use auth::{AuthToken, NewSession};

mod comment;
pub use comment::{Author, Comment, CommentId, NewComment};

mod error;
pub use error::Error;

mod mention;
pub use mention::mentions;

mod post;
pub use post::{NewPost, Post, PostId};

mod reaction;
pub use reaction::{NewReaction, Reaction, ReactionSummary, ReactionType};

mod user;
pub use user::{BanUser, NewUser, Role, User, UserId};

mod vote;
pub use vote::{NewVote, Vote, VoteType};

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<chrono::Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

/// Longest comment or post text accepted, in characters
pub const MAX_CONTENT_LEN: usize = 10_000;

// The validate functions are called by the server on every piece of data it
// receives, before it touches the database. The mock server calls them too, so
// that both reject exactly the same inputs.

pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(s.to_string()));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), Error> {
    validate_string(name)?;
    if name.is_empty() || !name.chars().all(is_handle_char) {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

pub fn validate_content(s: &str) -> Result<(), Error> {
    validate_string(s)?;
    if s.trim().is_empty() {
        return Err(Error::InvalidContent(String::from("content is empty")));
    }
    let len = s.chars().count();
    if len > MAX_CONTENT_LEN {
        return Err(Error::InvalidContent(format!(
            "content is {len} characters long, the maximum is {MAX_CONTENT_LEN}"
        )));
    }
    Ok(())
}

/// Characters allowed in user names, and thus in `@mentions`
pub fn is_handle_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
