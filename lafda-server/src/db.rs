use anyhow::{anyhow, Context};
use chrono::Utc;
use lafda_api::{
    Author, AuthToken, BanUser, Comment, CommentId, NewComment, NewPost, NewReaction, NewSession,
    NewUser, NewVote, Post, PostId, Reaction, ReactionSummary, ReactionType, Role, User, UserId,
    Uuid, Vote, VoteType,
};
use sqlx::{postgres::PgRow, Row};

use crate::Error;

fn get<'r, T>(row: &'r PgRow, field: &str) -> anyhow::Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(field)
        .with_context(|| format!("retrieving the {field} field"))
}

fn get_count(row: &PgRow, field: &str) -> anyhow::Result<u32> {
    u32::try_from(get::<i64>(row, field)?).with_context(|| format!("{field} does not fit a u32"))
}

fn user_from_row(row: &PgRow) -> anyhow::Result<User> {
    let role = get::<String>(row, "role")?;
    Ok(User {
        id: UserId(get(row, "id")?),
        name: get(row, "name")?,
        avatar: get(row, "avatar")?,
        role: Role::parse(&role).ok_or_else(|| anyhow!("unknown role {role:?} in database"))?,
        banned: get(row, "banned")?,
    })
}

pub async fn create_user(conn: &mut sqlx::PgConnection, user: &NewUser) -> Result<(), Error> {
    let name_used = sqlx::query("SELECT 1 FROM users WHERE name = $1")
        .bind(&user.name)
        .fetch_optional(&mut *conn)
        .await
        .context("checking for name conflicts")?;
    if name_used.is_some() {
        return Err(Error::name_already_used(user.name.clone()));
    }
    let id_used = sqlx::query("SELECT 1 FROM users WHERE id = $1")
        .bind(user.id.0)
        .fetch_optional(&mut *conn)
        .await
        .context("checking for uuid conflicts")?;
    if id_used.is_some() {
        return Err(Error::uuid_already_used(user.id.0));
    }
    sqlx::query(
        "INSERT INTO users (id, name, password_hash, role, banned) VALUES ($1, $2, $3, $4, false)",
    )
    .bind(user.id.0)
    .bind(&user.name)
    .bind(&user.initial_password_hash)
    .bind(user.role.as_str())
    .execute(&mut *conn)
    .await
    .with_context(|| format!("inserting user {:?}", user.id))?;
    Ok(())
}

pub async fn ban_user(conn: &mut sqlx::PgConnection, ban: &BanUser) -> Result<(), Error> {
    let res = sqlx::query("UPDATE users SET banned = $2 WHERE id = $1")
        .bind(ban.user_id.0)
        .bind(ban.banned)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("updating ban status of {:?}", ban.user_id))?;
    if res.rows_affected() == 0 {
        return Err(Error::not_found(ban.user_id.0));
    }
    if ban.banned {
        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(ban.user_id.0)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("revoking sessions of {:?}", ban.user_id))?;
    }
    Ok(())
}

pub async fn login_user(
    conn: &mut sqlx::PgConnection,
    session: &NewSession,
) -> anyhow::Result<Option<AuthToken>> {
    let user = sqlx::query("SELECT id, password_hash, banned FROM users WHERE name = $1")
        .bind(&session.user)
        .fetch_optional(&mut *conn)
        .await
        .context("fetching password hash")?;
    let Some(user) = user else {
        return Ok(None);
    };
    let id: Uuid = get(&user, "id")?;
    let hash: String = get(&user, "password_hash")?;
    if get::<bool>(&user, "banned")? || !bcrypt::verify(&session.password, &hash).unwrap_or(false)
    {
        return Ok(None);
    }

    let token = AuthToken(Uuid::new_v4());
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO sessions (id, user_id, device, login_time, last_active) VALUES ($1, $2, $3, $4, $4)",
    )
    .bind(token.0)
    .bind(id)
    .bind(&session.device)
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("inserting new session")?;
    tracing::debug!(user = ?id, device = %session.device, "user logged in");
    Ok(Some(token))
}

/// Returns whether a session was actually removed
pub async fn logout_user(conn: &mut sqlx::PgConnection, token: &AuthToken) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(token.0)
        .execute(&mut *conn)
        .await
        .context("deleting session")?;
    Ok(res.rows_affected() == 1)
}

pub async fn recover_session(conn: &mut sqlx::PgConnection, token: AuthToken) -> Result<User, Error> {
    let row = sqlx::query(
        "
            SELECT u.id, u.name, u.avatar, u.role, u.banned
                FROM sessions s
            INNER JOIN users u
                ON u.id = s.user_id
            WHERE s.id = $1
            AND u.banned = false
        ",
    )
    .bind(token.0)
    .fetch_optional(&mut *conn)
    .await
    .context("recovering session")?
    .ok_or(Error::permission_denied())?;
    let user = user_from_row(&row)?;

    sqlx::query("UPDATE sessions SET last_active = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(token.0)
        .execute(&mut *conn)
        .await
        .context("updating session last active time")?;

    Ok(user)
}

fn post_from_row(row: &PgRow) -> anyhow::Result<Post> {
    Ok(Post {
        id: PostId(get(row, "id")?),
        owner_id: UserId(get(row, "owner_id")?),
        created_at: get(row, "created_at")?,
        title: get(row, "title")?,
        body: get(row, "body")?,
    })
}

pub async fn create_post(
    conn: &mut sqlx::PgConnection,
    owner: UserId,
    post: NewPost,
) -> anyhow::Result<Post> {
    let post = Post {
        id: PostId(Uuid::new_v4()),
        owner_id: owner,
        created_at: Utc::now(),
        title: post.title,
        body: post.body,
    };
    sqlx::query(
        "INSERT INTO posts (id, owner_id, created_at, title, body) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(post.id.0)
    .bind(post.owner_id.0)
    .bind(post.created_at)
    .bind(&post.title)
    .bind(&post.body)
    .execute(&mut *conn)
    .await
    .context("inserting post")?;
    Ok(post)
}

pub async fn fetch_post(conn: &mut sqlx::PgConnection, post: PostId) -> Result<Post, Error> {
    let row = sqlx::query("SELECT id, owner_id, created_at, title, body FROM posts WHERE id = $1")
        .bind(post.0)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("fetching post {post:?}"))?
        .ok_or(Error::not_found(post.0))?;
    Ok(post_from_row(&row)?)
}

pub async fn ensure_post_exists(conn: &mut sqlx::PgConnection, post: PostId) -> Result<(), Error> {
    sqlx::query("SELECT 1 FROM posts WHERE id = $1")
        .bind(post.0)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("checking existence of post {post:?}"))?
        .ok_or(Error::not_found(post.0))?;
    Ok(())
}

/// Deletes a post, along with its comments, votes and reactions
pub async fn delete_post(conn: &mut sqlx::PgConnection, post: PostId) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(post.0)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("deleting post {post:?}"))?;
    Ok(())
}

fn comment_query(filter: &str) -> String {
    format!(
        "
            SELECT
                c.id, c.post_id, c.parent_id, c.owner_id, c.created_at, c.content,
                u.name AS owner_name,
                u.avatar AS owner_avatar,
                (SELECT COUNT(*) FROM comment_votes v WHERE v.comment_id = c.id AND v.type = 'UPVOTE') AS upvotes,
                (SELECT COUNT(*) FROM comment_votes v WHERE v.comment_id = c.id AND v.type = 'DOWNVOTE') AS downvotes,
                (SELECT v.type FROM comment_votes v WHERE v.comment_id = c.id AND v.user_id = $2) AS user_vote,
                (SELECT COUNT(*) FROM comments r WHERE r.parent_id = c.id) AS reply_count
            FROM comments c
            INNER JOIN users u
                ON u.id = c.owner_id
            WHERE {filter}
            ORDER BY c.created_at, c.id
        "
    )
}

fn comment_from_row(row: &PgRow) -> anyhow::Result<Comment> {
    let user_vote = match get::<Option<String>>(row, "user_vote")? {
        None => None,
        Some(v) => Some(
            VoteType::parse(&v).ok_or_else(|| anyhow!("unknown vote type {v:?} in database"))?,
        ),
    };
    Ok(Comment {
        id: CommentId(get(row, "id")?),
        content: get(row, "content")?,
        post_id: PostId(get(row, "post_id")?),
        parent_id: get::<Option<Uuid>>(row, "parent_id")?.map(CommentId),
        created_at: get(row, "created_at")?,
        user: Author {
            id: UserId(get(row, "owner_id")?),
            name: get(row, "owner_name")?,
            avatar: get(row, "owner_avatar")?,
        },
        upvotes: get_count(row, "upvotes")?,
        downvotes: get_count(row, "downvotes")?,
        user_vote,
        reply_count: get_count(row, "reply_count")?,
    })
}

/// Flat list of the comments of `post`, in creation order
pub async fn fetch_comments(
    conn: &mut sqlx::PgConnection,
    post: PostId,
    viewer: Option<UserId>,
) -> anyhow::Result<Vec<Comment>> {
    sqlx::query(&comment_query("c.post_id = $1"))
        .bind(post.0)
        .bind(viewer.map(|v| v.0))
        .fetch_all(&mut *conn)
        .await
        .with_context(|| format!("fetching comments of {post:?}"))?
        .iter()
        .map(comment_from_row)
        .collect()
}

async fn fetch_comment(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
    viewer: Option<UserId>,
) -> anyhow::Result<Comment> {
    let row = sqlx::query(&comment_query("c.id = $1"))
        .bind(comment.0)
        .bind(viewer.map(|v| v.0))
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("fetching comment {comment:?}"))?;
    comment_from_row(&row)
}

/// Returns the post and the author of `comment`
pub async fn comment_info(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
) -> Result<(PostId, UserId), Error> {
    let row = sqlx::query("SELECT post_id, owner_id FROM comments WHERE id = $1")
        .bind(comment.0)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("fetching info about comment {comment:?}"))?
        .ok_or(Error::not_found(comment.0))?;
    Ok((PostId(get(&row, "post_id")?), UserId(get(&row, "owner_id")?)))
}

pub async fn create_comment(
    conn: &mut sqlx::PgConnection,
    owner: UserId,
    comment: NewComment,
) -> Result<Comment, Error> {
    ensure_post_exists(&mut *conn, comment.post_id).await?;
    if let Some(parent) = comment.parent_id {
        let (parent_post, _) = comment_info(&mut *conn, parent).await?;
        if parent_post != comment.post_id {
            return Err(Error::parent_not_in_post(parent.0));
        }
    }
    let id = CommentId(Uuid::new_v4());
    sqlx::query(
        "
            INSERT INTO comments (id, post_id, parent_id, owner_id, created_at, content)
            VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(id.0)
    .bind(comment.post_id.0)
    .bind(comment.parent_id.map(|p| p.0))
    .bind(owner.0)
    .bind(Utc::now())
    .bind(&comment.content)
    .execute(&mut *conn)
    .await
    .context("inserting comment")?;
    Ok(fetch_comment(&mut *conn, id, Some(owner)).await?)
}

/// Deletes a comment; replies and votes go away through the foreign keys
pub async fn delete_comment(conn: &mut sqlx::PgConnection, comment: CommentId) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment.0)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("deleting comment {comment:?}"))?;
    Ok(())
}

/// Casts a vote, or removes it if the user had already cast this exact vote
pub async fn cast_vote(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    vote: NewVote,
) -> Result<Option<Vote>, Error> {
    comment_info(&mut *conn, vote.comment_id).await?;
    let previous = sqlx::query("SELECT type FROM comment_votes WHERE user_id = $1 AND comment_id = $2")
        .bind(user.0)
        .bind(vote.comment_id.0)
        .fetch_optional(&mut *conn)
        .await
        .context("fetching previous vote")?
        .map(|row| get::<String>(&row, "type"))
        .transpose()?;
    if previous.as_deref() == Some(vote.vote_type.as_str()) {
        remove_vote(&mut *conn, user, vote.comment_id).await?;
        return Ok(None);
    }
    sqlx::query(
        "
            INSERT INTO comment_votes (user_id, comment_id, type)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, comment_id) DO UPDATE SET type = EXCLUDED.type
        ",
    )
    .bind(user.0)
    .bind(vote.comment_id.0)
    .bind(vote.vote_type.as_str())
    .execute(&mut *conn)
    .await
    .context("upserting vote")?;
    Ok(Some(Vote {
        user_id: user,
        comment_id: vote.comment_id,
        vote_type: vote.vote_type,
    }))
}

pub async fn remove_vote(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    comment: CommentId,
) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM comment_votes WHERE user_id = $1 AND comment_id = $2")
        .bind(user.0)
        .bind(comment.0)
        .execute(&mut *conn)
        .await
        .context("deleting vote")?;
    Ok(())
}

pub async fn fetch_reactions(
    conn: &mut sqlx::PgConnection,
    post: PostId,
    viewer: Option<UserId>,
) -> Result<ReactionSummary, Error> {
    ensure_post_exists(&mut *conn, post).await?;
    let parse = |t: String| {
        ReactionType::parse(&t).ok_or_else(|| anyhow!("unknown reaction type {t:?} in database"))
    };
    let mut summary = ReactionSummary::default();
    let rows = sqlx::query(
        "SELECT type, COUNT(*) AS count FROM post_reactions WHERE post_id = $1 GROUP BY type",
    )
    .bind(post.0)
    .fetch_all(&mut *conn)
    .await
    .with_context(|| format!("counting reactions on {post:?}"))?;
    for row in rows.iter() {
        let count = u64::try_from(get::<i64>(row, "count")?).context("negative count")?;
        summary.counts.insert(parse(get(row, "type")?)?, count);
    }
    if let Some(viewer) = viewer {
        summary.user_reaction = sqlx::query(
            "SELECT type FROM post_reactions WHERE post_id = $1 AND user_id = $2",
        )
        .bind(post.0)
        .bind(viewer.0)
        .fetch_optional(&mut *conn)
        .await
        .context("fetching the viewer's reaction")?
        .map(|row| get(&row, "type").and_then(parse))
        .transpose()?;
    }
    Ok(summary)
}

/// Reacts to a post, or removes the reaction if it was already this one
pub async fn react(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    reaction: NewReaction,
) -> Result<Option<Reaction>, Error> {
    ensure_post_exists(&mut *conn, reaction.post_id).await?;
    let previous = sqlx::query("SELECT type FROM post_reactions WHERE user_id = $1 AND post_id = $2")
        .bind(user.0)
        .bind(reaction.post_id.0)
        .fetch_optional(&mut *conn)
        .await
        .context("fetching previous reaction")?
        .map(|row| get::<String>(&row, "type"))
        .transpose()?;
    if previous.as_deref() == Some(reaction.reaction_type.as_str()) {
        unreact(&mut *conn, user, reaction.post_id).await?;
        return Ok(None);
    }
    sqlx::query(
        "
            INSERT INTO post_reactions (user_id, post_id, type)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, post_id) DO UPDATE SET type = EXCLUDED.type
        ",
    )
    .bind(user.0)
    .bind(reaction.post_id.0)
    .bind(reaction.reaction_type.as_str())
    .execute(&mut *conn)
    .await
    .context("upserting reaction")?;
    Ok(Some(Reaction {
        user_id: user,
        post_id: reaction.post_id,
        reaction_type: reaction.reaction_type,
    }))
}

pub async fn unreact(conn: &mut sqlx::PgConnection, user: UserId, post: PostId) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM post_reactions WHERE user_id = $1 AND post_id = $2")
        .bind(user.0)
        .bind(post.0)
        .execute(&mut *conn)
        .await
        .context("deleting reaction")?;
    Ok(())
}
