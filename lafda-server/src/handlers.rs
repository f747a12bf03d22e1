use anyhow::Context;
use axum::{
    extract::{Path, Query},
    Json,
};
use lafda_api::{
    AuthToken, BanUser, Comment, CommentId, NewComment, NewPost, NewReaction, NewSession, NewUser,
    NewVote, Post, PostId, Reaction, ReactionSummary, User, Uuid, Vote,
};

use crate::{db, extractors::*, Error};

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostQuery {
    post_id: Uuid,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentQuery {
    comment_id: Uuid,
}

pub async fn admin_create_user(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    Json(data): Json<NewUser>,
) -> Result<(), Error> {
    data.validate()?;
    db::create_user(&mut *conn, &data).await?;
    tracing::info!(user = ?data.id, name = %data.name, "created user");
    Ok(())
}

pub async fn admin_ban_user(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    Json(data): Json<BanUser>,
) -> Result<(), Error> {
    db::ban_user(&mut *conn, &data).await?;
    tracing::info!(user = ?data.user_id, banned = data.banned, "updated ban status");
    Ok(())
}

pub async fn auth(
    mut conn: PgConn,
    Json(data): Json<NewSession>,
) -> Result<Json<AuthToken>, Error> {
    data.validate()?;
    Ok(Json(
        db::login_user(&mut *conn, &data)
            .await
            .context("logging user in")?
            .ok_or(Error::permission_denied())?,
    ))
}

pub async fn unauth(user: PreAuth, mut conn: PgConn) -> Result<(), Error> {
    match db::logout_user(&mut *conn, &user.0).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::permission_denied()),
        Err(e) => Err(Error::Anyhow(e)),
    }
}

pub async fn whoami(Auth(user): Auth) -> Json<User> {
    Json(user)
}

pub async fn create_post(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(data): Json<NewPost>,
) -> Result<Json<Post>, Error> {
    data.validate()?;
    Ok(Json(
        db::create_post(&mut *conn, user.id, data)
            .await
            .with_context(|| format!("creating post for {:?}", user.id))?,
    ))
}

pub async fn fetch_post(mut conn: PgConn, Path(post): Path<Uuid>) -> Result<Json<Post>, Error> {
    Ok(Json(db::fetch_post(&mut *conn, PostId(post)).await?))
}

pub async fn delete_post(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(post): Path<Uuid>,
) -> Result<(), Error> {
    let post = db::fetch_post(&mut *conn, PostId(post)).await?;
    if post.owner_id != user.id && !user.is_admin() {
        return Err(Error::permission_denied());
    }
    db::delete_post(&mut *conn, post.id).await?;
    Ok(())
}

pub async fn fetch_comments(
    OptionalAuth(user): OptionalAuth,
    mut conn: PgConn,
    Query(q): Query<PostQuery>,
) -> Result<Json<Vec<Comment>>, Error> {
    let post = PostId(q.post_id);
    db::ensure_post_exists(&mut *conn, post).await?;
    Ok(Json(
        db::fetch_comments(&mut *conn, post, user.map(|u| u.id)).await?,
    ))
}

pub async fn create_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(data): Json<NewComment>,
) -> Result<Json<Comment>, Error> {
    data.validate()?;
    let comment = db::create_comment(&mut *conn, user.id, data).await?;
    tracing::debug!(id = ?comment.id, post = ?comment.post_id, "created comment");
    Ok(Json(comment))
}

pub async fn delete_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(comment): Path<Uuid>,
) -> Result<(), Error> {
    let comment = CommentId(comment);
    let (_, owner) = db::comment_info(&mut *conn, comment).await?;
    if owner != user.id && !user.is_admin() {
        return Err(Error::permission_denied());
    }
    db::delete_comment(&mut *conn, comment).await?;
    Ok(())
}

pub async fn cast_vote(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(data): Json<NewVote>,
) -> Result<Json<Option<Vote>>, Error> {
    Ok(Json(db::cast_vote(&mut *conn, user.id, data).await?))
}

pub async fn remove_vote(
    Auth(user): Auth,
    mut conn: PgConn,
    Query(q): Query<CommentQuery>,
) -> Result<(), Error> {
    let comment = CommentId(q.comment_id);
    db::comment_info(&mut *conn, comment).await?;
    db::remove_vote(&mut *conn, user.id, comment).await?;
    Ok(())
}

pub async fn fetch_reactions(
    OptionalAuth(user): OptionalAuth,
    mut conn: PgConn,
    Query(q): Query<PostQuery>,
) -> Result<Json<ReactionSummary>, Error> {
    Ok(Json(
        db::fetch_reactions(&mut *conn, PostId(q.post_id), user.map(|u| u.id)).await?,
    ))
}

pub async fn react(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(data): Json<NewReaction>,
) -> Result<Json<Option<Reaction>>, Error> {
    Ok(Json(db::react(&mut *conn, user.id, data).await?))
}

pub async fn unreact(
    Auth(user): Auth,
    mut conn: PgConn,
    Query(q): Query<PostQuery>,
) -> Result<(), Error> {
    let post = PostId(q.post_id);
    db::ensure_post_exists(&mut *conn, post).await?;
    db::unreact(&mut *conn, user.id, post).await?;
    Ok(())
}
