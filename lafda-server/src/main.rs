use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    routing::{delete, get, post},
    Router,
};
use lafda_api::{AuthToken, Uuid};
use structopt::StructOpt;

mod db;
mod error;
mod extractors;
mod handlers;

#[cfg(test)]
mod fuzz;

use error::Error;
use extractors::*;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(StructOpt)]
#[structopt(name = "lafda-server", about = "Serves the lafda comment API")]
struct Opt {
    /// PostgreSQL connection string
    #[structopt(long, env = "DATABASE_URL")]
    database_url: String,

    #[structopt(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Token that grants access to the admin routes
    #[structopt(long, env = "ADMIN_TOKEN")]
    admin_token: Option<Uuid>,
}

pub async fn create_sqlx_pool(db_url: &str) -> anyhow::Result<PgPool> {
    Ok(PgPool::new(
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(8)
            .connect(db_url)
            .await
            .with_context(|| format!("Error opening database {:?}", db_url))?,
    ))
}

pub fn app(db: PgPool, admin_token: Option<AuthToken>) -> Router {
    use handlers::*;
    Router::new()
        .route("/api/auth", post(auth))
        .route("/api/unauth", post(unauth))
        .route("/api/whoami", get(whoami))
        .route("/api/admin/create-user", post(admin_create_user))
        .route("/api/admin/ban-user", post(admin_ban_user))
        .route("/api/posts", post(create_post))
        .route("/api/posts/:id", get(fetch_post).delete(delete_post))
        .route("/api/comments", get(fetch_comments).post(create_comment))
        .route("/api/comments/:id", delete(delete_comment))
        .route("/api/comments/votes", post(cast_vote).delete(remove_vote))
        .route(
            "/api/reactions",
            get(fetch_reactions).post(react).delete(unreact),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(AppState { db, admin_token })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = Opt::from_args();

    let db = create_sqlx_pool(&opt.database_url).await?;
    MIGRATOR
        .run(&mut *db.acquire().await?)
        .await
        .context("running migrations")?;

    let admin_token = opt.admin_token.map(AuthToken);
    if admin_token.is_none() {
        tracing::warn!("no admin token configured, only admin users can administrate");
    }

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app(db, admin_token).into_make_service())
        .await
        .context("serving axum webserver")
}
