#![cfg(test)]

use async_recursion::async_recursion;
use bolero::generator::{bolero_generator, TypeGenerator};
use axum::{
    extract::FromRequestParts,
    http::{self, request},
};
use lafda_api::{
    BanUser, Comment, CommentId, Error as ApiError, NewComment, NewPost, NewReaction, NewSession,
    NewUser, NewVote, Post, PostId, Reaction, ReactionSummary, ReactionType, Role, User, UserId,
    Vote, VoteType,
};
use lafda_mock_server::MockServer;
use std::{cmp, fmt::Debug, ops::RangeTo, panic::AssertUnwindSafe, path::Path};
use tower::{Service, ServiceExt};

use crate::{extractors::*, *};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

fn build_pg_cluster(data: &Path) -> postgresfixture::cluster::Cluster {
    let mut runtime = None;
    let mut best_version = None;
    for r in postgresfixture::runtime::Runtime::find_on_path() {
        if let Ok(v) = r.version() {
            match (&mut runtime, &mut best_version) {
                (None, None) => {
                    runtime = Some(r);
                    best_version = Some(v);
                }
                (Some(runtime), Some(best_version)) => {
                    if *best_version < v {
                        *runtime = r;
                        *best_version = v;
                    }
                }
                _ => unreachable!(),
            }
        }
    }
    postgresfixture::cluster::Cluster::new(
        data,
        runtime.expect("postgresql seems to not be installed in path"),
    )
}

macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        #[ignore = "needs postgresql binaries in PATH"]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                tracing_subscriber::fmt::init();
            }
            let lockfile = tempfile::tempfile().expect("creating tempfile");
            let datadir = tempfile::tempdir().expect("creating tempdir");
            let datadir_path: &Path = datadir.as_ref();
            let cluster = build_pg_cluster(datadir_path);
            let datadir_path: &str = datadir_path.to_str().expect("tempdir is not valid utf8");
            postgresfixture::coordinate::run_and_destroy(&cluster, lockfile.into(), || {
                cluster.createdb("test_db").expect("creating test_db database");
                let runtime = AssertUnwindSafe(
                    tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed initializing tokio runtime"),
                );
                let pool = AssertUnwindSafe(runtime.block_on(async move {
                    let pool = create_sqlx_pool(&format!("postgresql://?host={}&dbname=test_db", datadir_path)).await.expect("creating sqlx pool");
                    MIGRATOR
                        .run(&mut *pool.acquire().await.expect("getting migrator connection"))
                        .await
                        .expect("failed applying migrations");
                    pool
                }));
                bolero::check!()
                    .with_generator($gen)
                    .cloned()
                    .for_each(move |v| {
                        let pool = pool.clone();
                        let idle_before = pool.num_idle();
                        let v_str = format!("{v:?}");
                        let idle_after_res: Result<usize, _> = {
                            let pool = pool.clone();
                            std::panic::catch_unwind(AssertUnwindSafe(|| {
                                runtime.block_on(async move {
                                    let () = $fn(pool.clone(), v).await;
                                    let mut idle_after = pool.num_idle();
                                    let wait_release_since = std::time::Instant::now();
                                    while idle_after < idle_before
                                        && wait_release_since.elapsed()
                                            <= std::time::Duration::from_secs(1)
                                    {
                                        tokio::task::yield_now().await;
                                        idle_after = pool.num_idle();
                                    }
                                    idle_after
                                })
                            }))
                        };
                        runtime.block_on(async move {
                            let mut conn =
                                pool.acquire().await.expect("getting db cleanup connection");
                            sqlx::query(include_str!("../reset-test-db.sql"))
                                .execute(&mut *conn)
                                .await
                                .expect("failed cleaning up database");
                        });
                        match idle_after_res {
                            Err(e) => std::panic::resume_unwind(e),
                            Ok(idle_after) => assert!(
                                idle_after >= idle_before,
                                "test {} held onto pool after exiting test: before there were {idle_before} connections, and after there were {idle_after} with value {v_str}",
                                stringify!($name)
                            ),
                        }
                    });
            })
            .expect("coordinating spinup and shutdown of the pg cluster");
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |token| async move {
    if let Ok(req) = http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, token)
        .body(())
    {
        let mut req = req.into_parts().0;
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(_) => (),
            Err(Error::Api(ApiError::PermissionDenied)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    CreateUser {
        #[generator(bolero::generator::gen_with::<String>().len(0..12usize))]
        name: String,
        admin: bool,
    },
    Auth {
        uid: usize,
        wrong_password: bool,
        #[generator(bolero::generator::gen_with::<String>().len(1..100usize))]
        device: String,
    },
    Unauth {
        sid: usize,
    },
    Whoami {
        sid: usize,
    },
    BanUser {
        uid: usize,
        banned: bool,
    },
    CreatePost {
        sid: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..40usize))]
        title: String,
    },
    CreateComment {
        sid: usize,
        pid: usize,
        parent: Option<usize>,
        #[generator(bolero::generator::gen_with::<String>().len(0..40usize))]
        content: String,
    },
    DeleteComment {
        sid: usize,
        cid: usize,
    },
    Vote {
        sid: usize,
        cid: usize,
        upvote: bool,
    },
    React {
        sid: usize,
        pid: usize,
        reaction: u8,
    },
    FetchComments {
        sid: Option<usize>,
        pid: usize,
    },
    FetchReactions {
        sid: Option<usize>,
        pid: usize,
    },
}

async fn call<Req, Resp>(
    app: &mut Router,
    req: request::Request<axum::body::Body>,
    req_body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    if status == http::StatusCode::OK {
        if body.is_empty() {
            // handlers returning () answer with an empty body
            return Ok(serde_json::from_slice(b"null").expect("parsing unit response"));
        }
        return Ok(serde_json::from_slice(&body).unwrap_or_else(|err| {
            panic!(
                r#"
                    Failed parsing resp body!

                    The error is the following:
                    ---
                    {err}
                    ---

                    Response body is:
                    ---
                    {body:?}
                    ---

                    Request was:
                    ---
                    {req_body:?}
                    ---
                "#
            )
        }));
    }
    Err(ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}")))
}

async fn run_on_app<Req, Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    token: Option<AuthToken>,
    body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    let req = match token {
        Some(token) => req.header(http::header::AUTHORIZATION, format!("bearer {}", token.0)),
        None => req,
    };
    let req = req
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serializing request body to json"),
        ))
        .expect("building request");
    call(app, req, body).await
}

fn compare<T, E>(name: &str, app_res: Result<T, E>, mock_res: Result<T, E>)
where
    T: Debug + PartialEq,
    E: Debug + PartialEq,
{
    assert_eq!(
        app_res, mock_res,
        "app and mock did not return the same result for {name}"
    );
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end);
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1))
}

/// An object that exists on both sides, under different ids
struct Pair<T> {
    app: T,
    mock: T,
}

/// Comment as compared between both sides: ids are replaced with their
/// index in the fuzzer's list of comments
#[derive(Debug, Eq, PartialEq)]
struct ComparableComment {
    index: Option<usize>,
    parent: Option<Option<usize>>,
    author: UserId,
    content: String,
    upvotes: u32,
    downvotes: u32,
    user_vote: Option<VoteType>,
    reply_count: u32,
}

struct ComparativeFuzzer {
    admin_token: AuthToken,
    password_hash: String,
    app: Router,
    mock: MockServer,
    users: Vec<(UserId, String)>,
    sessions: Vec<Pair<AuthToken>>,
    posts: Vec<Pair<PostId>>,
    comments: Vec<Pair<CommentId>>,
}

impl ComparativeFuzzer {
    fn new(pool: PgPool) -> ComparativeFuzzer {
        let admin_token = AuthToken(Uuid::new_v4());
        ComparativeFuzzer {
            admin_token,
            password_hash: bcrypt::hash("password", 4).expect("hashing test password"),
            app: app(pool, Some(admin_token)),
            mock: MockServer::new(),
            users: Vec::new(),
            sessions: Vec::new(),
            posts: Vec::new(),
            comments: Vec::new(),
        }
    }

    fn session(&self, sid: usize) -> Option<&Pair<AuthToken>> {
        resize_int(sid, ..self.sessions.len()).map(|s| &self.sessions[s])
    }

    fn post(&self, pid: usize) -> Option<&Pair<PostId>> {
        resize_int(pid, ..self.posts.len()).map(|p| &self.posts[p])
    }

    fn comment(&self, cid: usize) -> Option<&Pair<CommentId>> {
        resize_int(cid, ..self.comments.len()).map(|c| &self.comments[c])
    }

    fn comparable(&self, comments: Vec<Comment>, app: bool) -> Vec<ComparableComment> {
        let index = |id: CommentId| {
            self.comments
                .iter()
                .position(|c| id == if app { c.app } else { c.mock })
        };
        let mut res = comments
            .into_iter()
            .map(|c| ComparableComment {
                index: index(c.id),
                parent: c.parent_id.map(index),
                author: c.user.id,
                content: c.content,
                upvotes: c.upvotes,
                downvotes: c.downvotes,
                user_vote: c.user_vote,
                reply_count: c.reply_count,
            })
            .collect::<Vec<_>>();
        res.sort_by_key(|c| c.index);
        res
    }

    /// Tries to get a session, a post and a comment to act upon
    async fn ensure_world(&mut self) {
        if self.sessions.is_empty() {
            self.execute_fuzz_op(FuzzOp::Auth {
                uid: 0,
                wrong_password: false,
                device: String::from("device"),
            })
            .await;
            if self.sessions.is_empty() {
                return;
            }
        }
        if self.posts.is_empty() {
            self.execute_fuzz_op(FuzzOp::CreatePost {
                sid: 0,
                title: String::from("post"),
            })
            .await;
            if self.posts.is_empty() {
                return;
            }
        }
        if self.comments.is_empty() {
            self.execute_fuzz_op(FuzzOp::CreateComment {
                sid: 0,
                pid: 0,
                parent: None,
                content: String::from("comment"),
            })
            .await;
        }
    }

    #[async_recursion]
    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::CreateUser { name, admin } => {
                let new_user = NewUser {
                    id: UserId(Uuid::new_v4()),
                    name,
                    initial_password_hash: self.password_hash.clone(),
                    role: if admin { Role::Admin } else { Role::User },
                };
                let app_res = run_on_app(
                    &mut self.app,
                    "POST",
                    "/api/admin/create-user",
                    Some(self.admin_token),
                    &new_user,
                )
                .await;
                let mock_res = self.mock.admin_create_user(new_user.clone());
                if mock_res.is_ok() {
                    self.users.push((new_user.id, new_user.name));
                }
                compare("CreateUser", app_res, mock_res)
            }
            FuzzOp::Auth {
                uid,
                wrong_password,
                device,
            } => {
                if let Some(uid) = resize_int(uid, ..self.users.len()) {
                    let session = NewSession {
                        user: self.users[uid].1.clone(),
                        password: String::from(if wrong_password { "wrong" } else { "password" }),
                        device,
                    };
                    let app_tok = run_on_app(&mut self.app, "POST", "/api/auth", None, &session).await;
                    let mock_tok = self.mock.auth(session);
                    if let (&Ok(app), &Ok(mock)) = (&app_tok, &mock_tok) {
                        self.sessions.push(Pair { app, mock });
                    }
                    compare("Auth", app_tok.map(|_| ()), mock_tok.map(|_| ()));
                } else {
                    self.execute_fuzz_op(FuzzOp::CreateUser {
                        name: String::from("user"),
                        admin: false,
                    })
                    .await;
                    self.execute_fuzz_op(FuzzOp::Auth {
                        uid,
                        wrong_password,
                        device,
                    })
                    .await;
                }
            }
            FuzzOp::Unauth { sid } => {
                if let Some(s) = self.session(sid) {
                    let (app_tok, mock_tok) = (s.app, s.mock);
                    compare(
                        "Unauth",
                        run_on_app(&mut self.app, "POST", "/api/unauth", Some(app_tok), &()).await,
                        self.mock.unauth(mock_tok),
                    );
                }
            }
            FuzzOp::Whoami { sid } => {
                if let Some(s) = self.session(sid) {
                    let (app_tok, mock_tok) = (s.app, s.mock);
                    compare::<User, _>(
                        "Whoami",
                        run_on_app(&mut self.app, "GET", "/api/whoami", Some(app_tok), &()).await,
                        self.mock.whoami(mock_tok),
                    );
                }
            }
            FuzzOp::BanUser { uid, banned } => {
                if let Some(uid) = resize_int(uid, ..self.users.len()) {
                    let ban = BanUser {
                        user_id: self.users[uid].0,
                        banned,
                    };
                    compare(
                        "BanUser",
                        run_on_app(
                            &mut self.app,
                            "POST",
                            "/api/admin/ban-user",
                            Some(self.admin_token),
                            &ban,
                        )
                        .await,
                        self.mock.admin_ban_user(ban),
                    );
                }
            }
            FuzzOp::CreatePost { sid, title } => {
                if let Some(s) = self.session(sid) {
                    let (app_tok, mock_tok) = (s.app, s.mock);
                    let post = NewPost {
                        title,
                        body: String::new(),
                    };
                    let app_res: Result<Post, _> =
                        run_on_app(&mut self.app, "POST", "/api/posts", Some(app_tok), &post).await;
                    let mock_res = self.mock.create_post(mock_tok, post);
                    if let (Ok(app), Ok(mock)) = (&app_res, &mock_res) {
                        self.posts.push(Pair {
                            app: app.id,
                            mock: mock.id,
                        });
                    }
                    compare(
                        "CreatePost",
                        app_res.map(|p| (p.owner_id, p.title)),
                        mock_res.map(|p| (p.owner_id, p.title)),
                    );
                }
            }
            FuzzOp::CreateComment {
                sid,
                pid,
                parent,
                content,
            } => match (self.session(sid), self.post(pid)) {
                (Some(s), Some(p)) => {
                    let (app_tok, mock_tok, app_post, mock_post) = (s.app, s.mock, p.app, p.mock);
                    let parent = parent.and_then(|c| self.comment(c)).map(|c| (c.app, c.mock));
                    let app_comment = NewComment {
                        post_id: app_post,
                        content: content.clone(),
                        parent_id: parent.map(|p| p.0),
                    };
                    let mock_comment = NewComment {
                        post_id: mock_post,
                        content,
                        parent_id: parent.map(|p| p.1),
                    };
                    let app_res: Result<Comment, _> = run_on_app(
                        &mut self.app,
                        "POST",
                        "/api/comments",
                        Some(app_tok),
                        &app_comment,
                    )
                    .await;
                    let mock_res = self.mock.create_comment(mock_tok, mock_comment);
                    if let (Ok(app), Ok(mock)) = (&app_res, &mock_res) {
                        self.comments.push(Pair {
                            app: app.id,
                            mock: mock.id,
                        });
                    }
                    // parent-not-in-post errors carry side-specific ids
                    let strip = |r: Result<Comment, ApiError>| {
                        r.map(|c| (c.content, c.upvotes, c.reply_count))
                            .map_err(|e| match e {
                                ApiError::ParentNotInPost(_) => "parent-not-in-post".to_string(),
                                ApiError::NotFound(_) => "not-found".to_string(),
                                e => e.to_string(),
                            })
                    };
                    assert_eq!(strip(app_res), strip(mock_res), "CreateComment differs");
                }
                _ => self.ensure_world().await,
            },
            FuzzOp::DeleteComment { sid, cid } => match (self.session(sid), self.comment(cid)) {
                (Some(s), Some(c)) => {
                    let (app_tok, mock_tok, app_c, mock_c) = (s.app, s.mock, c.app, c.mock);
                    let app_res: Result<(), _> = run_on_app(
                        &mut self.app,
                        "DELETE",
                        &format!("/api/comments/{}", app_c.0),
                        Some(app_tok),
                        &(),
                    )
                    .await;
                    let mock_res = self.mock.delete_comment(mock_tok, mock_c);
                    compare(
                        "DeleteComment",
                        app_res.map_err(|e| e.status_code()),
                        mock_res.map_err(|e| e.status_code()),
                    );
                }
                _ => self.ensure_world().await,
            },
            FuzzOp::Vote { sid, cid, upvote } => match (self.session(sid), self.comment(cid)) {
                (Some(s), Some(c)) => {
                    let (app_tok, mock_tok, app_c, mock_c) = (s.app, s.mock, c.app, c.mock);
                    let vote_type = if upvote {
                        VoteType::Upvote
                    } else {
                        VoteType::Downvote
                    };
                    let app_res: Result<Option<Vote>, _> = run_on_app(
                        &mut self.app,
                        "POST",
                        "/api/comments/votes",
                        Some(app_tok),
                        &NewVote {
                            comment_id: app_c,
                            vote_type,
                        },
                    )
                    .await;
                    let mock_res = self.mock.cast_vote(
                        mock_tok,
                        NewVote {
                            comment_id: mock_c,
                            vote_type,
                        },
                    );
                    compare(
                        "Vote",
                        app_res
                            .map(|v| v.map(|v| (v.user_id, v.vote_type)))
                            .map_err(|e| e.status_code()),
                        mock_res
                            .map(|v| v.map(|v| (v.user_id, v.vote_type)))
                            .map_err(|e| e.status_code()),
                    );
                }
                _ => self.ensure_world().await,
            },
            FuzzOp::React { sid, pid, reaction } => match (self.session(sid), self.post(pid)) {
                (Some(s), Some(p)) => {
                    let (app_tok, mock_tok, app_post, mock_post) = (s.app, s.mock, p.app, p.mock);
                    let reaction_type =
                        ReactionType::ALL[usize::from(reaction) % ReactionType::ALL.len()];
                    let app_res: Result<Option<Reaction>, _> = run_on_app(
                        &mut self.app,
                        "POST",
                        "/api/reactions",
                        Some(app_tok),
                        &NewReaction {
                            post_id: app_post,
                            reaction_type,
                        },
                    )
                    .await;
                    let mock_res = self.mock.react(
                        mock_tok,
                        NewReaction {
                            post_id: mock_post,
                            reaction_type,
                        },
                    );
                    compare(
                        "React",
                        app_res.map(|r| r.map(|r| (r.user_id, r.reaction_type))),
                        mock_res.map(|r| r.map(|r| (r.user_id, r.reaction_type))),
                    );
                }
                _ => self.ensure_world().await,
            },
            FuzzOp::FetchComments { sid, pid } => {
                let tokens = sid.and_then(|s| self.session(s)).map(|s| (s.app, s.mock));
                if let Some(p) = self.post(pid) {
                    let (app_post, mock_post) = (p.app, p.mock);
                    let app_res: Result<Vec<Comment>, _> = run_on_app(
                        &mut self.app,
                        "GET",
                        &format!("/api/comments?postId={}", app_post.0),
                        tokens.map(|t| t.0),
                        &(),
                    )
                    .await;
                    let mock_res = self.mock.fetch_comments(tokens.map(|t| t.1), mock_post);
                    compare(
                        "FetchComments",
                        app_res.map(|c| self.comparable(c, true)),
                        mock_res.map(|c| self.comparable(c, false)),
                    );
                } else {
                    self.ensure_world().await;
                }
            }
            FuzzOp::FetchReactions { sid, pid } => {
                let tokens = sid.and_then(|s| self.session(s)).map(|s| (s.app, s.mock));
                if let Some(p) = self.post(pid) {
                    let (app_post, mock_post) = (p.app, p.mock);
                    compare::<ReactionSummary, _>(
                        "FetchReactions",
                        run_on_app(
                            &mut self.app,
                            "GET",
                            &format!("/api/reactions?postId={}", app_post.0),
                            tokens.map(|t| t.0),
                            &(),
                        )
                        .await,
                        self.mock.fetch_reactions(tokens.map(|t| t.1), mock_post),
                    );
                } else {
                    self.ensure_world().await;
                }
            }
        }
    }
}

do_sqlx_test!(
    compare_with_mock,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..100usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool);
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);
