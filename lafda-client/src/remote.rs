use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};

use crate::{
    api::{
        self, AuthToken, BanUser, Comment, CommentId, NewComment, NewPost, NewReaction,
        NewSession, NewUser, NewVote, Post, PostId, Reaction, ReactionSummary, User, Vote,
    },
    Backend, Error,
};

/// Talks to a lafda server over its JSON API
#[derive(Clone, Debug)]
pub struct HttpBackend {
    host: String,
    token: Option<AuthToken>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(host: String) -> HttpBackend {
        HttpBackend {
            host: host.trim_end_matches('/').to_string(),
            token: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_token(mut self, token: AuthToken) -> HttpBackend {
        self.token = Some(token);
        self
    }

    pub fn token(&self) -> Option<AuthToken> {
        self.token
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}/api/{}", self.host, path));
        match self.token {
            Some(token) => req.bearer_auth(token.0),
            None => req,
        }
    }

    async fn send<R>(&self, req: RequestBuilder) -> Result<R, Error>
    where
        R: for<'de> serde::Deserialize<'de>,
    {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        if !status.is_success() {
            tracing::debug!(%status, "server returned an error");
            return Err(Error::Api(api::Error::parse(&body).unwrap_or_else(|err| {
                api::Error::Unknown(format!("unexpected {status} response: {err:#}"))
            })));
        }
        // handlers that return nothing answer with an empty body
        let body: &[u8] = match body.is_empty() {
            true => &b"null"[..],
            false => &body[..],
        };
        Ok(serde_json::from_slice(body)?)
    }

    pub async fn auth(&self, session: &NewSession) -> Result<AuthToken, Error> {
        self.send(self.request(Method::POST, "auth").json(session))
            .await
    }

    pub async fn unauth(&self) -> Result<(), Error> {
        self.send(self.request(Method::POST, "unauth")).await
    }

    pub async fn admin_create_user(&self, user: &NewUser) -> Result<(), Error> {
        self.send(self.request(Method::POST, "admin/create-user").json(user))
            .await
    }

    pub async fn admin_ban_user(&self, ban: &BanUser) -> Result<(), Error> {
        self.send(self.request(Method::POST, "admin/ban-user").json(ban))
            .await
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Post, Error> {
        self.send(self.request(Method::POST, "posts").json(post))
            .await
    }

    pub async fn fetch_post(&self, post: PostId) -> Result<Post, Error> {
        self.send(self.request(Method::GET, &format!("posts/{}", post.0)))
            .await
    }

    pub async fn delete_post(&self, post: PostId) -> Result<(), Error> {
        self.send(self.request(Method::DELETE, &format!("posts/{}", post.0)))
            .await
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn whoami(&self) -> Result<User, Error> {
        self.send(self.request(Method::GET, "whoami")).await
    }

    async fn fetch_comments(&self, post: PostId) -> Result<Vec<Comment>, Error> {
        self.send(
            self.request(Method::GET, "comments")
                .query(&[("postId", post.0)]),
        )
        .await
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment, Error> {
        self.send(self.request(Method::POST, "comments").json(&comment))
            .await
    }

    async fn delete_comment(&self, comment: CommentId) -> Result<(), Error> {
        self.send(self.request(Method::DELETE, &format!("comments/{}", comment.0)))
            .await
    }

    async fn cast_vote(&self, vote: NewVote) -> Result<Option<Vote>, Error> {
        self.send(self.request(Method::POST, "comments/votes").json(&vote))
            .await
    }

    async fn remove_vote(&self, comment: CommentId) -> Result<(), Error> {
        self.send(
            self.request(Method::DELETE, "comments/votes")
                .query(&[("commentId", comment.0)]),
        )
        .await
    }

    async fn fetch_reactions(&self, post: PostId) -> Result<ReactionSummary, Error> {
        self.send(
            self.request(Method::GET, "reactions")
                .query(&[("postId", post.0)]),
        )
        .await
    }

    async fn react(&self, reaction: NewReaction) -> Result<Option<Reaction>, Error> {
        self.send(self.request(Method::POST, "reactions").json(&reaction))
            .await
    }

    async fn unreact(&self, post: PostId) -> Result<(), Error> {
        self.send(
            self.request(Method::DELETE, "reactions")
                .query(&[("postId", post.0)]),
        )
        .await
    }
}
