use std::{
    collections::{btree_map, BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use lafda_client::{
    api::{
        self, Author, AuthToken, BanUser, Comment, CommentId, Error, NewComment, NewPost,
        NewReaction, NewSession, NewUser, NewVote, Post, PostId, Reaction, ReactionSummary,
        ReactionType, Role, Time, User, UserId, Uuid, Vote, VoteType,
    },
    Backend,
};
use tokio::sync::Mutex;

/// In-memory implementation of the lafda server
///
/// Every method behaves like the matching route of the real server, including
/// the order in which errors are detected.
#[derive(Default)]
pub struct MockServer {
    users: BTreeMap<UserId, DbUser>,
    sessions: HashMap<AuthToken, (UserId, String)>,
    posts: BTreeMap<PostId, Post>,
    // in creation order
    comments: Vec<DbComment>,
    votes: HashMap<(UserId, CommentId), VoteType>,
    reactions: HashMap<(UserId, PostId), ReactionType>,
}

#[derive(Debug)]
struct DbUser {
    user: User,
    pass_hash: String,
}

#[derive(Debug)]
struct DbComment {
    id: CommentId,
    post_id: PostId,
    parent_id: Option<CommentId>,
    owner: UserId,
    created_at: Time,
    content: String,
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer::default()
    }

    /// Return the current number of users
    pub fn test_num_users(&self) -> usize {
        self.users.len()
    }

    /// Return the name of user number `id`
    pub fn test_user_name(&self, id: usize) -> &str {
        let u = self
            .users
            .values()
            .nth(id)
            .unwrap_or_else(|| panic!("getting user {id} among {}", self.users.len()));
        &u.user.name
    }

    /// Creates a user and logs them in, without going through password hashing
    pub fn test_login_new_user(&mut self, name: &str, role: Role) -> (User, AuthToken) {
        let user = User {
            id: UserId(Uuid::new_v4()),
            name: String::from(name),
            avatar: None,
            role,
            banned: false,
        };
        self.users.insert(
            user.id,
            DbUser {
                user: user.clone(),
                pass_hash: String::new(),
            },
        );
        let token = AuthToken(Uuid::new_v4());
        self.sessions
            .insert(token, (user.id, String::from("test")));
        (user, token)
    }

    pub fn admin_create_user(&mut self, u: NewUser) -> Result<(), Error> {
        u.validate()?;

        if self.users.values().any(|db| db.user.name == u.name) {
            return Err(Error::NameAlreadyUsed(u.name));
        }

        match self.users.entry(u.id) {
            btree_map::Entry::Occupied(_) => Err(Error::UuidAlreadyUsed(u.id.0)),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(DbUser {
                    user: User {
                        id: u.id,
                        name: u.name,
                        avatar: None,
                        role: u.role,
                        banned: false,
                    },
                    pass_hash: u.initial_password_hash,
                });
                Ok(())
            }
        }
    }

    pub fn admin_ban_user(&mut self, ban: BanUser) -> Result<(), Error> {
        let u = self
            .users
            .get_mut(&ban.user_id)
            .ok_or(Error::NotFound(ban.user_id.0))?;
        u.user.banned = ban.banned;
        if ban.banned {
            self.sessions.retain(|_, (uid, _)| *uid != ban.user_id);
        }
        Ok(())
    }

    pub fn auth(&mut self, s: NewSession) -> Result<AuthToken, Error> {
        s.validate()?;
        let u = self
            .users
            .values()
            .find(|u| u.user.name == s.user)
            .ok_or(Error::PermissionDenied)?;
        if u.user.banned || !bcrypt::verify(&s.password, &u.pass_hash).unwrap_or(false) {
            return Err(Error::PermissionDenied);
        }
        let tok = AuthToken(Uuid::new_v4());
        self.sessions.insert(tok, (u.user.id, s.device));
        Ok(tok)
    }

    fn resolve(&self, tok: AuthToken) -> Result<&User, Error> {
        self.sessions
            .get(&tok)
            .and_then(|(uid, _)| self.users.get(uid))
            .map(|u| &u.user)
            .ok_or(Error::PermissionDenied)
    }

    fn resolve_optional(&self, tok: Option<AuthToken>) -> Result<Option<&User>, Error> {
        tok.map(|tok| self.resolve(tok)).transpose()
    }

    pub fn unauth(&mut self, tok: AuthToken) -> Result<(), Error> {
        self.sessions
            .remove(&tok)
            .map(|_| ())
            .ok_or(Error::PermissionDenied)
    }

    pub fn whoami(&self, tok: AuthToken) -> Result<User, Error> {
        self.resolve(tok).cloned()
    }

    pub fn create_post(&mut self, tok: AuthToken, p: NewPost) -> Result<Post, Error> {
        let user = self.resolve(tok)?.id;
        p.validate()?;
        let post = Post {
            id: PostId(Uuid::new_v4()),
            owner_id: user,
            created_at: Utc::now(),
            title: p.title,
            body: p.body,
        };
        self.posts.insert(post.id, post.clone());
        Ok(post)
    }

    pub fn fetch_post(&self, post: PostId) -> Result<Post, Error> {
        self.posts.get(&post).cloned().ok_or(Error::NotFound(post.0))
    }

    pub fn delete_post(&mut self, tok: AuthToken, post: PostId) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        let p = self.posts.get(&post).ok_or(Error::NotFound(post.0))?;
        if p.owner_id != user.id && !user.is_admin() {
            return Err(Error::PermissionDenied);
        }
        self.posts.remove(&post);
        let removed = self
            .comments
            .iter()
            .filter(|c| c.post_id == post)
            .map(|c| c.id)
            .collect::<HashSet<_>>();
        self.drop_comments(&removed);
        self.reactions.retain(|(_, p), _| *p != post);
        Ok(())
    }

    fn drop_comments(&mut self, ids: &HashSet<CommentId>) {
        self.comments.retain(|c| !ids.contains(&c.id));
        self.votes.retain(|(_, c), _| !ids.contains(c));
    }

    fn comment(&self, id: CommentId) -> Result<&DbComment, Error> {
        self.comments
            .iter()
            .find(|c| c.id == id)
            .ok_or(Error::NotFound(id.0))
    }

    fn render(&self, c: &DbComment, viewer: Option<UserId>) -> Comment {
        let (name, avatar) = match self.users.get(&c.owner) {
            Some(u) => (u.user.name.clone(), u.user.avatar.clone()),
            None => (String::new(), None),
        };
        let count = |t: VoteType| {
            self.votes
                .iter()
                .filter(|((_, cid), vt)| *cid == c.id && **vt == t)
                .count() as u32
        };
        Comment {
            id: c.id,
            content: c.content.clone(),
            post_id: c.post_id,
            parent_id: c.parent_id,
            created_at: c.created_at,
            user: Author {
                id: c.owner,
                name,
                avatar,
            },
            upvotes: count(VoteType::Upvote),
            downvotes: count(VoteType::Downvote),
            user_vote: viewer.and_then(|v| self.votes.get(&(v, c.id)).copied()),
            reply_count: self
                .comments
                .iter()
                .filter(|r| r.parent_id == Some(c.id))
                .count() as u32,
        }
    }

    pub fn fetch_comments(
        &self,
        tok: Option<AuthToken>,
        post: PostId,
    ) -> Result<Vec<Comment>, Error> {
        let viewer = self.resolve_optional(tok)?.map(|u| u.id);
        if !self.posts.contains_key(&post) {
            return Err(Error::NotFound(post.0));
        }
        Ok(self
            .comments
            .iter()
            .filter(|c| c.post_id == post)
            .map(|c| self.render(c, viewer))
            .collect())
    }

    pub fn create_comment(&mut self, tok: AuthToken, c: NewComment) -> Result<Comment, Error> {
        let user = self.resolve(tok)?.id;
        c.validate()?;
        if !self.posts.contains_key(&c.post_id) {
            return Err(Error::NotFound(c.post_id.0));
        }
        if let Some(parent) = c.parent_id {
            if self.comment(parent)?.post_id != c.post_id {
                return Err(Error::ParentNotInPost(parent.0));
            }
        }
        let comment = DbComment {
            id: CommentId(Uuid::new_v4()),
            post_id: c.post_id,
            parent_id: c.parent_id,
            owner: user,
            created_at: Utc::now(),
            content: c.content,
        };
        let res = self.render(&comment, Some(user));
        self.comments.push(comment);
        Ok(res)
    }

    pub fn delete_comment(&mut self, tok: AuthToken, id: CommentId) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        let c = self.comment(id)?;
        if c.owner != user.id && !user.is_admin() {
            return Err(Error::PermissionDenied);
        }
        let mut subtree = HashSet::from([id]);
        // comments are in creation order, so replies always come after their parent
        for c in self.comments.iter() {
            if matches!(c.parent_id, Some(p) if subtree.contains(&p)) {
                subtree.insert(c.id);
            }
        }
        self.drop_comments(&subtree);
        Ok(())
    }

    pub fn cast_vote(&mut self, tok: AuthToken, v: NewVote) -> Result<Option<Vote>, Error> {
        let user = self.resolve(tok)?.id;
        self.comment(v.comment_id)?;
        let key = (user, v.comment_id);
        if self.votes.get(&key) == Some(&v.vote_type) {
            self.votes.remove(&key);
            return Ok(None);
        }
        self.votes.insert(key, v.vote_type);
        Ok(Some(Vote {
            user_id: user,
            comment_id: v.comment_id,
            vote_type: v.vote_type,
        }))
    }

    pub fn remove_vote(&mut self, tok: AuthToken, comment: CommentId) -> Result<(), Error> {
        let user = self.resolve(tok)?.id;
        self.comment(comment)?;
        self.votes.remove(&(user, comment));
        Ok(())
    }

    pub fn fetch_reactions(
        &self,
        tok: Option<AuthToken>,
        post: PostId,
    ) -> Result<ReactionSummary, Error> {
        let viewer = self.resolve_optional(tok)?.map(|u| u.id);
        if !self.posts.contains_key(&post) {
            return Err(Error::NotFound(post.0));
        }
        let mut summary = ReactionSummary::default();
        for ((user, p), r) in self.reactions.iter() {
            if *p != post {
                continue;
            }
            *summary.counts.entry(*r).or_insert(0) += 1;
            if Some(*user) == viewer {
                summary.user_reaction = Some(*r);
            }
        }
        Ok(summary)
    }

    pub fn react(&mut self, tok: AuthToken, r: NewReaction) -> Result<Option<Reaction>, Error> {
        let user = self.resolve(tok)?.id;
        if !self.posts.contains_key(&r.post_id) {
            return Err(Error::NotFound(r.post_id.0));
        }
        let key = (user, r.post_id);
        if self.reactions.get(&key) == Some(&r.reaction_type) {
            self.reactions.remove(&key);
            return Ok(None);
        }
        self.reactions.insert(key, r.reaction_type);
        Ok(Some(Reaction {
            user_id: user,
            post_id: r.post_id,
            reaction_type: r.reaction_type,
        }))
    }

    pub fn unreact(&mut self, tok: AuthToken, post: PostId) -> Result<(), Error> {
        let user = self.resolve(tok)?.id;
        if !self.posts.contains_key(&post) {
            return Err(Error::NotFound(post.0));
        }
        self.reactions.remove(&(user, post));
        Ok(())
    }
}

/// A client of a shared `MockServer`
///
/// Clones share the server and the offline switch.
#[derive(Clone)]
pub struct MockBackend {
    server: Arc<Mutex<MockServer>>,
    token: Option<AuthToken>,
    offline: Arc<AtomicBool>,
}

impl MockBackend {
    pub fn new(server: Arc<Mutex<MockServer>>, token: Option<AuthToken>) -> MockBackend {
        MockBackend {
            server,
            token,
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn server(&self) -> &Arc<Mutex<MockServer>> {
        &self.server
    }

    /// Makes every following call fail as if the network was down
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    async fn lock(&self) -> Result<tokio::sync::MutexGuard<'_, MockServer>, lafda_client::Error> {
        if self.offline.load(Ordering::SeqCst) {
            tracing::debug!("mock backend is offline");
            return Err(lafda_client::Error::Transport(String::from(
                "mock backend is offline",
            )));
        }
        Ok(self.server.lock().await)
    }

    fn token(&self) -> Result<AuthToken, api::Error> {
        self.token.ok_or(api::Error::PermissionDenied)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn whoami(&self) -> Result<User, lafda_client::Error> {
        let server = self.lock().await?;
        Ok(server.whoami(self.token()?)?)
    }

    async fn fetch_comments(&self, post: PostId) -> Result<Vec<Comment>, lafda_client::Error> {
        let server = self.lock().await?;
        Ok(server.fetch_comments(self.token, post)?)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment, lafda_client::Error> {
        let mut server = self.lock().await?;
        Ok(server.create_comment(self.token()?, comment)?)
    }

    async fn delete_comment(&self, comment: CommentId) -> Result<(), lafda_client::Error> {
        let mut server = self.lock().await?;
        Ok(server.delete_comment(self.token()?, comment)?)
    }

    async fn cast_vote(&self, vote: NewVote) -> Result<Option<Vote>, lafda_client::Error> {
        let mut server = self.lock().await?;
        Ok(server.cast_vote(self.token()?, vote)?)
    }

    async fn remove_vote(&self, comment: CommentId) -> Result<(), lafda_client::Error> {
        let mut server = self.lock().await?;
        Ok(server.remove_vote(self.token()?, comment)?)
    }

    async fn fetch_reactions(&self, post: PostId) -> Result<ReactionSummary, lafda_client::Error> {
        let server = self.lock().await?;
        Ok(server.fetch_reactions(self.token, post)?)
    }

    async fn react(&self, reaction: NewReaction) -> Result<Option<Reaction>, lafda_client::Error> {
        let mut server = self.lock().await?;
        Ok(server.react(self.token()?, reaction)?)
    }

    async fn unreact(&self, post: PostId) -> Result<(), lafda_client::Error> {
        let mut server = self.lock().await?;
        Ok(server.unreact(self.token()?, post)?)
    }
}
