use anyhow::{anyhow, Context};
use lafda_client::{
    api::{
        AuthToken, BanUser, CommentId, NewPost, NewSession, NewUser, PostId, ReactionType, Role,
        UserId, Uuid, VoteType,
    },
    Backend, CommentSection, HttpBackend, PostReactions, SectionConfig,
};

#[derive(structopt::StructOpt)]
#[structopt(name = "lafda-ctl", about = "Administrate and script a lafda server")]
struct Opt {
    #[structopt(short, long, env = "LAFDA_HOST")]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create a user (needs ADMIN_TOKEN)
    CreateUser {
        /// Username
        name: String,

        /// Initial password
        initial_password: String,

        #[structopt(long)]
        admin: bool,
    },

    /// Ban a user and revoke their sessions (needs ADMIN_TOKEN)
    BanUser {
        user: Uuid,

        /// Lift the ban instead
        #[structopt(long)]
        unban: bool,
    },

    /// Open a session and print its token, to be used as LAFDA_TOKEN
    Login {
        name: String,
        password: String,

        #[structopt(long, default_value = "lafda-ctl")]
        device: String,
    },

    /// Close the session of LAFDA_TOKEN
    Logout,

    Whoami,

    /// Create a post and print its id
    NewPost {
        title: String,

        #[structopt(default_value = "")]
        body: String,
    },

    /// Print the comment thread of a post
    Thread { post: Uuid },

    /// Comment on a post, or reply to a comment with --parent
    Comment {
        post: Uuid,
        content: String,

        #[structopt(long)]
        parent: Option<Uuid>,
    },

    /// Delete a comment and all its replies
    Delete { post: Uuid, comment: Uuid },

    /// Toggle an upvote, or a downvote with --down
    Vote {
        post: Uuid,
        comment: Uuid,

        #[structopt(long)]
        down: bool,
    },

    /// Toggle a reaction (like, dislike, fire, heart or cry) on a post
    React { post: Uuid, reaction: String },
}

fn token_from_env(var: &str) -> anyhow::Result<AuthToken> {
    let tok = std::env::var(var).with_context(|| format!("retrieving {var} environment variable"))?;
    let tok = Uuid::try_parse(&tok).with_context(|| format!("parsing {var} as an auth token"))?;
    Ok(AuthToken(tok))
}

async fn load_section(
    backend: HttpBackend,
    post: Uuid,
) -> anyhow::Result<CommentSection<HttpBackend>> {
    let viewer = match backend.token() {
        Some(_) => Some(backend.whoami().await.context("recovering current user")?),
        None => None,
    };
    tracing::debug!(%post, viewer = ?viewer.as_ref().map(|u| &u.name), "loading comment section");
    let mut section = CommentSection::new(backend, PostId(post), viewer, SectionConfig::default());
    section.load().await.context("loading comments")?;
    tracing::debug!(%post, roots = section.forest().roots().len(), "loaded comment section");
    Ok(section)
}

fn print_thread(section: &CommentSection<HttpBackend>) {
    for (depth, node) in section.forest().depth_first() {
        let c = &node.comment;
        let indent = depth * 4;
        println!(
            "{:indent$}[{:+}] {} ({}, {})",
            "",
            c.score(),
            c.user.name,
            c.id.0,
            c.created_at.format("%Y-%m-%d %H:%M"),
        );
        for line in c.content.lines() {
            println!("{:indent$}  {line}", "");
        }
        let mentions = c.mentions();
        if !mentions.is_empty() {
            println!("{:indent$}  mentions: @{}", "", mentions.join(", @"));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = <Opt as structopt::StructOpt>::from_args();
    tracing::debug!(host = %opt.host, "starting");

    let anonymous = HttpBackend::new(opt.host);
    let admin = || -> anyhow::Result<HttpBackend> {
        Ok(anonymous.clone().with_token(token_from_env("ADMIN_TOKEN")?))
    };
    let user = || -> anyhow::Result<HttpBackend> {
        Ok(anonymous.clone().with_token(token_from_env("LAFDA_TOKEN")?))
    };
    let optional_user = || match std::env::var_os("LAFDA_TOKEN") {
        Some(_) => user(),
        None => Ok(anonymous.clone()),
    };

    match opt.cmd {
        Command::CreateUser {
            name,
            initial_password,
            admin: is_admin,
        } => {
            let id = UserId(Uuid::new_v4());
            let role = if is_admin { Role::Admin } else { Role::User };
            admin()?
                .admin_create_user(&NewUser::new(id, name, initial_password, role))
                .await
                .context("creating user")?;
            println!("{}", id.0);
        }
        Command::BanUser { user, unban } => {
            admin()?
                .admin_ban_user(&BanUser {
                    user_id: UserId(user),
                    banned: !unban,
                })
                .await
                .context("updating ban status")?;
        }
        Command::Login {
            name,
            password,
            device,
        } => {
            let token = anonymous
                .auth(&NewSession {
                    user: name,
                    password,
                    device,
                })
                .await
                .context("logging in")?;
            println!("{}", token.0);
        }
        Command::Logout => user()?.unauth().await.context("logging out")?,
        Command::Whoami => {
            let me = user()?.whoami().await.context("recovering current user")?;
            println!("{} ({}, {})", me.name, me.id.0, me.role.as_str());
        }
        Command::NewPost { title, body } => {
            let post = user()?
                .create_post(&NewPost { title, body })
                .await
                .context("creating post")?;
            println!("{}", post.id.0);
        }
        Command::Thread { post } => {
            let backend = optional_user()?;
            let p = backend
                .fetch_post(PostId(post))
                .await
                .context("fetching post")?;
            println!("{}\n", p.title);
            if !p.body.is_empty() {
                println!("{}\n", p.body);
            }
            let viewer = match backend.token() {
                Some(_) => Some(backend.whoami().await.context("recovering current user")?),
                None => None,
            };
            let mut reactions = PostReactions::new(backend.clone(), PostId(post), viewer);
            reactions.load().await.context("loading reactions")?;
            let counts = ReactionType::ALL
                .iter()
                .map(|r| format!("{} {}", r.as_str(), reactions.board().count(*r)))
                .collect::<Vec<_>>();
            println!("{}\n", counts.join(" | "));
            print_thread(&load_section(backend, post).await?);
        }
        Command::Comment {
            post,
            content,
            parent,
        } => {
            let mut section = load_section(user()?, post).await?;
            let id = section
                .submit(content, parent.map(CommentId))
                .await
                .context("posting comment")?;
            println!("{}", id.0);
        }
        Command::Delete { post, comment } => {
            let mut section = load_section(user()?, post).await?;
            section
                .delete(CommentId(comment))
                .await
                .context("deleting comment")?;
        }
        Command::Vote {
            post,
            comment,
            down,
        } => {
            let mut section = load_section(user()?, post).await?;
            let vote_type = if down {
                VoteType::Downvote
            } else {
                VoteType::Upvote
            };
            section
                .vote(CommentId(comment), vote_type)
                .await
                .context("voting")?;
            if let Some(node) = section.forest().find(CommentId(comment)) {
                println!("{:+}", node.comment.score());
            }
        }
        Command::React { post, reaction } => {
            let reaction = ReactionType::parse(&reaction)
                .ok_or_else(|| anyhow!("unknown reaction {reaction:?}"))?;
            let backend = user()?;
            let viewer = backend.whoami().await.context("recovering current user")?;
            let mut reactions = PostReactions::new(backend, PostId(post), Some(viewer));
            reactions.load().await.context("loading reactions")?;
            let change = reactions.toggle(reaction).await.context("reacting")?;
            tracing::debug!(%post, ?change, "reaction toggled");
            println!(
                "{} {}",
                reaction.as_str(),
                reactions.board().count(reaction)
            );
        }
    }

    Ok(())
}
