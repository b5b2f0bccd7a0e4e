//! Roost - command-line front end for the feed sync engine

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use roost::{ApiClient, Config, Post, PostRepository, PostStore, Session, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG=debug for verbose output)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match parse_args()? {
        Command::Feed => feed(),
        Command::Refresh => refresh().await,
        Command::Post { content } => post(&content).await,
        Command::Like { id } => like(id).await,
        Command::Remove { id } => remove(id).await,
        Command::Watch => watch().await,
        Command::Reveal => reveal(),
        Command::Login { login, password } => sign_in(&login, &password).await,
        Command::Logout => sign_out(),
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            println!("roost {}", roost::VERSION);
            Ok(())
        }
    }
}

/// CLI commands
enum Command {
    Feed,
    Refresh,
    Post { content: String },
    Like { id: i64 },
    Remove { id: i64 },
    Watch,
    Reveal,
    Login { login: String, password: String },
    Logout,
    Help,
    Version,
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() == 1 {
        return Ok(Command::Feed);
    }

    match args[1].as_str() {
        "-h" | "--help" | "help" => Ok(Command::Help),
        "-v" | "--version" | "version" => Ok(Command::Version),

        "feed" => Ok(Command::Feed),
        "refresh" => Ok(Command::Refresh),
        "watch" => Ok(Command::Watch),
        "reveal" => Ok(Command::Reveal),
        "logout" => Ok(Command::Logout),

        "post" => {
            let content = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("Missing post content"))?
                .clone();
            Ok(Command::Post { content })
        }

        "like" => Ok(Command::Like {
            id: parse_id(args.get(2))?,
        }),

        "remove" | "rm" => Ok(Command::Remove {
            id: parse_id(args.get(2))?,
        }),

        "login" => {
            let login = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("Missing login"))?
                .clone();
            let password = args
                .get(3)
                .ok_or_else(|| anyhow::anyhow!("Missing password"))?
                .clone();
            Ok(Command::Login { login, password })
        }

        other => Err(anyhow::anyhow!(
            "Unknown command: {other}\nRun 'roost --help' for usage"
        )),
    }
}

fn parse_id(arg: Option<&String>) -> Result<i64> {
    arg.ok_or_else(|| anyhow::anyhow!("Missing post id"))?
        .parse()
        .map_err(|_| anyhow::anyhow!("Post id must be a number"))
}

/// Wire config + session + store + API client into a repository
fn build() -> Result<(PostRepository, Arc<PostStore>, SessionStore, Config)> {
    let config = Config::load()?;
    let session = SessionStore::open()?;
    let store = Arc::new(PostStore::open()?);
    let api = Arc::new(ApiClient::new(&config.base_url, session.token().as_deref()));

    let repo = PostRepository::new(api, store.clone())
        .with_poll_interval(Duration::from_secs(config.poll_interval_secs));

    Ok((repo, store, session, config))
}

fn feed() -> Result<()> {
    let (_, store, session, config) = build()?;

    let posts = store.visible();
    if posts.is_empty() {
        println!("No posts cached. Run 'roost refresh' first.");
        return Ok(());
    }

    let me = session.user_id();
    for post in &posts {
        let liked = if post.liked_by_me { "♥" } else { " " };
        let mine = if me.is_some_and(|id| post.owned_by(id)) {
            " (you)"
        } else {
            ""
        };
        println!(
            "#{:<6} {:>4} {liked} {}{mine}  {}",
            post.id,
            post.relative_time(),
            post.author,
            post.preview(config.preview_len),
        );
    }

    let hidden = store.hidden_count();
    if hidden > 0 {
        println!("\n{hidden} new post(s) hidden. Run 'roost reveal' to show them.");
    }

    Ok(())
}

async fn refresh() -> Result<()> {
    let (repo, store, _, _) = build()?;
    repo.refresh_all().await?;
    println!("Refreshed: {} post(s) visible.", store.visible().len());
    Ok(())
}

async fn post(content: &str) -> Result<()> {
    let (repo, _, _, _) = build()?;
    let saved = repo.save(&Post::draft(content)).await?;
    println!("Posted #{}.", saved.id);
    Ok(())
}

async fn like(id: i64) -> Result<()> {
    let (repo, store, _, _) = build()?;
    repo.like_by_id(id).await?;

    match store.get_by_id(id)? {
        Some(post) => {
            let state = if post.liked_by_me { "liked" } else { "unliked" };
            println!("Post #{id} {state} ({} likes).", post.likes);
        }
        None => println!("Post #{id} is not cached locally."),
    }
    Ok(())
}

async fn remove(id: i64) -> Result<()> {
    let (repo, _, _, _) = build()?;
    repo.remove_by_id(id).await?;
    println!("Post #{id} removed.");
    Ok(())
}

async fn watch() -> Result<()> {
    let (repo, _, _, config) = build()?;

    let since = repo.latest_id().unwrap_or(0);
    let mut newer = repo.newer_posts(since);

    println!(
        "Watching for new posts every {}s (Ctrl-C to stop)...",
        config.poll_interval_secs
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            count = newer.recv() => match count {
                Some(count) => {
                    println!("{count} new post(s) arrived. Run 'roost reveal' to show them.");
                }
                None => break,
            },
        }
    }

    Ok(())
}

fn reveal() -> Result<()> {
    let (repo, store, _, _) = build()?;
    repo.show_all_hidden();
    println!("All posts visible ({} total).", store.visible().len());
    Ok(())
}

async fn sign_in(login: &str, password: &str) -> Result<()> {
    let (_, _, session, config) = build()?;

    let client = ApiClient::new(&config.base_url, None);
    let auth = client.authenticate(login, password).await?;

    session.set(Session {
        id: auth.id,
        token: auth.token,
    })?;
    println!("Signed in as user #{}.", auth.id);
    Ok(())
}

fn sign_out() -> Result<()> {
    let (_, _, session, _) = build()?;
    session.clear()?;
    println!("Signed out.");
    Ok(())
}

fn print_help() {
    println!(
        "roost {} - local-first feed sync

USAGE:
    roost [COMMAND]

COMMANDS:
    feed               Show the cached feed (default)
    refresh            Fetch all posts from the server
    post <content>     Publish a new post
    like <id>          Toggle like on a post
    remove <id>        Remove a post
    watch              Poll for new posts until interrupted
    reveal             Make newly discovered posts visible
    login <user> <pw>  Sign in and store the session
    logout             Clear the stored session
    help               Show this help
    version            Show the version

Configuration lives in ~/.config/roost/config.toml.
Set RUST_LOG=debug for verbose logging.",
        roost::VERSION
    );
}
