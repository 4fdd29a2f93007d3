use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use skein::config::Config;
use skein::feed::fetch_feed;
use skein::news::UnreadCounts;
use skein::scheduler::Scheduler;
use skein::storage::{Database, Feed, FeedSourceType, Repository, User};

#[derive(Parser, Debug)]
#[command(name = "skein", about = "Multi-user feed aggregator with duplicate folding")]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "skein.toml")]
    config: PathBuf,

    /// Override the database path from the config file
    #[arg(long)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the refresh scheduler until interrupted
    Run,
    /// Refresh every feed once and exit
    Refresh,
    /// Register a feed URL, bootstrapping its metadata from a live fetch
    AddFeed { url: String },
    /// Create a user account
    AddUser { email: String },
    /// Subscribe a user to a registered feed
    Subscribe { email: String, url: String },
    /// List a user's unread news items
    Unread { email: String },
    /// Mark news items as read for a user
    MarkRead { email: String, ids: Vec<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skein=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::load(&args.config).context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", config.database_path))?;
    let repository = Arc::new(db);

    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .build()
        .context("Failed to build HTTP client")?;

    match args.command {
        Command::Run => {
            let scheduler = Scheduler::new(repository, client, config);
            scheduler.run().await?;
        }
        Command::Refresh => {
            let scheduler = Scheduler::new(repository, client, config);
            let outcomes = scheduler.refresh_cycle().await?;
            let new_news: usize = outcomes.iter().map(|o| o.new_news_items).sum();
            println!(
                "Refreshed {} feed(s), {} new news item(s)",
                outcomes.len(),
                new_news
            );
        }
        Command::AddFeed { url } => {
            if repository.fetch_feed_by_url(&url).await?.is_some() {
                bail!("Feed '{}' is already registered", url);
            }

            // A stub carries the URL through the fetch; the stored feed is
            // rebuilt from the parsed document
            let stub = Feed {
                id: Uuid::new_v4().to_string(),
                url: url.clone(),
                title: url.clone(),
                description: None,
                link: None,
                source_type: FeedSourceType::Rss,
                category: None,
                image_url: None,
                image_title: None,
                image_link: None,
                last_fetched: None,
                number_of_items: 0,
                created_on: Utc::now(),
            };
            let document = fetch_feed(&client, &stub, config.fetch_timeout())
                .await
                .with_context(|| format!("Failed to fetch '{}'", url))?;

            let feed = document.feed.into_feed(&url, Utc::now());
            repository.upsert_feed(&feed).await?;
            println!("Registered '{}' ({})", feed.title, feed.id);
        }
        Command::AddUser { email } => {
            if repository.fetch_user_by_email(&email).await?.is_some() {
                bail!("User '{}' already exists", email);
            }
            let user = User::new(&email, Utc::now());
            repository.upsert_users(std::slice::from_ref(&user)).await?;
            println!("Created user '{}' ({})", user.email_address, user.id);
        }
        Command::Subscribe { email, url } => {
            let mut user = repository
                .fetch_user_by_email(&email)
                .await?
                .with_context(|| format!("No user '{}'", email))?;
            let feed = repository
                .fetch_feed_by_url(&url)
                .await?
                .with_context(|| format!("No feed registered at '{}'", url))?;

            user.subscribe(&feed.id);
            repository.upsert_users(std::slice::from_ref(&user)).await?;
            println!("Subscribed '{}' to '{}'", user.email_address, feed.title);
        }
        Command::Unread { email } => {
            let user = repository
                .fetch_user_by_email(&email)
                .await?
                .with_context(|| format!("No user '{}'", email))?;

            println!(
                "{} unread item(s) for '{}'",
                user.number_of_unread_items, user.email_address
            );
            for feed in repository.fetch_feeds().await? {
                if !user.is_subscribed_to(&feed.id) {
                    continue;
                }
                for item in repository.fetch_unread_news_items(&feed, &user).await? {
                    let alternates = if item.alternates.is_empty() {
                        String::new()
                    } else {
                        format!(" (+{} alternate(s))", item.alternates.len())
                    };
                    println!("  [{}] {} - {}{}", item.id, feed.title, item.title, alternates);
                }
            }
        }
        Command::MarkRead { email, ids } => {
            let mut user = repository
                .fetch_user_by_email(&email)
                .await?
                .with_context(|| format!("No user '{}'", email))?;

            let counts = UnreadCounts::new(repository.clone());
            counts.mark_news_items_read(&mut user, &ids).await?;
            println!(
                "Marked {} item(s) read, {} unread remaining",
                ids.len(),
                user.number_of_unread_items
            );
        }
    }

    Ok(())
}
