use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use tracing::info;

use watchpost::config::Config;
use watchpost::db::KvStore;
use watchpost::keys::{KeyCodec, KeyId, TargetIdKind};
use watchpost::state::{ConcernKind, ConcernStateManager, StateStore};

/// Watchpost: change detection and notification for watched accounts.
///
/// Manages the subscription and snapshot state that site pollers read and
/// write. Sites, groups and targets are addressed by id.
#[derive(Parser)]
#[command(name = "watchpost", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Show subscriptions and stored snapshots for a site
    Status {
        #[arg(long)]
        site: String,

        /// Target ids on this site are strings, not integers
        #[arg(long)]
        str_ids: bool,
    },

    /// Subscribe a group to a target
    Subscribe {
        #[arg(long)]
        site: String,

        #[arg(long)]
        group: i64,

        #[arg(long)]
        target: String,

        /// Follow live status changes
        #[arg(long)]
        live: bool,

        /// Follow new feed items
        #[arg(long)]
        news: bool,

        #[arg(long)]
        str_ids: bool,
    },

    /// Remove a group's subscription to a target
    Unsubscribe {
        #[arg(long)]
        site: String,

        #[arg(long)]
        group: i64,

        #[arg(long)]
        target: String,

        #[arg(long)]
        str_ids: bool,
    },

    /// Print the stored snapshot for a target as JSON
    Snapshot {
        #[arg(long)]
        site: String,

        #[arg(long)]
        target: String,

        #[arg(long)]
        str_ids: bool,
    },

    /// Delete expired keys from the database
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("watchpost=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Init => {
            info!("Initializing Watchpost database...");
            let table_count = init_database(&config).await?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nWatchpost is ready. Next step: add a subscription");
            println!("  watchpost subscribe --site <site> --group <id> --target <id> --live --news");
        }

        Commands::Status { site, str_ids } => {
            let manager = manager(&config, &site, str_ids)?;
            watchpost::status::show(&manager, &config.db_path).await?;
        }

        Commands::Subscribe {
            site,
            group,
            target,
            live,
            news,
            str_ids,
        } => {
            let manager = manager(&config, &site, str_ids)?;
            let target = manager.target(target_id(&target, str_ids)?);

            let mut kinds = Vec::new();
            if live {
                kinds.push(ConcernKind::Live);
            }
            if news {
                kinds.push(ConcernKind::News);
            }
            if kinds.is_empty() {
                anyhow::bail!("Nothing to follow. Pass --live, --news or both.");
            }

            let state = manager.subscribe(group, &target, &kinds).await?;
            let kinds: Vec<&str> = state.kinds.iter().map(|k| k.as_str()).collect();
            println!(
                "{} group {} now follows {} ({})",
                "Subscribed:".green().bold(),
                group,
                target,
                kinds.join(", ")
            );
        }

        Commands::Unsubscribe {
            site,
            group,
            target,
            str_ids,
        } => {
            let manager = manager(&config, &site, str_ids)?;
            let target = manager.target(target_id(&target, str_ids)?);
            if manager.unsubscribe(group, &target).await? {
                println!("{} group {} no longer follows {}", "Removed:".bold(), group, target);
            } else {
                println!("{}", format!("Group {group} was not subscribed to {target}").dimmed());
            }
        }

        Commands::Snapshot {
            site,
            target,
            str_ids,
        } => {
            let manager = manager(&config, &site, str_ids)?;
            let target = manager.target(target_id(&target, str_ids)?);
            match manager.get_snapshot(&target).await? {
                Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                None => println!("{}", format!("No snapshot stored for {target}").dimmed()),
            }
        }

        Commands::Sweep => {
            let kv = open_store(&config)?;
            let purged = kv.purge_expired().await?;
            println!("Purged {purged} expired keys");
        }
    }

    Ok(())
}

fn target_id(raw: &str, str_ids: bool) -> Result<KeyId> {
    if str_ids {
        return Ok(KeyId::from(raw));
    }
    raw.parse::<i64>()
        .map(KeyId::Int)
        .with_context(|| format!("Target id {raw:?} is not an integer (pass --str-ids for string ids)"))
}

fn manager(config: &Config, site: &str, str_ids: bool) -> Result<ConcernStateManager> {
    let id_kind = if str_ids {
        TargetIdKind::Str
    } else {
        TargetIdKind::Int
    };
    let store = StateStore::new(open_store(config)?, KeyCodec::new(site, id_kind));
    Ok(ConcernStateManager::new(store, config.diff_policy()))
}

/// Open the configured database (fails if `init` hasn't run).
#[cfg(feature = "sqlite")]
fn open_store(config: &Config) -> Result<Arc<dyn KvStore>> {
    watchpost::db::open_sqlite(&config.db_path)
}

#[cfg(not(feature = "sqlite"))]
fn open_store(_config: &Config) -> Result<Arc<dyn KvStore>> {
    anyhow::bail!(
        "This build has no persistent storage; the 'sqlite' feature is not compiled in.\n\
         Rebuild with: cargo build --features sqlite"
    )
}

/// Initialize the database (create if needed). Returns the table count.
#[cfg(feature = "sqlite")]
async fn init_database(config: &Config) -> Result<i64> {
    let store = watchpost::db::initialize_sqlite(&config.db_path)?;
    store.table_count().await
}

#[cfg(not(feature = "sqlite"))]
async fn init_database(_config: &Config) -> Result<i64> {
    anyhow::bail!(
        "Cannot initialize a database: the 'sqlite' feature is not compiled in.\n\
         Rebuild with: cargo build --features sqlite"
    )
}
