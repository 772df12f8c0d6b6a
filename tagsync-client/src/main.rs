//! tagsync-client - headless reviewer client
//!
//! Connects, fetches the tag list, row table and clip layout, then runs one
//! command against the server.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tagsync_client::{CacheEntry, ClientConfig, ClientSession, Selection};

/// Command-line arguments for tagsync-client
#[derive(Parser, Debug)]
#[command(name = "tagsync-client")]
#[command(about = "Headless client for the tagsync label server")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to ./tagsync-client.toml, then the user config dir)
    #[arg(short, long, env = "TAGSYNC_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Server address, overrides the config file
    #[arg(long, env = "TAGSYNC_HOST")]
    host: Option<String>,

    /// Server port, overrides the config file
    #[arg(short, long, env = "TAGSYNC_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print tags, row count and layout
    Summary {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Download the image of one row
    Fetch { row: u32, out: PathBuf },
    /// Select a tag (1-based) for every row of a group, or `clear`
    Tag { group: usize, tag: String },
    /// Ask the server to write the labelled table
    Save,
    /// Load every image not cached yet
    Prefetch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = ClientConfig::resolve_path(args.config);
    let config_existed = config_path.exists();
    let mut config = ClientConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting tagsync-client v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if !config_existed {
        warn!(
            "{} not found, wrote default configuration",
            config_path.display()
        );
    }

    let wait = config.read_timeout();
    let session = ClientSession::connect(config)
        .await
        .context("Failed to connect")?;
    session.bootstrap().await.context("Failed to load dataset info")?;

    let result = run(&session, args.command, wait).await;
    session.close().await;
    result
}

async fn run(session: &ClientSession, command: Command, wait: Duration) -> Result<()> {
    match command {
        Command::Summary { json } => {
            let summary = session.summary().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("server:  {}", summary.server);
                println!("rows:    {}", summary.data_cnt);
                println!("clips:   {}", summary.clip_cnt);
                println!("groups:  {}", summary.group_cnt);
                for (i, (alias, count)) in summary
                    .aliases
                    .iter()
                    .zip(summary.tagged_rows.iter().chain(std::iter::repeat(&0)))
                    .enumerate()
                {
                    println!("[{}] {} ({} rows)", i + 1, alias, count);
                }
            }
        }
        Command::Fetch { row, out } => match session.fetch_image(row, wait).await? {
            CacheEntry::Ready(bytes) => {
                std::fs::write(&out, &bytes)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
                println!("{} bytes written to {}", bytes.len(), out.display());
            }
            CacheEntry::Failed(message) => bail!("Server error for row {}: {}", row, message),
            other => bail!("Image for row {} not available ({:?})", row, other),
        },
        Command::Tag { group, tag } => {
            let selection = parse_selection(&tag)?;
            let mut events = session.subscribe();
            session.goto_group(group).await;
            let outcome = session.select_tag(group, selection).await?;
            if !session.wait_for_acks(&mut events, outcome, wait).await? {
                bail!("Server rejected the update, check the server log");
            }
            println!(
                "Group {} updated ({} mutation(s), {} save(s))",
                group, outcome.mutations, outcome.saves
            );
        }
        Command::Prefetch => {
            let mut events = session.subscribe();
            let requested = session.request_all_images().await?;
            let (ready, failed) = session.wait_for_images(&mut events, requested, wait).await?;
            println!("{} images loaded, {} unavailable", ready, failed);
            if failed > 0 {
                warn!("{} rows have no readable image on the server", failed);
            }
        }
        Command::Save => {
            let mut events = session.subscribe();
            session.request_save().await?;
            let outcome = tagsync_client::SubmitOutcome {
                mutations: 0,
                saves: 1,
            };
            if !session.wait_for_acks(&mut events, outcome, wait).await? {
                bail!("Server failed to save, check the server log");
            }
            println!("Saved");
        }
    }
    Ok(())
}

/// `clear` or a 1-based tag number
fn parse_selection(raw: &str) -> Result<Selection> {
    if raw.eq_ignore_ascii_case("clear") {
        return Ok(Selection::Clear);
    }
    let tag: usize = raw
        .parse()
        .with_context(|| format!("'{}' is neither a tag number nor 'clear'", raw))?;
    if tag == 0 {
        bail!("Tag numbers start at 1");
    }
    Ok(Selection::Tag(tag - 1))
}
