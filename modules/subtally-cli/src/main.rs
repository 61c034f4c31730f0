use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use subcount_client::SubcountClient;
use subtally_common::{ChannelMetadata, Direction, EnvConfig, TrackedChannel};
use subtally_engine::{JsonFileStore, Roster};

mod render;

#[derive(Parser)]
#[command(name = "subtally", about = "Live subscriber count leaderboard")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a channel
    Add {
        channel_id: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        thumbnail: String,
        /// ISO country code
        #[arg(long)]
        country: Option<String>,
        /// Count shown until the first successful fetch
        #[arg(long, default_value_t = 0)]
        baseline: u64,
    },

    /// Update a tracked channel's title, thumbnail, country or baseline
    Refresh {
        channel_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        thumbnail: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        baseline: Option<u64>,
    },

    /// Stop tracking a channel and discard its adjustment
    Remove { channel_id: String },

    /// Add a signed offset to a channel's adjustment
    Adjust {
        channel_id: String,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
    },

    /// Step a channel's adjustment by one
    Nudge {
        channel_id: String,
        /// up or down
        direction: Direction,
    },

    /// Clear every adjustment
    ResetAdjustments,

    /// Compare two tracked channels
    Pair { left: String, right: String },

    /// Remove a comparison by id
    Unpair { pair_id: Uuid },

    /// Remove comparisons that reference untracked channels
    PrunePairs,

    /// Show or change polling settings
    Config {
        /// Tick period in milliseconds
        #[arg(long)]
        poll_interval: Option<u64>,
        /// Cache lifetime hint in milliseconds
        #[arg(long)]
        cache_ttl: Option<u64>,
        #[arg(long)]
        bypass_cache: Option<bool>,
        /// Restore defaults before applying other flags
        #[arg(long)]
        reset: bool,
    },

    /// Print the leaderboard from last known counts without polling
    List,

    /// Poll continuously and redraw on every cycle
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("subtally=warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let env = EnvConfig::from_env()?;
    env.log_redacted();

    let store = Arc::new(JsonFileStore::open(&env.store_path));
    let client = SubcountClient::new(&env.api_base, env.fetch_timeout)
        .context("Failed to build HTTP client")?;
    let roster = Roster::open(store, Arc::new(client));

    match cli.command {
        Commands::Add {
            channel_id,
            title,
            thumbnail,
            country,
            baseline,
        } => {
            let mut channel = TrackedChannel::new(channel_id, title).with_baseline(baseline);
            channel.thumbnail = thumbnail;
            if let Some(code) = country {
                channel = channel.with_country(&code);
            }
            let channel_id = channel.channel_id.clone();
            roster.add_channel(channel)?;
            println!("Tracking {channel_id}");
        }
        Commands::Refresh {
            channel_id,
            title,
            thumbnail,
            country,
            baseline,
        } => {
            let channel = roster.refresh_channel_metadata(
                &channel_id,
                ChannelMetadata {
                    title,
                    thumbnail,
                    country_code: country,
                    subscriber_count: baseline,
                },
            )?;
            println!("Updated {} ({})", channel.channel_id, channel.title);
        }
        Commands::Remove { channel_id } => {
            let channel = roster.remove_channel(&channel_id)?;
            println!("Stopped tracking {} ({})", channel.channel_id, channel.title);
        }
        Commands::Adjust { channel_id, delta } => {
            let offset = roster.add_adjustment(&channel_id, delta)?;
            println!("{channel_id} adjustment is now {offset:+}");
        }
        Commands::Nudge {
            channel_id,
            direction,
        } => {
            let offset = roster.nudge(&channel_id, direction)?;
            println!("{channel_id} adjustment is now {offset:+}");
        }
        Commands::ResetAdjustments => {
            roster.reset_adjustments()?;
            println!("All adjustments cleared");
        }
        Commands::Pair { left, right } => match roster.add_pair(&left, &right)? {
            Some(pair_id) => println!("Comparing {left} and {right} ({pair_id})"),
            None => println!("{left} and {right} are already compared"),
        },
        Commands::Unpair { pair_id } => match roster.remove_pair(pair_id)? {
            Some(_) => println!("Removed comparison {pair_id}"),
            None => println!("No comparison with id {pair_id}"),
        },
        Commands::PrunePairs => {
            let removed = roster.prune_pairs()?;
            println!("Removed {removed} stale comparison(s)");
        }
        Commands::Config {
            poll_interval,
            cache_ttl,
            bypass_cache,
            reset,
        } => {
            if reset {
                roster.reset_config()?;
            }
            let config = roster.update_config(|config| {
                if let Some(ms) = poll_interval {
                    config.poll_interval = ms;
                }
                if let Some(ms) = cache_ttl {
                    config.cache_ttl = ms;
                }
                if let Some(bypass) = bypass_cache {
                    config.bypass_cache = bypass;
                }
            })?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::List => {
            print!("{}", render::leaderboard(&roster.leaderboard()));
            print!("{}", render::comparisons(&roster.comparisons()));
        }
        Commands::Watch => watch(&roster, &env).await?,
    }

    Ok(())
}

/// Run the poller and redraw after every publish until Ctrl-C.
async fn watch(roster: &Roster, env: &EnvConfig) -> Result<()> {
    let config = roster
        .config()
        .poll_config()
        .with_fetch_timeout(env.fetch_timeout);
    let cancel = CancellationToken::new();
    let mut published = roster.scheduler().subscribe();
    let poller = roster.spawn_poller(config, cancel.clone());
    let term = console::Term::stdout();

    redraw(&term, roster)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = published.changed() => {
                if changed.is_err() {
                    break;
                }
                redraw(&term, roster)?;
            }
        }
    }

    info!("Stopping poller");
    cancel.cancel();
    poller.await?;
    Ok(())
}

fn redraw(term: &console::Term, roster: &Roster) -> Result<()> {
    term.clear_screen()?;
    term.write_line(&render::status(&roster.snapshot()))?;
    term.write_line("")?;
    term.write_str(&render::leaderboard(&roster.leaderboard()))?;
    let comparisons = render::comparisons(&roster.comparisons());
    if !comparisons.is_empty() {
        term.write_line("")?;
        term.write_str(&comparisons)?;
    }
    Ok(())
}
