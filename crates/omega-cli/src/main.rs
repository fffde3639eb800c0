use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use omega_storage::OpportunityStore;
use omega_sync::{
    log_summary, run_sync_once, run_watch, OmegaConfig, SyncPipeline, DEFAULT_CONFIG_PATH,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "omega")]
#[command(about = "Scan feeds for airdrops, testnets and quests; store and alert on the good ones")]
struct Cli {
    /// Path to the JSON config document.
    #[arg(long, global = true, env = "OMEGA_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one pass over every configured feed (default).
    Run,
    /// Keep running a pass every `poll_minutes` until Ctrl-C.
    Watch,
    /// Create the database table if it does not exist yet.
    Migrate,
    /// Print the most recently stored opportunities.
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Score a piece of text with the keyword table.
    Score {
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        summary: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let summary = run_sync_once(&cli.config).await?;
            log_summary(&summary);
            println!(
                "run complete: run_id={} feeds={} failed_feeds={} stored={} duplicates={} failed_entries={} notified={} failed_notifications={}",
                summary.run_id,
                summary.feeds,
                summary.failed_feeds,
                summary.stored,
                summary.duplicates,
                summary.failed_entries,
                summary.notified,
                summary.failed_notifications
            );
        }
        Commands::Watch => {
            let pipeline = SyncPipeline::open(OmegaConfig::load(&cli.config)?).await?;
            let every = pipeline.config().poll_interval();
            info!(every_secs = every.as_secs(), "watch mode");
            let result = run_watch(&pipeline, every).await;
            pipeline.close().await;
            result?;
        }
        Commands::Migrate => {
            let config = OmegaConfig::load(&cli.config)?;
            let store = OpportunityStore::open(&config.db_path)
                .await
                .with_context(|| format!("opening {}", config.db_path.display()))?;
            let rows = store.count().await?;
            store.close().await;
            println!("schema ready: {} ({rows} rows)", config.db_path.display());
        }
        Commands::Recent { limit } => {
            let config = OmegaConfig::load(&cli.config)?;
            let store = OpportunityStore::open(&config.db_path)
                .await
                .with_context(|| format!("opening {}", config.db_path.display()))?;
            let rows = store.recent(limit).await?;
            store.close().await;
            for opp in rows {
                println!(
                    "{}  score={:<3} [{}] {}\n    {}",
                    opp.fetched_at_text(),
                    opp.score,
                    opp.tags_joined(),
                    opp.title,
                    opp.url
                );
            }
        }
        Commands::Score { title, summary } => {
            let outcome = omega_core::score_text(&title, &summary);
            println!(
                "score={} tags={} reason={}",
                outcome.score,
                outcome.tags.join(","),
                outcome.reason
            );
        }
    }

    Ok(())
}
