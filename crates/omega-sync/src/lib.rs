//! Ingest, score, persist and notify pipeline.

mod config;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use omega_core::{fingerprint, FeedEntry, Opportunity};
use omega_feeds::{FeedError, FeedSource, HttpFeedSource};
use omega_notify::Notifier;
use omega_storage::{CsvSink, HttpClientConfig, HttpFetcher, OpportunityStore, StoreError};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub use config::{OmegaConfig, DEFAULT_CONFIG_PATH};

pub const CRATE_NAME: &str = "omega-sync";

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub feeds: usize,
    pub failed_feeds: usize,
    pub entries_seen: usize,
    pub duplicates: usize,
    pub stored: usize,
    pub failed_entries: usize,
    pub notified: usize,
    pub failed_notifications: usize,
}

impl SyncRunSummary {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            feeds: 0,
            failed_feeds: 0,
            entries_seen: 0,
            duplicates: 0,
            stored: 0,
            failed_entries: 0,
            notified: 0,
            failed_notifications: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Duplicate,
    Stored {
        notified: bool,
        failed_notifications: usize,
    },
}

/// Owns the row store, CSV sink, feed source and notifier for the duration of a run.
pub struct SyncPipeline {
    config: OmegaConfig,
    store: OpportunityStore,
    csv: CsvSink,
    feeds: Box<dyn FeedSource>,
    notifier: Notifier,
}

impl SyncPipeline {
    pub async fn open(config: OmegaConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: config.http_timeout(),
            user_agent: Some(config.user_agent.clone()),
        })?;
        let store = OpportunityStore::open(&config.db_path)
            .await
            .with_context(|| format!("opening row store {}", config.db_path.display()))?;
        let csv = CsvSink::new(config.csv_path.clone());
        let notifier =
            Notifier::from_config(http.client(), &config.notify, |key| std::env::var(key).ok());
        info!(
            db = %store.path().display(),
            csv = %csv.path().display(),
            "pipeline ready"
        );

        Ok(Self {
            config,
            store,
            csv,
            feeds: Box::new(HttpFeedSource::new(http)),
            notifier,
        })
    }

    pub fn with_feed_source(mut self, feeds: Box<dyn FeedSource>) -> Self {
        self.feeds = feeds;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &OmegaConfig {
        &self.config
    }

    pub fn store(&self) -> &OpportunityStore {
        &self.store
    }

    /// One pass over every configured feed. Feed and entry failures are logged and counted.
    pub async fn run_once(&self) -> SyncRunSummary {
        let mut summary = SyncRunSummary::start();
        info!(
            run_id = %summary.run_id,
            feeds = self.config.rss_feeds.len(),
            channels = ?self.notifier.channel_names(),
            "run started"
        );

        for url in &self.config.rss_feeds {
            summary.feeds += 1;
            let result = self
                .process_feed(url, &mut summary)
                .instrument(info_span!("feed", url = url.as_str()))
                .await;
            if let Err(err) = result {
                summary.failed_feeds += 1;
                warn!(url = url.as_str(), error = %err, "error fetching feed");
            }
        }

        summary.finished_at = Utc::now();
        summary
    }

    async fn process_feed(&self, url: &str, summary: &mut SyncRunSummary) -> Result<(), FeedError> {
        let entries = self.feeds.fetch_entries(url).await?;

        for entry in &entries {
            summary.entries_seen += 1;
            match self.process_entry(url, entry).await {
                Ok(EntryOutcome::Duplicate) => summary.duplicates += 1,
                Ok(EntryOutcome::Stored {
                    notified,
                    failed_notifications,
                }) => {
                    summary.stored += 1;
                    summary.notified += usize::from(notified);
                    summary.failed_notifications += failed_notifications;
                }
                Err(err) => {
                    summary.failed_entries += 1;
                    warn!(link = entry.link.as_str(), error = %err, "entry skipped");
                }
            }
        }
        Ok(())
    }

    async fn process_entry(&self, url: &str, entry: &FeedEntry) -> Result<EntryOutcome, StoreError> {
        if self.store.exists(&fingerprint(url, &entry.link)).await? {
            return Ok(EntryOutcome::Duplicate);
        }

        let opp = Opportunity::from_entry(url, entry, Utc::now());
        if !self.store.insert(&opp).await? {
            return Ok(EntryOutcome::Duplicate);
        }
        // Not transactional with the insert above: a failure here leaves the row without a CSV line.
        self.csv.append(&opp)?;

        let mut outcome = EntryOutcome::Stored {
            notified: false,
            failed_notifications: 0,
        };
        if opp.should_notify() && !self.notifier.is_empty() {
            let report = self.notifier.dispatch(&opp).await;
            outcome = EntryOutcome::Stored {
                notified: report.delivered > 0,
                failed_notifications: report.failed,
            };
        }

        info!(
            title = opp.title.as_str(),
            tags = %opp.tags_joined(),
            score = opp.score,
            "[+] stored opportunity"
        );
        Ok(outcome)
    }

    pub async fn close(self) {
        self.store.close().await;
    }
}

/// Load config, run a single pass and release the store.
pub async fn run_sync_once(config_path: impl AsRef<Path>) -> Result<SyncRunSummary> {
    let config = OmegaConfig::load(config_path)?;
    let pipeline = SyncPipeline::open(config).await?;
    let summary = pipeline.run_once().await;
    pipeline.close().await;
    Ok(summary)
}

/// Re-run the pipeline every `every` until Ctrl-C. The first pass starts immediately.
///
/// Ctrl-C is honoured mid-pass too: the pass in flight is dropped at its next await point.
pub async fn run_watch(pipeline: &SyncPipeline, every: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Polled first on every select, so the handler is installed before the first pass.
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            signal = &mut shutdown => return shutdown_requested(signal),
            _ = ticker.tick() => {}
        }

        tokio::select! {
            biased;
            signal = &mut shutdown => {
                warn!("pass interrupted, remaining feeds skipped");
                return shutdown_requested(signal);
            }
            summary = pipeline.run_once() => log_summary(&summary),
        }
    }
}

fn shutdown_requested(signal: std::io::Result<()>) -> Result<()> {
    signal.context("listening for ctrl-c")?;
    info!("shutdown requested");
    Ok(())
}

pub fn log_summary(summary: &SyncRunSummary) {
    info!(
        run_id = %summary.run_id,
        feeds = summary.feeds,
        failed_feeds = summary.failed_feeds,
        entries = summary.entries_seen,
        duplicates = summary.duplicates,
        stored = summary.stored,
        failed_entries = summary.failed_entries,
        notified = summary.notified,
        failed_notifications = summary.failed_notifications,
        "run finished"
    );
}
