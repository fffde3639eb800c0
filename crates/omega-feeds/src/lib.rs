//! Feed source contracts and the RSS/Atom/JSON Feed reader.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::SecondsFormat;
use feed_rs::model::Entry;
use omega_core::FeedEntry;
use omega_storage::{FetchError, HttpFetcher};
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "omega-feeds";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing feed: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
}

/// Resolves one configured feed URL into its entries.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_entries(&self, url: &str) -> Result<Vec<FeedEntry>, FeedError>;
}

/// Where a configured feed lives. Anything without an http(s) scheme is read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLocation {
    Remote(String),
    Local(PathBuf),
}

impl FeedLocation {
    pub fn parse(url: &str) -> Self {
        let trimmed = url.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Remote(trimmed.to_string())
        } else if lower.starts_with("file://") {
            Self::Local(PathBuf::from(&trimmed["file://".len()..]))
        } else {
            Self::Local(PathBuf::from(trimmed))
        }
    }
}

/// Default source: HTTP for remote feeds, the filesystem for local ones.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    http: HttpFetcher,
}

impl HttpFeedSource {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }

    async fn read_bytes(&self, location: &FeedLocation) -> Result<Vec<u8>, FeedError> {
        match location {
            FeedLocation::Remote(url) => {
                let resp = self.http.fetch_bytes(url).await?;
                if resp.final_url != *url {
                    debug!(url, final_url = %resp.final_url, status = %resp.status, "feed redirected");
                }
                Ok(resp.body)
            }
            FeedLocation::Local(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| FeedError::Read {
                        path: path.clone(),
                        source,
                    })
            }
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_entries(&self, url: &str) -> Result<Vec<FeedEntry>, FeedError> {
        let location = FeedLocation::parse(url);
        let bytes = self.read_bytes(&location).await?;
        let entries = parse_feed(&bytes)?;
        debug!(url, entries = entries.len(), "feed parsed");
        Ok(entries)
    }
}

/// Parse raw RSS/Atom/JSON Feed bytes into entries, in document order.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedEntry>, FeedError> {
    let feed = feed_rs::parser::parse(bytes)?;
    Ok(feed.entries.iter().map(entry_to_feed_entry).collect())
}

fn entry_to_feed_entry(entry: &Entry) -> FeedEntry {
    let summary = entry
        .summary
        .as_ref()
        .map(|text| text.content.clone())
        .filter(|text| !text.trim().is_empty())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
        .unwrap_or_default();

    FeedEntry {
        title: entry
            .title
            .as_ref()
            .map(|text| text.content.clone())
            .unwrap_or_default(),
        link: select_entry_link(entry),
        published: entry
            .published
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default(),
        summary,
    }
}

// Prefer an alternate (or rel-less) link, then any link, then a URL-shaped id.
fn select_entry_link(entry: &Entry) -> String {
    let usable = || entry.links.iter().filter(|l| !l.href.trim().is_empty());

    if let Some(link) = usable().find(|l| {
        l.rel
            .as_deref()
            .map_or(true, |rel| rel.is_empty() || rel.eq_ignore_ascii_case("alternate"))
    }) {
        return link.href.trim().to_string();
    }
    if let Some(link) = usable().next() {
        return link.href.trim().to_string();
    }

    let id = entry.id.trim();
    if id.starts_with("http://") || id.starts_with("https://") {
        return id.to_string();
    }
    String::new()
}
