//! Row store, CSV sink and HTTP fetch utilities for Omega Prime.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use omega_core::Opportunity;
use reqwest::StatusCode;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

pub const CRATE_NAME: &str = "omega-storage";

/// Column order shared by the row store and the CSV sink.
pub const COLUMNS: [&str; 10] = [
    "id",
    "source",
    "title",
    "url",
    "published",
    "summary",
    "score",
    "reason",
    "tags",
    "fetched_at",
];

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS opportunities (
    id TEXT PRIMARY KEY,
    source TEXT,
    title TEXT,
    url TEXT,
    published TEXT,
    summary TEXT,
    score INTEGER,
    reason TEXT,
    tags TEXT,
    fetched_at TEXT
)
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("unreadable fetched_at {value:?} for {id}")]
    Timestamp { id: String, value: String },
}

/// SQLite-backed opportunity table. Owns a single-connection pool for the run.
#[derive(Debug, Clone)]
pub struct OpportunityStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl OpportunityStore {
    /// Open (creating if missing) the database file and make sure the table exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool, path };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT id FROM opportunities WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Insert-or-ignore. Returns `true` when a new row was written, `false` when the id existed.
    pub async fn insert(&self, opp: &Opportunity) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO opportunities
            (id, source, title, url, published, summary, score, reason, tags, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&opp.id)
        .bind(&opp.source)
        .bind(&opp.title)
        .bind(&opp.url)
        .bind(&opp.published)
        .bind(&opp.summary)
        .bind(i64::from(opp.score))
        .bind(&opp.reason)
        .bind(opp.tags_joined())
        .bind(opp.fetched_at_text())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if !inserted {
            debug!(id = opp.id.as_str(), "insert ignored: id already stored");
        }
        Ok(inserted)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM opportunities")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Most recently fetched rows first, ties broken by score.
    pub async fn recent(&self, limit: u32) -> Result<Vec<Opportunity>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, source, title, url, published, summary, score, reason, tags, fetched_at
            FROM opportunities
            ORDER BY fetched_at DESC, score DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_opportunity).collect()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_opportunity(row: &SqliteRow) -> Result<Opportunity, StoreError> {
    let text = |column: &str| -> Result<String, StoreError> {
        Ok(row
            .try_get::<Option<String>, _>(column)?
            .unwrap_or_default())
    };

    let id = text("id")?;
    let fetched_raw = text("fetched_at")?;
    let fetched_at = parse_fetched_at(&fetched_raw).ok_or_else(|| StoreError::Timestamp {
        id: id.clone(),
        value: fetched_raw.clone(),
    })?;
    let score = row.try_get::<Option<i64>, _>("score")?.unwrap_or(0);

    Ok(Opportunity {
        source: text("source")?,
        title: text("title")?,
        url: text("url")?,
        published: text("published")?,
        summary: text("summary")?,
        score: u32::try_from(score).unwrap_or(0),
        reason: text("reason")?,
        tags: split_tags(&text("tags")?),
        fetched_at,
        id,
    })
}

/// Accepts RFC 3339 as well as naive ISO-8601 timestamps (treated as UTC).
pub fn parse_fetched_at(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn split_tags(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Append-only CSV export. The header row is written only when the file is created.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, opp: &Opportunity) -> Result<(), StoreError> {
        let exists = self.path.exists();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(file);

        if !exists {
            writer.write_record(COLUMNS)?;
        }

        let score = opp.score.to_string();
        let tags = opp.tags_joined();
        let fetched_at = opp.fetched_at_text();
        writer.write_record([
            opp.id.as_str(),
            opp.source.as_str(),
            opp.title.as_str(),
            opp.url.as_str(),
            opp.published.as_str(),
            opp.summary.as_str(),
            score.as_str(),
            opp.reason.as_str(),
            tags.as_str(),
            fetched_at.as_str(),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

/// Thin reqwest wrapper: one attempt per call, bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    /// Shared client, so outbound notification calls get the same timeout and user agent.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();

            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }

            let body = resp.bytes().await?.to_vec();
            Ok(FetchedResponse {
                status,
                final_url,
                body,
            })
        }
        .instrument(info_span!("http_fetch", url))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use omega_core::FeedEntry;
    use tempfile::tempdir;

    fn sample(link: &str, title: &str) -> Opportunity {
        let fetched_at = Utc
            .with_ymd_and_hms(2026, 2, 24, 12, 0, 0)
            .single()
            .expect("ts");
        Opportunity::from_entry(
            "https://feeds.example/rss",
            &FeedEntry {
                title: title.to_string(),
                link: link.to_string(),
                published: "Tue, 24 Feb 2026 10:00:00 +0000".to_string(),
                summary: "testnet, with \"quotes\"".to_string(),
            },
            fetched_at,
        )
    }

    #[tokio::test]
    async fn insert_is_ignored_on_conflict() {
        let dir = tempdir().expect("tempdir");
        let store = OpportunityStore::open(dir.path().join("omega.db"))
            .await
            .expect("open store");

        let first = sample("https://example.com/1", "Airdrop live");
        assert!(!store.exists(&first.id).await.expect("exists"));
        assert!(store.insert(&first).await.expect("first insert"));

        let mut rewritten = first.clone();
        rewritten.title = "changed title".to_string();
        assert!(!store.insert(&rewritten).await.expect("second insert"));

        assert!(store.exists(&first.id).await.expect("exists"));
        assert_eq!(store.count().await.expect("count"), 1);

        let rows = store.recent(10).await.expect("recent");
        assert_eq!(rows, vec![first]);
        store.close().await;
    }

    #[tokio::test]
    async fn schema_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("omega.db");
        let opp = sample("https://example.com/2", "Quest");

        let store = OpportunityStore::open(&path).await.expect("open");
        store.insert(&opp).await.expect("insert");
        store.close().await;

        let reopened = OpportunityStore::open(&path).await.expect("reopen");
        assert!(reopened.exists(&opp.id).await.expect("exists"));
        assert_eq!(reopened.count().await.expect("count"), 1);
        reopened.close().await;
    }

    #[test]
    fn csv_header_is_written_once_across_sinks() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("out").join("opportunities.csv");

        CsvSink::new(&path)
            .append(&sample("https://example.com/1", "Airdrop"))
            .expect("first append");
        CsvSink::new(&path)
            .append(&sample("https://example.com/2", "Bounty"))
            .expect("second append");

        let mut reader = csv::Reader::from_path(&path).expect("reader");
        let headers = reader.headers().expect("headers").clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), COLUMNS.to_vec());

        let records = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .expect("records");
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][2], "Airdrop");
        assert_eq!(&records[0][5], "testnet, with \"quotes\"");
        assert_eq!(&records[0][8], "airdrop,testnet");
        assert_eq!(&records[1][6], "8");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert_eq!(raw.matches("id,source,title").count(), 1);
    }

    #[test]
    fn fetched_at_accepts_naive_iso_timestamps() {
        let naive = parse_fetched_at("2026-02-24T12:00:00.123456").expect("naive");
        let zoned = parse_fetched_at("2026-02-24T12:00:00.123456Z").expect("zoned");
        assert_eq!(naive, zoned);
        assert!(parse_fetched_at("yesterday").is_none());
    }

    #[test]
    fn tags_split_skips_empty_segments() {
        assert_eq!(split_tags(""), Vec::<String>::new());
        assert_eq!(split_tags("airdrop,quest"), vec!["airdrop", "quest"]);
    }
}
