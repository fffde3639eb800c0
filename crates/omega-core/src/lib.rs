//! Core domain model, identity and keyword scoring for Omega Prime.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const CRATE_NAME: &str = "omega-core";

/// Minimum score (inclusive) at which an opportunity is pushed to notification channels.
pub const NOTIFY_MIN_SCORE: u32 = 3;

/// Keyword table applied by [`score_text`]. Order drives `tags` and `reason` ordering.
pub const KEYWORD_WEIGHTS: &[(&str, u32)] = &[
    ("airdrop", 5),
    ("testnet", 4),
    ("quest", 3),
    ("reward", 2),
    ("bounty", 4),
    ("grant", 2),
    ("retrodrop", 5),
    ("campaign", 2),
    ("earn", 1),
];

/// Parsed handoff contract from feed sources into the sync pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub published: String,
    pub summary: String,
}

/// Result of running the keyword table over an entry's text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub score: u32,
    pub tags: Vec<String>,
    pub reason: String,
}

/// Persisted opportunity. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub source: String,
    pub title: String,
    pub url: String,
    pub published: String,
    pub summary: String,
    pub score: u32,
    pub reason: String,
    pub tags: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl Opportunity {
    /// Build an opportunity from a feed entry, trimming title/summary and scoring the text.
    pub fn from_entry(source: &str, entry: &FeedEntry, fetched_at: DateTime<Utc>) -> Self {
        let title = entry.title.trim().to_string();
        let summary = entry.summary.trim().to_string();
        let ScoreOutcome {
            score,
            tags,
            reason,
        } = score_text(&title, &summary);

        Self {
            id: fingerprint(source, &entry.link),
            source: source.to_string(),
            title,
            url: entry.link.clone(),
            published: entry.published.clone(),
            summary,
            score,
            reason,
            tags,
            fetched_at,
        }
    }

    pub fn tags_joined(&self) -> String {
        self.tags.join(",")
    }

    pub fn fetched_at_text(&self) -> String {
        self.fetched_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn should_notify(&self) -> bool {
        self.score >= NOTIFY_MIN_SCORE
    }
}

/// Stable identity for a feed entry: hex SHA-256 of `source` immediately followed by `link`.
pub fn fingerprint(source: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(link.as_bytes());
    hex::encode(hasher.finalize())
}

/// Score `title + " " + summary` against [`KEYWORD_WEIGHTS`].
///
/// Matching is a plain lower-cased substring test, so "earnest" counts as "earn".
pub fn score_text(title: &str, summary: &str) -> ScoreOutcome {
    let text = format!("{title} {summary}").to_lowercase();
    let mut outcome = ScoreOutcome::default();
    let mut reasons = Vec::new();

    for (keyword, weight) in KEYWORD_WEIGHTS {
        if text.contains(keyword) {
            outcome.score += weight;
            outcome.tags.push((*keyword).to_string());
            reasons.push(format!("{keyword}+{weight}"));
        }
    }

    outcome.reason = reasons.join(";");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_text_scores_zero() {
        assert_eq!(score_text("", ""), ScoreOutcome::default());
    }

    #[test]
    fn keywords_follow_table_order() {
        let outcome = score_text("Airdrop announcement", "join the testnet quest");
        assert_eq!(outcome.score, 12);
        assert_eq!(outcome.tags, vec!["airdrop", "testnet", "quest"]);
        assert_eq!(outcome.reason, "airdrop+5;testnet+4;quest+3");

        let reordered = score_text("quest", "TESTNET then AIRDROP");
        assert_eq!(reordered.tags, vec!["airdrop", "testnet", "quest"]);
    }

    #[test]
    fn substring_matching_is_not_word_bounded() {
        let outcome = score_text("An earnest campaigner", "");
        assert_eq!(outcome.tags, vec!["campaign", "earn"]);
        assert_eq!(outcome.score, 3);
        assert_eq!(outcome.reason, "campaign+2;earn+1");
    }

    #[test]
    fn keyword_split_across_title_and_summary_does_not_match() {
        let outcome = score_text("air", "drop");
        assert_eq!(outcome.score, 0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let a = score_text("Bounty and grant", "retrodrop reward");
        let b = score_text("Bounty and grant", "retrodrop reward");
        assert_eq!(a, b);
        assert_eq!(a.score, 2 + 4 + 2 + 5);
    }

    #[test]
    fn fingerprint_matches_sha256_of_concatenation() {
        assert_eq!(
            fingerprint("https://feeds.example/rss", "https://example.com/post/1"),
            "e228b7d216362f201badcb06fbcede4c49dfa1d05c8f577f1bfc3aea40dd15db"
        );
        assert_eq!(
            fingerprint("", ""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn fingerprint_is_stable_and_pair_sensitive() {
        let a = fingerprint("https://a.example/feed", "https://a.example/1");
        assert_eq!(a, fingerprint("https://a.example/feed", "https://a.example/1"));
        assert_ne!(a, fingerprint("https://a.example/feed", "https://a.example/2"));
        assert_ne!(a, fingerprint("https://b.example/feed", "https://a.example/1"));
    }

    #[test]
    fn opportunity_from_entry_trims_and_scores() {
        let fetched_at = Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap();
        let entry = FeedEntry {
            title: "  Season 2 Quest is live ".into(),
            link: "https://example.com/quest".into(),
            published: "Tue, 24 Feb 2026 10:00:00 +0000".into(),
            summary: "\nEarn a reward\n".into(),
        };

        let opp = Opportunity::from_entry("https://example.com/feed", &entry, fetched_at);
        assert_eq!(opp.title, "Season 2 Quest is live");
        assert_eq!(opp.summary, "Earn a reward");
        assert_eq!(opp.tags_joined(), "quest,reward,earn");
        assert_eq!(opp.score, 6);
        assert_eq!(opp.id, fingerprint("https://example.com/feed", "https://example.com/quest"));
        assert_eq!(opp.fetched_at_text(), "2026-02-24T12:00:00.000000Z");
        assert!(opp.should_notify());
    }

    #[test]
    fn notify_threshold_is_inclusive_at_three() {
        let fetched_at = Utc::now();
        let grant = Opportunity::from_entry(
            "s",
            &FeedEntry {
                title: "grant".into(),
                ..Default::default()
            },
            fetched_at,
        );
        let quest = Opportunity::from_entry(
            "s",
            &FeedEntry {
                title: "quest".into(),
                ..Default::default()
            },
            fetched_at,
        );
        assert_eq!(grant.score, 2);
        assert!(!grant.should_notify());
        assert_eq!(quest.score, 3);
        assert!(quest.should_notify());
    }
}
