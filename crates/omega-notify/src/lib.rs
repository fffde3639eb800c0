//! Outbound notification channels for high-scoring opportunities.
//!
//! Each channel is delivered independently; a failing channel is logged and
//! never stops the others or the surrounding batch.

mod config;
mod discord;
mod telegram;

use async_trait::async_trait;
use omega_core::Opportunity;
use thiserror::Error;
use tracing::{debug, warn};

pub use config::{
    DiscordConfig, NotifyConfig, ResolvedChannels, TelegramConfig, TelegramCredentials,
    DISCORD_WEBHOOK_URL_ENV, TG_BOT_TOKEN_ENV, TG_CHAT_ID_ENV,
};
pub use discord::DiscordChannel;
pub use telegram::TelegramChannel;

pub const CRATE_NAME: &str = "omega-notify";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{channel} returned {status}: {body}")]
    Api {
        channel: &'static str,
        status: u16,
        body: String,
    },
}

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Fixed message template shared by every channel.
pub fn format_message(opp: &Opportunity) -> String {
    format!(
        "💡 New Opportunity: {}\n{}\nScore: {} | Tags: {}",
        opp.title,
        opp.url,
        opp.score,
        opp.tags_joined()
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct Notifier {
    channels: Vec<Box<dyn Channel>>,
}

impl Notifier {
    pub fn new(channels: Vec<Box<dyn Channel>>) -> Self {
        Self { channels }
    }

    /// Build channels from config, resolving credentials through `env` first.
    pub fn from_config<F>(client: &reqwest::Client, config: &NotifyConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolved = config.resolve(env);
        let mut channels: Vec<Box<dyn Channel>> = Vec::new();

        match resolved.telegram {
            Some(creds) => channels.push(Box::new(TelegramChannel::new(
                client.clone(),
                creds.bot_token,
                creds.chat_id,
            ))),
            None if config.telegram_enabled() => {
                warn!("telegram enabled but bot token or chat id missing; channel skipped")
            }
            None => {}
        }

        match resolved.discord_webhook {
            Some(url) => channels.push(Box::new(DiscordChannel::new(client.clone(), url))),
            None if config.discord_enabled() => {
                warn!("discord enabled but webhook url missing; channel skipped")
            }
            None => {}
        }

        Self { channels }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub async fn dispatch(&self, opp: &Opportunity) -> DispatchReport {
        let text = format_message(opp);
        let mut report = DispatchReport::default();

        for channel in &self.channels {
            match channel.send(&text).await {
                Ok(()) => {
                    debug!(channel = channel.name(), id = opp.id.as_str(), "notification sent");
                    report.delivered += 1;
                }
                Err(err) => {
                    warn!(channel = channel.name(), id = opp.id.as_str(), error = %err, "notification failed");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use omega_core::FeedEntry;
    use std::sync::{Arc, Mutex};

    struct Recording {
        name: &'static str,
        fail: bool,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Channel for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, text: &str) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Api {
                    channel: self.name,
                    status: 500,
                    body: "boom".into(),
                });
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn opportunity() -> Opportunity {
        Opportunity::from_entry(
            "https://feeds.example/rss",
            &FeedEntry {
                title: "Testnet quest open".into(),
                link: "https://example.com/q".into(),
                ..Default::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn message_uses_fixed_template() {
        assert_eq!(
            format_message(&opportunity()),
            "💡 New Opportunity: Testnet quest open\nhttps://example.com/q\nScore: 7 | Tags: testnet,quest"
        );
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_the_next() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let notifier = Notifier::new(vec![
            Box::new(Recording {
                name: "broken",
                fail: true,
                sent: sent.clone(),
            }),
            Box::new(Recording {
                name: "working",
                fail: false,
                sent: sent.clone(),
            }),
        ]);

        let report = notifier.dispatch(&opportunity()).await;
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn from_config_builds_only_resolvable_channels() {
        let config: NotifyConfig = serde_json::from_str(
            r#"{
                "telegram": {"enabled": true, "bot_token": "t"},
                "discord": {"enabled": true, "webhook_url": "https://discord.example/hook"}
            }"#,
        )
        .expect("config");
        let notifier = Notifier::from_config(&reqwest::Client::new(), &config, |_| None);
        assert_eq!(notifier.channel_names(), vec!["discord"]);

        let notifier = Notifier::from_config(&reqwest::Client::new(), &config, |key| {
            (key == TG_CHAT_ID_ENV).then(|| "99".to_string())
        });
        assert_eq!(notifier.channel_names(), vec!["telegram", "discord"]);
    }
}
