use serde::{Deserialize, Deserializer};

pub const TG_BOT_TOKEN_ENV: &str = "TG_BOT_TOKEN";
pub const TG_CHAT_ID_ENV: &str = "TG_CHAT_ID";
pub const DISCORD_WEBHOOK_URL_ENV: &str = "DISCORD_WEBHOOK_URL";

/// `notify` section of the config file. Both channels are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub telegram: Option<TelegramConfig>,
    pub discord: Option<DiscordConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramCredentials {
    pub bot_token: String,
    pub chat_id: String,
}

/// Channel credentials after applying environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedChannels {
    pub telegram: Option<TelegramCredentials>,
    pub discord_webhook: Option<String>,
}

impl NotifyConfig {
    /// Resolve credentials for enabled channels; the environment wins over file values.
    ///
    /// An enabled channel whose credentials end up empty resolves to `None`.
    pub fn resolve<F>(&self, env: F) -> ResolvedChannels
    where
        F: Fn(&str) -> Option<String>,
    {
        let telegram = self
            .telegram
            .as_ref()
            .filter(|cfg| cfg.enabled)
            .and_then(|cfg| {
                let bot_token = pick(&env, TG_BOT_TOKEN_ENV, cfg.bot_token.as_ref())?;
                let chat_id = pick(&env, TG_CHAT_ID_ENV, cfg.chat_id.as_ref())?;
                Some(TelegramCredentials { bot_token, chat_id })
            });

        let discord_webhook = self
            .discord
            .as_ref()
            .filter(|cfg| cfg.enabled)
            .and_then(|cfg| pick(&env, DISCORD_WEBHOOK_URL_ENV, cfg.webhook_url.as_ref()));

        ResolvedChannels {
            telegram,
            discord_webhook,
        }
    }

    pub fn telegram_enabled(&self) -> bool {
        self.telegram.as_ref().is_some_and(|cfg| cfg.enabled)
    }

    pub fn discord_enabled(&self) -> bool {
        self.discord.as_ref().is_some_and(|cfg| cfg.enabled)
    }
}

fn pick<F>(env: &F, key: &str, fallback: Option<&String>) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .or_else(|| fallback.cloned())
        .filter(|value| !value.trim().is_empty())
}

// Telegram chat ids are often written as bare numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    }))
}
