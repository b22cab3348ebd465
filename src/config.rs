use std::str::FromStr;

use anyhow::{bail, Context};

/// Width of `chat_rooms.last_message`.
pub const MAX_PREVIEW_LEN: usize = 255;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub max_connections: u32,
    pub cors_origin: Option<String>,
    pub chat: ChatConfig,
}

/// Limits applied by the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct ChatConfig {
    /// Max characters kept in a room's `last_message`.
    pub preview_len: usize,
    /// Max characters of body carried by a `new_message_notification`.
    pub notify_preview_len: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            preview_len: MAX_PREVIEW_LEN,
            notify_preview_len: 50,
        }
    }
}

impl ChatConfig {
    pub fn validate(self) -> anyhow::Result<Self> {
        if self.preview_len == 0 || self.preview_len > MAX_PREVIEW_LEN {
            let preview_len = self.preview_len;
            bail!("CHAT_PREVIEW_LEN must be between 1 and {MAX_PREVIEW_LEN}, got {preview_len}");
        }
        if self.notify_preview_len == 0 {
            bail!("CHAT_NOTIFY_PREVIEW_LEN must be at least 1");
        }
        Ok(self)
    }
}

impl Config {
    /// Reads the environment, after loading `.env` if there is one.
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv::dotenv().ok();

        let defaults = ChatConfig::default();
        Ok(Config {
            database_url: dotenv::var("DATABASE_URL").context("DATABASE_URL is not set")?,
            bind_addr: dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            jwt_secret: dotenv::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            max_connections: parse_or("DB_MAX_CONNECTIONS", 16)?,
            cors_origin: dotenv::var("CORS_ORIGIN").ok(),
            chat: ChatConfig {
                preview_len: parse_or("CHAT_PREVIEW_LEN", defaults.preview_len)?,
                notify_preview_len: parse_or(
                    "CHAT_NOTIFY_PREVIEW_LEN",
                    defaults.notify_preview_len,
                )?,
            }
            .validate()?,
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("{key}={raw:?} is not valid")),
        Err(_) => Ok(default),
    }
}
