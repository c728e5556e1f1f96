use anyhow::{Context, Result};
use dotenvy::dotenv;
use session_lane::{SerializerConfig, DEFAULT_MAX_HOLD};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Longest one operation may hold a session key. `None` disables the bound.
    pub max_hold: Option<Duration>,
    /// Interval between SSE keep-alive comments.
    pub keep_alive: Duration,
    /// Prefix for server-generated session keys.
    pub session_key_prefix: String,
    /// Pause between words streamed by the demo engine.
    pub chunk_delay: Duration,
    /// CORS origins. Empty allows any origin.
    pub allowed_origins: Vec<String>,
    /// Longest accepted chat message, in characters.
    pub max_message_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_hold: Some(DEFAULT_MAX_HOLD),
            keep_alive: Duration::from_secs(15),
            session_key_prefix: "session".to_string(),
            chunk_delay: Duration::from_millis(40),
            allowed_origins: Vec::new(),
            max_message_chars: 500,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from any name → value source. Unset names take
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |name: &str, default: String| lookup(name).unwrap_or(default);

        let max_hold_secs: u64 = var("LOCK_MAX_HOLD_SECS", DEFAULT_MAX_HOLD.as_secs().to_string())
            .parse()
            .context("LOCK_MAX_HOLD_SECS must be a whole number of seconds")?;

        Ok(Self {
            host: var("HOST", defaults.host),
            port: var("PORT", defaults.port.to_string())
                .parse()
                .context("PORT must be a valid number")?,
            max_hold: (max_hold_secs > 0).then(|| Duration::from_secs(max_hold_secs)),
            keep_alive: Duration::from_secs(
                var("SSE_KEEP_ALIVE_SECS", defaults.keep_alive.as_secs().to_string())
                    .parse()
                    .context("SSE_KEEP_ALIVE_SECS must be a valid number")?,
            ),
            session_key_prefix: var("SESSION_KEY_PREFIX", defaults.session_key_prefix),
            chunk_delay: Duration::from_millis(
                var("DEMO_CHUNK_DELAY_MS", defaults.chunk_delay.as_millis().to_string())
                    .parse()
                    .context("DEMO_CHUNK_DELAY_MS must be a valid number")?,
            ),
            allowed_origins: parse_origins(&var("ALLOWED_ORIGINS", String::new())),
            max_message_chars: var("MAX_MESSAGE_CHARS", defaults.max_message_chars.to_string())
                .parse()
                .context("MAX_MESSAGE_CHARS must be a valid number")?,
        })
    }

    /// Socket address string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn serializer_config(&self) -> SerializerConfig {
        SerializerConfig {
            max_hold: self.max_hold,
        }
    }
}

/// Comma-separated origins, blanks dropped.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
