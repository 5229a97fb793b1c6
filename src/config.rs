use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const BOT_TOKEN_ENV: &str = "SLACK_BOT_TOKEN";
pub const ALLOWED_CHANNELS_ENV: &str = "SLACK_ALLOWED_CHANNELS";

// Default configuration constants
const DEFAULT_API_BASE_URL: &str = "https://slack.com/api";
const DEFAULT_CHANNEL_TYPES: &str = "public_channel,private_channel";
const DEFAULT_EXCLUDE_ARCHIVED: bool = true;
const DEFAULT_PAGE_SIZE: u32 = 200;
const DEFAULT_MAX_PAGES: usize = 50;
const DEFAULT_MESSAGE_LIMIT: u32 = 100;
const DEFAULT_THREAD_LIMIT: u32 = 20;
const DEFAULT_SEARCH_LIMIT: u32 = 20;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
const DEFAULT_MAX_DELAY_MS: u64 = 60000;
const DEFAULT_EXPONENTIAL_BASE: f64 = 2.0;
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_MAX_IDLE_PER_HOST: i32 = 10;
const DEFAULT_POOL_IDLE_TIMEOUT_SECONDS: u64 = 90;
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 50;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub slack: SlackConfig,
    pub pagination: PaginationConfig,
    pub retry: RetryConfig,
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlackConfig {
    pub bot_token: Option<String>,
    /// Raw comma-separated allowlist, parsed by [`parse_allowed_channels`]
    pub allowed_channels: Option<String>,
    pub api_base_url: String,
    pub channel_types: String,
    pub exclude_archived: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaginationConfig {
    pub page_size: u32,
    pub max_pages: usize,
    pub message_limit: u32,
    pub thread_limit: u32,
    pub search_limit: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub timeout_seconds: u64,
    pub max_idle_per_host: i32,
    pub pool_idle_timeout_seconds: u64,
    pub requests_per_minute: u32,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_channels: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            channel_types: DEFAULT_CHANNEL_TYPES.to_string(),
            exclude_archived: DEFAULT_EXCLUDE_ARCHIVED,
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            message_limit: DEFAULT_MESSAGE_LIMIT,
            thread_limit: DEFAULT_THREAD_LIMIT,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            exponential_base: DEFAULT_EXPONENTIAL_BASE,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
            pool_idle_timeout_seconds: DEFAULT_POOL_IDLE_TIMEOUT_SECONDS,
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
        }
    }
}

impl Config {
    /// Layer defaults, an optional config file and `SLACK_*` environment
    /// variables. A missing bot token is not an error here; the server is
    /// expected to start degraded and report it per call.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut settings = config::Config::builder();

        // Default values
        settings = settings
            .set_default("slack.api_base_url", DEFAULT_API_BASE_URL)?
            .set_default("slack.channel_types", DEFAULT_CHANNEL_TYPES)?
            .set_default("slack.exclude_archived", DEFAULT_EXCLUDE_ARCHIVED)?
            .set_default("pagination.page_size", DEFAULT_PAGE_SIZE)?
            .set_default("pagination.max_pages", DEFAULT_MAX_PAGES as u64)?
            .set_default("pagination.message_limit", DEFAULT_MESSAGE_LIMIT)?
            .set_default("pagination.thread_limit", DEFAULT_THREAD_LIMIT)?
            .set_default("pagination.search_limit", DEFAULT_SEARCH_LIMIT)?
            .set_default("retry.max_attempts", DEFAULT_MAX_ATTEMPTS)?
            .set_default("retry.initial_delay_ms", DEFAULT_INITIAL_DELAY_MS)?
            .set_default("retry.max_delay_ms", DEFAULT_MAX_DELAY_MS)?
            .set_default("retry.exponential_base", DEFAULT_EXPONENTIAL_BASE)?
            .set_default("connection.timeout_seconds", DEFAULT_TIMEOUT_SECONDS)?
            .set_default("connection.max_idle_per_host", DEFAULT_MAX_IDLE_PER_HOST)?
            .set_default(
                "connection.pool_idle_timeout_seconds",
                DEFAULT_POOL_IDLE_TIMEOUT_SECONDS,
            )?
            .set_default(
                "connection.requests_per_minute",
                DEFAULT_REQUESTS_PER_MINUTE,
            )?;

        // Load from config file if provided
        if let Some(path) = config_path
            && Path::new(path).exists()
        {
            settings = settings.add_source(config::File::with_name(path));
        }

        // Override with environment variables, e.g. SLACK_PAGINATION__MAX_PAGES
        settings = settings.add_source(
            config::Environment::with_prefix("SLACK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // Credentials come from their well-known variables
        if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
            settings = settings.set_override("slack.bot_token", Some(token))?;
        }

        if let Ok(allowed) = std::env::var(ALLOWED_CHANNELS_ENV) {
            settings = settings.set_override("slack.allowed_channels", Some(allowed))?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }
}

/// Bot token plus the optional posting allowlist.
#[derive(Clone)]
pub struct Credentials {
    token: String,
    allowed_channels: Option<HashSet<String>>,
}

impl Credentials {
    /// Rejects empty or whitespace-only tokens.
    pub fn new(
        token: impl Into<String>,
        allowed_channels: Option<HashSet<String>>,
    ) -> Result<Self, ConfigError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(ConfigError::MissingToken);
        }

        Ok(Self {
            token,
            allowed_channels,
        })
    }

    /// Read `SLACK_BOT_TOKEN` and `SLACK_ALLOWED_CHANNELS` from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var(BOT_TOKEN_ENV).unwrap_or_default();
        let allowed = std::env::var(ALLOWED_CHANNELS_ENV).unwrap_or_default();
        Self::new(token, parse_allowed_channels(&allowed))
    }

    pub fn from_config(slack: &SlackConfig) -> Result<Self, ConfigError> {
        let token = slack.bot_token.clone().unwrap_or_default();
        let allowed = slack
            .allowed_channels
            .as_deref()
            .and_then(parse_allowed_channels);
        Self::new(token, allowed)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn allowed_channels(&self) -> Option<&HashSet<String>> {
        self.allowed_channels.as_ref()
    }
}

// Keep the token out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("allowed_channels", &self.allowed_channels)
            .finish()
    }
}

/// Split a comma-separated allowlist. An empty result means "unrestricted"
/// and is returned as `None`, never as an empty set.
pub fn parse_allowed_channels(raw: &str) -> Option<HashSet<String>> {
    let allowed: HashSet<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    if allowed.is_empty() {
        None
    } else {
        Some(allowed)
    }
}
