use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::{AppError, AppResult};

/// Runtime limits and sweep cadences for the messaging core.
///
/// Every field has a default; `from_env` overrides from the environment so a
/// host process can tune the core without code changes.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Hard cap on group participant count (creator included).
    pub max_group_size: usize,
    /// Retention window applied to conversations that do not set their own.
    pub default_retention_days: u32,
    pub max_message_length: usize,
    pub max_file_size_bytes: u64,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Lifetime of a typing entry after the last typing signal.
    pub typing_ttl: Duration,
    /// Heartbeat silence after which a presence record is flipped offline.
    pub presence_timeout: Duration,
    pub retention_sweep_interval: Duration,
    pub ephemeral_sweep_interval: Duration,
    /// Per-sender send quota; `None` disables rate limiting.
    pub send_rate_per_minute: Option<u32>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_group_size: 100,
            default_retention_days: 30,
            max_message_length: 4000,
            max_file_size_bytes: 100 * 1024 * 1024,
            default_page_size: 50,
            max_page_size: 200,
            typing_ttl: Duration::from_secs(5),
            presence_timeout: Duration::from_secs(30 * 60),
            retention_sweep_interval: Duration::from_secs(24 * 60 * 60),
            ephemeral_sweep_interval: Duration::from_secs(5),
            send_rate_per_minute: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> AppResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}

impl CoreConfig {
    pub fn from_env() -> AppResult<Self> {
        dotenv().ok();
        let mut config = Self::default();

        if let Some(v) = parse_var::<usize>("MESSAGING_MAX_GROUP_SIZE")? {
            config.max_group_size = v;
        }
        if let Some(v) = parse_var::<u32>("MESSAGING_DEFAULT_RETENTION_DAYS")? {
            config.default_retention_days = v;
        }
        if let Some(v) = parse_var::<usize>("MESSAGING_MAX_MESSAGE_LENGTH")? {
            config.max_message_length = v;
        }
        if let Some(v) = parse_var::<u64>("MESSAGING_MAX_FILE_SIZE_BYTES")? {
            config.max_file_size_bytes = v;
        }
        if let Some(v) = parse_var::<usize>("MESSAGING_DEFAULT_PAGE_SIZE")? {
            config.default_page_size = v;
        }
        if let Some(v) = parse_var::<usize>("MESSAGING_MAX_PAGE_SIZE")? {
            config.max_page_size = v;
        }
        if let Some(v) = parse_var::<u64>("MESSAGING_TYPING_TTL_MS")? {
            config.typing_ttl = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64>("MESSAGING_PRESENCE_TIMEOUT_SECS")? {
            config.presence_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>("MESSAGING_RETENTION_SWEEP_INTERVAL_SECS")? {
            config.retention_sweep_interval = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>("MESSAGING_EPHEMERAL_SWEEP_INTERVAL_MS")? {
            config.ephemeral_sweep_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u32>("MESSAGING_SEND_RATE_PER_MINUTE")? {
            config.send_rate_per_minute = (v > 0).then_some(v);
        }

        if config.max_page_size == 0 || config.default_page_size == 0 {
            return Err(AppError::Config("page sizes must be non-zero".into()));
        }

        Ok(config)
    }

    /// Short timeouts and sweep cadences so expiry behavior is observable in
    /// tests without multi-second sleeps.
    pub fn test_defaults() -> Self {
        Self {
            typing_ttl: Duration::from_millis(250),
            presence_timeout: Duration::from_millis(400),
            retention_sweep_interval: Duration::from_millis(500),
            ephemeral_sweep_interval: Duration::from_millis(50),
            ..Self::default()
        }
    }
}
