//! Voice client configuration.
//!
//! Configuration is always passed explicitly into constructors; the core never
//! reads the environment on its own. [`VoiceConfig::from_env`] exists for
//! binaries and demos that want the conventional variable names.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default wait for an authoritative state naming us after a join intent.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default base delay for exponential reconnect backoff.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default cap on the reconnect backoff delay.
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Default maximum automatic reconnect attempts per cycle.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Default actor mailbox buffer size.
pub const DEFAULT_MAILBOX_BUFFER: usize = 64;

/// Voice client configuration.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Whether voice features are enabled at all. When false, the channel is
    /// constructed as a well-defined no-op.
    pub enabled: bool,

    /// The voice channel this client participates in.
    pub channel_id: String,

    /// Authenticated local identity. `None` means joining is impossible and
    /// produces a non-retryable invalid-identity error.
    pub identity: Option<String>,

    /// Display name to fall back on for the local participant.
    pub display_name: Option<String>,

    /// Bounded wait for join confirmation (default: 10s).
    pub join_timeout: Duration,

    /// Base delay for exponential reconnect backoff (default: 500ms).
    pub reconnect_base_delay: Duration,

    /// Cap on the backoff delay (default: 8s).
    pub reconnect_max_delay: Duration,

    /// Maximum automatic reconnect attempts per cycle (default: 3).
    pub max_reconnect_attempts: u32,

    /// Actor mailbox buffer size (default: 64).
    pub mailbox_buffer: usize,
}

impl VoiceConfig {
    /// Create an enabled configuration with defaults for the given channel
    /// and identity.
    #[must_use]
    pub fn new(channel_id: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            enabled: true,
            channel_id: channel_id.into(),
            identity: Some(identity.into()),
            display_name: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            mailbox_buffer: DEFAULT_MAILBOX_BUFFER,
        }
    }

    /// Configuration for a client with voice features switched off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            channel_id: String::new(),
            identity: None,
            display_name: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            mailbox_buffer: DEFAULT_MAILBOX_BUFFER,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required: `WAVEROOM_VOICE_CHANNEL_ID`, `WAVEROOM_VOICE_IDENTITY`.
    /// Optional: `WAVEROOM_VOICE_ENABLED` (default "true"),
    /// `WAVEROOM_VOICE_DISPLAY_NAME`,
    /// `WAVEROOM_VOICE_JOIN_TIMEOUT_SECONDS`,
    /// `WAVEROOM_VOICE_RECONNECT_BASE_DELAY_MS`,
    /// `WAVEROOM_VOICE_RECONNECT_MAX_DELAY_MS`,
    /// `WAVEROOM_VOICE_MAX_RECONNECT_ATTEMPTS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let enabled = match env::var("WAVEROOM_VOICE_ENABLED") {
            Ok(value) => parse_bool("WAVEROOM_VOICE_ENABLED", &value)?,
            Err(_) => true,
        };
        if !enabled {
            return Ok(Self::disabled());
        }

        let channel_id = env::var("WAVEROOM_VOICE_CHANNEL_ID")
            .map_err(|_| ConfigError::MissingVar("WAVEROOM_VOICE_CHANNEL_ID".to_string()))?;
        let identity = env::var("WAVEROOM_VOICE_IDENTITY")
            .map_err(|_| ConfigError::MissingVar("WAVEROOM_VOICE_IDENTITY".to_string()))?;

        let mut config = Self::new(channel_id, identity);
        config.display_name = env::var("WAVEROOM_VOICE_DISPLAY_NAME").ok();

        if let Ok(value) = env::var("WAVEROOM_VOICE_JOIN_TIMEOUT_SECONDS") {
            config.join_timeout =
                Duration::from_secs(parse_u64("WAVEROOM_VOICE_JOIN_TIMEOUT_SECONDS", &value)?);
        }
        if let Ok(value) = env::var("WAVEROOM_VOICE_RECONNECT_BASE_DELAY_MS") {
            config.reconnect_base_delay =
                Duration::from_millis(parse_u64("WAVEROOM_VOICE_RECONNECT_BASE_DELAY_MS", &value)?);
        }
        if let Ok(value) = env::var("WAVEROOM_VOICE_RECONNECT_MAX_DELAY_MS") {
            config.reconnect_max_delay =
                Duration::from_millis(parse_u64("WAVEROOM_VOICE_RECONNECT_MAX_DELAY_MS", &value)?);
        }
        if let Ok(value) = env::var("WAVEROOM_VOICE_MAX_RECONNECT_ATTEMPTS") {
            let parsed = parse_u64("WAVEROOM_VOICE_MAX_RECONNECT_ATTEMPTS", &value)?;
            config.max_reconnect_attempts = u32::try_from(parsed).map_err(|_| {
                ConfigError::InvalidValue {
                    var: "WAVEROOM_VOICE_MAX_RECONNECT_ATTEMPTS".to_string(),
                    value,
                }
            })?;
        }

        Ok(config)
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_u64(var: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    /// An environment variable holds an unparseable value.
    #[error("Invalid value for {var}: {value}")]
    InvalidValue {
        /// Variable name.
        var: String,
        /// Offending value.
        value: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VoiceConfig::new("room-1", "alice");
        assert!(config.enabled);
        assert_eq!(config.join_timeout, DEFAULT_JOIN_TIMEOUT);
        assert_eq!(config.reconnect_base_delay, DEFAULT_RECONNECT_BASE_DELAY);
        assert_eq!(config.reconnect_max_delay, DEFAULT_RECONNECT_MAX_DELAY);
        assert_eq!(config.max_reconnect_attempts, DEFAULT_MAX_RECONNECT_ATTEMPTS);
        assert_eq!(config.identity.as_deref(), Some("alice"));
    }

    #[test]
    fn test_disabled_is_well_defined() {
        let config = VoiceConfig::disabled();
        assert!(!config.enabled);
        assert!(config.identity.is_none());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(parse_bool("X", "1").unwrap());
        assert!(!parse_bool("X", "no").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_parse_u64_rejects_garbage() {
        assert_eq!(parse_u64("X", "15").unwrap(), 15);
        assert!(parse_u64("X", "fifteen").is_err());
    }
}
