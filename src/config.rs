//! Configuration loaded from environment variables.
//!
//! Settings are read once at startup (with `.env` support) and memoized for
//! the life of the process. Missing required variables abort startup before
//! any network activity.

use std::fmt;
use std::sync::OnceLock;

const DEFAULT_WEBHOOK_URL: &str = "https://tbot.weeel.de/webhook/twitch/message";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: &str = "8765";
const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Immutable application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// OAuth token for Twitch IRC, as provided (may carry an `oauth:` prefix).
    pub twitch_token: String,

    /// The Twitch channel to join (without the # prefix).
    pub twitch_channel: String,

    /// Bot account nickname used for IRC login and echo detection.
    pub twitch_bot_nick: String,

    /// Webhook URL that receives every inbound chat message.
    pub n8n_webhook_url: String,

    /// Shared secret for the control API and outbound webhook calls.
    pub handler_api_key: String,

    /// Bind host for the control API server.
    pub handler_host: String,

    /// Bind port for the control API server.
    pub handler_port: u16,

    /// Log filter passed to env_logger (e.g. "INFO", "debug").
    pub log_level: String,

    #[allow(dead_code)] // Reserved for future EventSub support
    pub twitch_eventsub_secret: String,
}

/// Errors raised while reading settings from the environment.
#[derive(Debug)]
pub enum ConfigError {
    /// A required environment variable is absent or empty.
    Missing(&'static str),

    /// An environment variable is present but cannot be parsed.
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(name) => {
                write!(f, "required environment variable {} is not set", name)
            }
            ConfigError::Invalid(name, reason) => {
                write!(f, "environment variable {} is invalid: {}", name, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Settings {
    /// Loads settings from the environment, reading a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let handler_port = optional("HANDLER_PORT", DEFAULT_PORT)
            .parse::<u16>()
            .map_err(|e| ConfigError::Invalid("HANDLER_PORT", e.to_string()))?;

        Ok(Settings {
            twitch_token: require("TWITCH_TOKEN")?,
            twitch_channel: require("TWITCH_CHANNEL")?,
            twitch_bot_nick: require("TWITCH_BOT_NICK")?,
            n8n_webhook_url: optional("N8N_WEBHOOK_URL", DEFAULT_WEBHOOK_URL),
            handler_api_key: require("HANDLER_API_KEY")?,
            handler_host: optional("HANDLER_HOST", DEFAULT_HOST),
            handler_port,
            log_level: optional("LOG_LEVEL", DEFAULT_LOG_LEVEL),
            twitch_eventsub_secret: optional("TWITCH_EVENTSUB_SECRET", ""),
        })
    }

    /// The token without the `oauth:` prefix, for the IRC authentication step.
    /// The raw form stays available in `twitch_token` for consumers that
    /// expect the prefix.
    pub fn token_clean(&self) -> &str {
        self.twitch_token
            .strip_prefix("oauth:")
            .unwrap_or(&self.twitch_token)
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Memoized settings instance. The first call constructs from the
/// environment; a configuration error at that point is fatal.
pub fn get_settings() -> &'static Settings {
    SETTINGS.get_or_init(|| match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(1);
        }
    })
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        twitch_token: "oauth:abc123".to_string(),
        twitch_channel: "somechannel".to_string(),
        twitch_bot_nick: "relaybot".to_string(),
        n8n_webhook_url: "http://127.0.0.1:1/webhook".to_string(),
        handler_api_key: "secret-key".to_string(),
        handler_host: "127.0.0.1".to_string(),
        handler_port: 8765,
        log_level: "INFO".to_string(),
        twitch_eventsub_secret: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            "TWITCH_TOKEN",
            "TWITCH_CHANNEL",
            "TWITCH_BOT_NICK",
            "N8N_WEBHOOK_URL",
            "HANDLER_API_KEY",
            "HANDLER_HOST",
            "HANDLER_PORT",
            "LOG_LEVEL",
            "TWITCH_EVENTSUB_SECRET",
        ] {
            std::env::remove_var(name);
        }
    }

    fn set_required() {
        std::env::set_var("TWITCH_TOKEN", "oauth:abc123");
        std::env::set_var("TWITCH_CHANNEL", "somechannel");
        std::env::set_var("TWITCH_BOT_NICK", "relaybot");
        std::env::set_var("HANDLER_API_KEY", "secret-key");
    }

    #[test]
    fn test_token_clean_strips_prefix() {
        let mut settings = test_settings();
        settings.twitch_token = "oauth:abc123".to_string();
        assert_eq!(settings.token_clean(), "abc123");
        // The raw form is preserved
        assert_eq!(settings.twitch_token, "oauth:abc123");
    }

    #[test]
    fn test_token_clean_without_prefix() {
        let mut settings = test_settings();
        settings.twitch_token = "abc123".to_string();
        assert_eq!(settings.token_clean(), "abc123");
    }

    #[test]
    #[serial]
    fn test_from_env_missing_required() {
        clear_env();
        std::env::set_var("TWITCH_TOKEN", "oauth:abc123");

        let err = Settings::from_env().unwrap_err();
        assert!(err.to_string().contains("TWITCH_CHANNEL"));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        set_required();

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.handler_host, "0.0.0.0");
        assert_eq!(settings.handler_port, 8765);
        assert_eq!(settings.log_level, "INFO");
        assert_eq!(settings.n8n_webhook_url, DEFAULT_WEBHOOK_URL);
        assert!(settings.twitch_eventsub_secret.is_empty());
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port() {
        clear_env();
        set_required();
        std::env::set_var("HANDLER_PORT", "not-a-port");

        let err = Settings::from_env().unwrap_err();
        assert!(err.to_string().contains("HANDLER_PORT"));
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        set_required();
        std::env::set_var("HANDLER_PORT", "9000");
        std::env::set_var("LOG_LEVEL", "debug");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.handler_port, 9000);
        assert_eq!(settings.log_level, "debug");
    }
}
