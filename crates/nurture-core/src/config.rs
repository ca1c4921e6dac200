//! Configuration management for the outreach engine

use crate::error::{OutreachError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raw configuration structure matching outreach.json exactly
#[derive(Debug, Deserialize)]
struct RawConfig {
    pub security: SecurityConfig,

    #[serde(default)]
    pub providers: ProviderEndpoints,

    #[serde(default)]
    pub google: GoogleOAuthConfig,

    #[serde(default)]
    pub send: SendConfig,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachConfig {
    pub security: SecurityConfig,
    pub providers: ProviderEndpoints,
    pub google: GoogleOAuthConfig,
    pub send: SendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Base64-encoded 256-bit vault key
    #[serde(alias = "key")]
    pub encryption_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    #[serde(default = "default_boldtrail_base_url")]
    pub boldtrail_base_url: String,

    #[serde(default = "default_followupboss_base_url")]
    pub followupboss_base_url: String,

    #[serde(default = "default_gmail_base_url")]
    pub gmail_base_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            boldtrail_base_url: default_boldtrail_base_url(),
            followupboss_base_url: default_followupboss_base_url(),
            gmail_base_url: default_gmail_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleOAuthConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_google_token_uri")]
    pub token_uri: String,
}

impl Default for GoogleOAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_uri: default_google_token_uri(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendConfig {
    /// Per-request timeout for provider calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Additional attempts after the first for transient transport failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff; doubles per retry
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Tokens expiring within this window are treated as already expired
    #[serde(default = "default_token_expiry_buffer_secs")]
    pub token_expiry_buffer_secs: i64,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            token_expiry_buffer_secs: default_token_expiry_buffer_secs(),
        }
    }
}

// Default functions
fn default_boldtrail_base_url() -> String {
    "https://api.boldtrail.com/v1".to_string()
}

fn default_followupboss_base_url() -> String {
    "https://api.followupboss.com/v1".to_string()
}

fn default_gmail_base_url() -> String {
    "https://gmail.googleapis.com/gmail/v1".to_string()
}

fn default_google_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    250
}

fn default_token_expiry_buffer_secs() -> i64 {
    60
}

impl OutreachConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| OutreachError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_json_str(&content)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json)
            .map_err(|e| OutreachError::Config(format!("Failed to parse config: {}", e)))?;

        let config = Self {
            security: raw.security,
            providers: raw.providers,
            google: raw.google,
            send: raw.send,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// A vault key of the wrong length is a fatal startup error, never a
    /// runtime one.
    pub fn validate(&self) -> Result<()> {
        let key = BASE64.decode(&self.security.encryption_key).map_err(|e| {
            OutreachError::Config(format!("encryption key is not valid base64: {}", e))
        })?;

        if key.len() != 32 {
            return Err(OutreachError::Config(format!(
                "encryption key must be exactly 32 bytes (256 bits), got {}",
                key.len()
            )));
        }

        if self.send.request_timeout_secs == 0 {
            return Err(OutreachError::Config(
                "send.request_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="; // 32 zero bytes

    #[test]
    fn test_minimal_config_gets_defaults() {
        let json = format!(r#"{{ "security": {{ "encryption_key": "{}" }} }}"#, TEST_KEY);
        let config = OutreachConfig::from_json_str(&json).expect("Failed to parse config");

        assert_eq!(config.providers.boldtrail_base_url, "https://api.boldtrail.com/v1");
        assert_eq!(
            config.providers.followupboss_base_url,
            "https://api.followupboss.com/v1"
        );
        assert_eq!(config.google.token_uri, "https://oauth2.googleapis.com/token");
        assert_eq!(config.send.request_timeout_secs, 30);
        assert_eq!(config.send.max_retries, 2);
        assert_eq!(config.send.token_expiry_buffer_secs, 60);
    }

    #[test]
    fn test_short_key_is_fatal() {
        let json = r#"{ "security": { "encryption_key": "c2hvcnQ=" } }"#;
        let err = OutreachConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, OutreachError::Config(_)));
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn test_invalid_base64_key_is_fatal() {
        let json = r#"{ "security": { "encryption_key": "not-base64!!!" } }"#;
        let err = OutreachConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, OutreachError::Config(_)));
    }

    #[test]
    fn test_key_alias_accepted() {
        let json = format!(r#"{{ "security": {{ "key": "{}" }} }}"#, TEST_KEY);
        let config = OutreachConfig::from_json_str(&json).expect("alias should parse");
        assert_eq!(config.security.encryption_key, TEST_KEY);
    }
}
