//! Assistant configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AssistantError, AssistantResult};
use crate::types::Identity;

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/chat";
pub const DEFAULT_REPLY_DELAY_MS: u64 = 1500;

const DEFAULT_WELCOME: &str =
    "Hi {name}! I'm your campus assistant. Ask me anything about your {role} dashboard, or pick a quick action to get started.";
const DEFAULT_OFFLINE_REPLY: &str =
    "I'm having trouble reaching the assistant service right now. Please try again in a moment.";
const DEFAULT_SEND_FAILED: &str =
    "Message could not be sent: the assistant service is not connected.";

/// Settings for one assistant session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssistantConfig {
    /// Live endpoint URL
    pub endpoint: String,
    /// Artificial "thinking" delay before any assistant reply is shown
    pub reply_delay_ms: u64,
    /// Welcome text; `{name}` and `{role}` are substituted
    pub welcome_template: String,
    /// Reply body used when no inbound payload has been received yet
    pub offline_reply: String,
    /// Transcript notice inserted when a message could not be sent
    pub send_failed_notice: String,
    /// Directory for file-backed conversation storage
    pub storage_dir: Option<PathBuf>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reply_delay_ms: DEFAULT_REPLY_DELAY_MS,
            welcome_template: DEFAULT_WELCOME.to_string(),
            offline_reply: DEFAULT_OFFLINE_REPLY.to_string(),
            send_failed_notice: DEFAULT_SEND_FAILED.to_string(),
            storage_dir: None,
        }
    }
}

impl AssistantConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> AssistantResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> AssistantResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn reply_delay_ms(mut self, ms: u64) -> Self {
        self.reply_delay_ms = ms;
        self
    }

    pub fn welcome_template(mut self, template: impl Into<String>) -> Self {
        self.welcome_template = template.into();
        self
    }

    pub fn offline_reply(mut self, text: impl Into<String>) -> Self {
        self.offline_reply = text.into();
        self
    }

    pub fn send_failed_notice(mut self, text: impl Into<String>) -> Self {
        self.send_failed_notice = text.into();
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }

    /// Render the welcome message for an identity.
    pub fn welcome_for(&self, identity: &Identity) -> String {
        self.welcome_template
            .replace("{name}", &identity.display_name)
            .replace("{role}", identity.role.as_str())
    }

    /// Check that the endpoint is a websocket URL.
    pub fn validate(&self) -> AssistantResult<()> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(AssistantError::Config(format!(
                "endpoint must be a ws:// or wss:// URL, got '{}'",
                self.endpoint
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn test_defaults() {
        let config = AssistantConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.reply_delay(), Duration::from_millis(1500));
        assert!(config.storage_dir.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AssistantConfig::from_toml_str(
            r#"
            endpoint = "wss://portal.example.edu/assistant"
            reply_delay_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint, "wss://portal.example.edu/assistant");
        assert_eq!(config.reply_delay_ms, 250);
        assert_eq!(config.offline_reply, DEFAULT_OFFLINE_REPLY);
    }

    #[test]
    fn test_rejects_non_websocket_endpoint() {
        let result = AssistantConfig::from_toml_str(r#"endpoint = "http://localhost:8080""#);
        assert!(matches!(result, Err(AssistantError::Config(_))));
    }

    #[test]
    fn test_welcome_substitution() {
        let config = AssistantConfig::default().welcome_template("Hello {name} ({role})");
        let identity = Identity::new(Role::Faculty, Some("f-1"), "Dr. Lee");
        assert_eq!(config.welcome_for(&identity), "Hello Dr. Lee (faculty)");
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("assistant.toml");
        std::fs::write(&path, "reply_delay_ms = 10\nstorage_dir = \"/tmp/chats\"\n").unwrap();

        let config = AssistantConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.reply_delay_ms, 10);
        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/chats")));
    }
}
