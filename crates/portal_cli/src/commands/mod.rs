//! CLI command definitions.
//!
//! This module defines the command structure for the portal assistant CLI.
//! The `chat` command is a terminal presentation shell for one session.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use portal_assistant::AssistantConfig;

pub mod actions;
pub mod chat;

/// Campus portal assistant - terminal chat shell
#[derive(Parser)]
#[command(name = "portal-assistant")]
#[command(version, about = "Campus portal assistant - terminal chat shell")]
#[command(long_about = r#"
Terminal front end for the campus portal assistant. Connects to the live
assistant endpoint, keeps per-user conversation history, and offers the
role-specific quick actions of the portal chat widget.

COMMANDS:
  chat     → Start an interactive assistant session
  actions  → List the quick actions for a role

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Configuration error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "PORTAL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive assistant session
    Chat(chat::ChatArgs),

    /// List the quick actions offered to a role
    Actions(actions::ActionsArgs),
}

/// Settings that override the configuration file
#[derive(Args, Debug, Default)]
pub struct ConfigOverrides {
    /// Live assistant endpoint (ws:// or wss://)
    #[arg(long, env = "PORTAL_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Delay before assistant replies are shown
    #[arg(long, env = "PORTAL_REPLY_DELAY_MS")]
    pub reply_delay_ms: Option<u64>,

    /// Persist conversations under this directory
    #[arg(long, env = "PORTAL_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Defaults, then the config file if given, then these overrides.
    pub fn resolve(&self, config_file: Option<&Path>) -> Result<AssistantConfig> {
        let mut config = match config_file {
            Some(path) => AssistantConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => AssistantConfig::default(),
        };

        if let Some(endpoint) = &self.endpoint {
            config = config.endpoint(endpoint.clone());
        }
        if let Some(ms) = self.reply_delay_ms {
            config = config.reply_delay_ms(ms);
        }
        if let Some(dir) = &self.storage_dir {
            config = config.storage_dir(dir.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_defaults() {
        let config = ConfigOverrides::default().resolve(None).unwrap();
        assert_eq!(config, AssistantConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("assistant.toml");
        fs::write(&path, "endpoint = \"ws://file:1/chat\"\nreply_delay_ms = 10\n").unwrap();

        let overrides = ConfigOverrides {
            reply_delay_ms: Some(250),
            ..Default::default()
        };
        let config = overrides.resolve(Some(&path)).unwrap();

        assert_eq!(config.endpoint, "ws://file:1/chat");
        assert_eq!(config.reply_delay_ms, 250);
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let overrides = ConfigOverrides {
            endpoint: Some("http://nope".to_string()),
            ..Default::default()
        };
        assert!(overrides.resolve(None).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempdir().unwrap();
        let err = ConfigOverrides::default()
            .resolve(Some(&dir.path().join("absent.toml")))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_cli_parses_chat() {
        let cli = Cli::try_parse_from([
            "portal-assistant",
            "chat",
            "--role",
            "parent",
            "--user-id",
            "p-1",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Chat(_)));
    }
}
