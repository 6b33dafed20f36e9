//! On-disk configuration for the demo bot.
//!
//! Lives at `~/.config/tmibot/bot.toml`. Every field is optional; command-line
//! flags and `TWITCH_*` environment variables take precedence.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Contents of `bot.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Gateway address (host:port).
    pub server: Option<String>,
    pub tls: Option<bool>,
    pub username: Option<String>,
    pub oauth_token: Option<String>,
    pub channels: Option<Vec<String>>,
    pub command_prefix: Option<String>,
    /// Sent to every channel right after joining.
    pub ready_message: Option<String>,
    /// IRCv3 capabilities to request at login.
    pub capabilities: Option<Vec<String>>,
    /// Seconds between heartbeat log lines.
    pub heartbeat_secs: Option<u64>,
}

pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tmibot")
        .join("bot.toml")
}

impl FileConfig {
    /// Load from `path`. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("can't read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("bad config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
