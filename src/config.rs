use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Config file the client reads when `--config-file` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "relaychat.json";

/// Interface the server binds both endpoints on.
pub const BIND_INTERFACE: &str = "0.0.0.0";

/// Endpoint addresses for the relay. The chat endpoint carries the
/// synchronous request/ack exchange, the feed endpoint the broadcast
/// fan-out; the two are always independent ports.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub chat_port: u16,
    pub feed_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            chat_port: 4240,
            feed_port: 4241,
        }
    }
}

impl Config {
    /// Loads the client configuration. An explicitly given path must exist
    /// and parse; without one, `relaychat.json` is used if present and the
    /// built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path)
                .with_context(|| format!("failed to load config from {}", path.display())),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::read(default_path).with_context(|| {
                        format!("failed to load config from {DEFAULT_CONFIG_PATH}")
                    })
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn chat_addr(&self) -> String {
        format!("{}:{}", self.host, self.chat_port)
    }

    pub fn feed_addr(&self) -> String {
        format!("{}:{}", self.host, self.feed_port)
    }
}
