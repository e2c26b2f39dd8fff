//! Track settings loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is valid:
//!
//! ```toml
//! source_mode = "buffer"
//! autoplay = false
//! volume = 1.0
//! pan = 0.0
//!
//! [fetch]
//! timeout_ms = 30000
//! user_agent = "audio-track"
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackSettings {
    /// `buffer`, `element` or `stream`; validated when a track is built.
    pub source_mode: String,
    /// Start playback as soon as loading completes.
    pub autoplay: bool,
    /// Initial linear gain.
    pub volume: f32,
    /// Initial pan position, `-1.0` to `1.0`.
    pub pan: f32,
    pub fetch: FetchSettings,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            source_mode: "buffer".to_string(),
            autoplay: false,
            volume: 1.0,
            pan: 0.0,
            fetch: FetchSettings::default(),
        }
    }
}

/// HTTP fetch tuning for remote buffer-mode sources.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchSettings {
    /// Whole-request timeout in milliseconds; 0 disables the timeout.
    pub timeout_ms: u64,
    /// Optional `User-Agent` header.
    pub user_agent: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: None,
        }
    }
}

impl FetchSettings {
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if self.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(self.timeout_ms));
        }
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        builder.build().context("build http client")
    }
}

impl TrackSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<TrackSettings>(raw)?)
    }
}
