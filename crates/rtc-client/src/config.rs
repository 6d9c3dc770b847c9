//! Configuration types for the RTC client

use crate::media::BitrateLadder;
use crate::signaling::ReconnectionPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for an RTC client session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcClientConfig {
    /// Signaling channel settings
    pub signaling: SignalingConfig,

    /// Media session settings
    pub media: MediaConfig,

    /// Network quality monitor settings
    pub monitor: MonitorConfig,
}

/// Signaling channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// WebSocket URL of the relay's control plane (ws:// or wss://)
    pub url: String,

    /// Upper bound on waiting for the leave acknowledgement (default: 3000ms)
    pub teardown_timeout_ms: u64,

    /// Reconnection backoff after abnormal disconnects
    pub reconnect: ReconnectionPolicy,
}

/// Media session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Simulcast ladder for camera video
    pub video_ladder: BitrateLadder,

    /// Simulcast ladder for screen share
    pub screen_ladder: BitrateLadder,

    /// Starting bitrate hint for video encoders in kbps (default: 1000)
    pub video_start_bitrate_kbps: u32,
}

/// Network quality monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Poll interval in milliseconds (default: 2000)
    pub interval_ms: u64,

    /// User id attributed to upstream samples
    pub local_user_id: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:4443".to_string(),
            teardown_timeout_ms: 3000,
            reconnect: ReconnectionPolicy::default(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            video_ladder: BitrateLadder::camera(),
            screen_ladder: BitrateLadder::screen(),
            video_start_bitrate_kbps: 1000,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            local_user_id: "local".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl RtcClientConfig {
    /// Parse configuration from a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The signaling URL is not a ws:// or wss:// URL
    /// - The teardown timeout or monitor interval is zero
    /// - The reconnection policy is inconsistent
    /// - A bitrate ladder is empty or has a zero-bitrate tier
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.signaling.url).map_err(|e| {
            Error::InvalidConfig(format!("Invalid signaling URL '{}': {}", self.signaling.url, e))
        })?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(Error::InvalidConfig(format!(
                "Signaling URL must use ws:// or wss://, got '{}'",
                self.signaling.url
            )));
        }

        if self.signaling.teardown_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "teardown_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let reconnect = &self.signaling.reconnect;
        if reconnect.backoff_initial_ms == 0 {
            return Err(Error::InvalidConfig(
                "reconnect.backoff_initial_ms must be greater than 0".to_string(),
            ));
        }
        if reconnect.backoff_max_ms < reconnect.backoff_initial_ms {
            return Err(Error::InvalidConfig(format!(
                "reconnect.backoff_max_ms ({}) must be >= backoff_initial_ms ({})",
                reconnect.backoff_max_ms, reconnect.backoff_initial_ms
            )));
        }
        if reconnect.backoff_multiplier < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "reconnect.backoff_multiplier must be >= 1.0, got {}",
                reconnect.backoff_multiplier
            )));
        }

        self.media.video_ladder.validate("video_ladder")?;
        self.media.screen_ladder.validate("screen_ladder")?;

        if self.monitor.interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "monitor.interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.monitor.local_user_id.is_empty() {
            return Err(Error::InvalidConfig(
                "monitor.local_user_id cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
