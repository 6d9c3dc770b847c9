//! RTC client test harness
//!
//! Wires a real [`SignalingChannel`] and [`MediaSession`] to in-process fakes:
//! - `MockRelay`: in-memory relay behind the `SignalingConnector` seam
//! - `FakeEngine` / `FakeTransport`: local media stack
//! - `FakeTrackSource`: capture
//! - `CollectingSink`: quality sample batches
//!
//! Basic usage pattern:
//!
//! 1. `RtcTestHarness::new()` (or `with_config`)
//! 2. `harness.join().await` to connect, join and initialize media
//! 3. Drive the relay (`harness.relay`) and assert on the session

#![allow(dead_code)]

pub mod engine;
pub mod relay;
pub mod sink;

use async_trait::async_trait;
use huddle_rtc_client::auth::{AuthRefresher, Credentials, RefreshedToken};
use huddle_rtc_client::error::ConnectionError;
use huddle_rtc_client::signaling::JoinRoomResponse;
use huddle_rtc_client::{MediaSession, Result, RtcClientConfig, SignalingChannel};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub use engine::{local_track, FakeEngine, FakeTrackSource, FakeTransport};
pub use relay::{MockRelay, Reply};
pub use sink::CollectingSink;

/// Result type for test harness operations
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

/// Error type for test harness operations
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Client error: {0}")]
    ClientError(#[from] huddle_rtc_client::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Refresher that hands out scripted tokens
#[derive(Default)]
pub struct ScriptedRefresher {
    calls: Mutex<Vec<String>>,
    fail: Mutex<bool>,
}

impl ScriptedRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later refresh fail
    pub fn fail_refreshes(&self) {
        *self.fail.lock() = true;
    }

    /// Refresh tokens presented so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AuthRefresher for ScriptedRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken> {
        let attempt = {
            let mut calls = self.calls.lock();
            calls.push(refresh_token.to_string());
            calls.len()
        };
        if *self.fail.lock() {
            return Err(ConnectionError::Auth("refresh token revoked".to_string()).into());
        }
        Ok(RefreshedToken {
            access_token: format!("refreshed-{}", attempt),
            refresh_token: None,
        })
    }
}

/// Configuration with short timers for tests
pub fn fast_config() -> RtcClientConfig {
    let mut config = RtcClientConfig::default();
    config.signaling.teardown_timeout_ms = 200;
    config.signaling.reconnect.max_retries = 3;
    config.signaling.reconnect.backoff_initial_ms = 10;
    config.signaling.reconnect.backoff_max_ms = 40;
    config.signaling.reconnect.jitter_enabled = false;
    config.monitor.interval_ms = 20;
    config.monitor.local_user_id = "me".to_string();
    config
}

/// Channel + session over in-process fakes
pub struct RtcTestHarness {
    pub config: RtcClientConfig,
    pub relay: MockRelay,
    pub refresher: Arc<ScriptedRefresher>,
    pub engine: Arc<FakeEngine>,
    pub tracks: Arc<FakeTrackSource>,
    pub channel: SignalingChannel,
    pub session: MediaSession,
}

impl RtcTestHarness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: RtcClientConfig) -> Self {
        let relay = MockRelay::new();
        let refresher = Arc::new(ScriptedRefresher::new());
        let engine = Arc::new(FakeEngine::new());
        let tracks = Arc::new(FakeTrackSource::new());

        let channel = SignalingChannel::new(
            &config.signaling,
            Arc::new(relay.clone()),
            refresher.clone(),
        );
        let session = MediaSession::new(
            channel.clone(),
            engine.clone(),
            tracks.clone(),
            config.media.clone(),
        );

        Self {
            config,
            relay,
            refresher,
            engine,
            tracks,
            channel,
            session,
        }
    }

    pub fn credentials() -> Credentials {
        Credentials::new("token-1").with_refresh_token("refresh-1")
    }

    pub async fn connect(&self) -> HarnessResult<()> {
        self.channel.connect(Some(Self::credentials())).await?;
        Ok(())
    }

    /// Connect, join, initialize media and route relay events
    pub async fn join(&self) -> HarnessResult<JoinRoomResponse> {
        self.connect().await?;
        let joined = self.channel.join_room("room-1", "tester").await?;
        let capabilities = joined.rtp_capabilities.clone().ok_or_else(|| {
            HarnessError::ValidationError("join reply without capabilities".to_string())
        })?;
        self.session.initialize(&capabilities).await?;
        self.session.attach();
        Ok(joined)
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Await a future with a two second cap
pub async fn within<F: std::future::Future>(what: &str, future: F) -> HarnessResult<F::Output> {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .map_err(|_| HarnessError::Timeout(what.to_string()))
}
