//! Client-side real-time communication core for huddle
//!
//! Talks to a media relay (SFU) on behalf of one participant: keeps the
//! signaling link alive, negotiates media transports and flows, and
//! estimates per-flow network quality.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  UI collaborator                                       │
//! │  ↓ produce / consume / pause          ↑ SessionEvent   │
//! │  MediaSession                                          │
//! │  ├─ Transport (send, recv) + Negotiator                │
//! │  ├─ producers / consumers / OwnerRegistry              │
//! │  └─ MediaEngine, TrackSource (local WebRTC stack)      │
//! │     ↓ requests                        ↑ relay events   │
//! │  SignalingChannel (JSON-RPC 2.0 over WebSocket)        │
//! │  └─ reconnect backoff, AuthRefresher                   │
//! │                                                        │
//! │  NetworkQualityMonitor ── reads ──> MediaSession       │
//! │  └─ SampleSink (batched NetworkSample)                 │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use huddle_rtc_client::RtcClientConfig;
//!
//! let config = RtcClientConfig::from_toml_str(
//!     r#"
//!     [signaling]
//!     url = "wss://relay.example.com/ws"
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.signaling.teardown_timeout_ms, 3000);
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use huddle_rtc_client::auth::{Credentials, NoRefresh};
//! use huddle_rtc_client::signaling::{SignalingChannel, WebSocketConnector};
//! use huddle_rtc_client::RtcClientConfig;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = RtcClientConfig::default();
//! let channel = SignalingChannel::new(
//!     &config.signaling,
//!     Arc::new(WebSocketConnector::new()),
//!     Arc::new(NoRefresh),
//! );
//!
//! channel.connect(Some(Credentials::new("access-token"))).await?;
//! let joined = channel.join_room("standup", "Ada").await?;
//! if !joined.is_admitted() {
//!     println!("waiting for a moderator");
//! }
//! channel.teardown().await;
//! # Ok::<(), huddle_rtc_client::Error>(())
//! # });
//! ```

#![warn(clippy::all)]

pub mod auth;
pub mod config;
pub mod error;
pub mod media;
pub mod quality;
pub mod signaling;

pub use auth::{AuthRefresher, Credentials, RefreshedToken};
pub use config::{MediaConfig, MonitorConfig, RtcClientConfig, SignalingConfig};
pub use error::{CapabilityError, ConnectionError, ConsumeError, Error, ProduceError, Result};
pub use media::{MediaKind, MediaSession, SessionEvent, Track, TrackKind};
pub use quality::{NetworkQualityMonitor, NetworkSample, QualityLevel, SampleSink};
pub use signaling::{ChannelEvent, ChannelState, SignalingChannel, TeardownOutcome};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
