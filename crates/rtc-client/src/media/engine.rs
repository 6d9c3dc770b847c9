//! Local media stack seams
//!
//! The session never talks to a WebRTC implementation directly. It drives a
//! [`MediaEngine`] (capabilities and transport construction), the
//! [`LocalTransport`]s it returns, and a [`TrackSource`] for capture.

use super::ladder::Encoding;
use super::types::{AppData, Direction, MediaKind, Track, TransportState};
use crate::error::CapabilityError;
use crate::signaling::protocol::{ConsumerParams, TransportParams};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Cumulative counters of one flow, as reported by the local stack
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowCounters {
    /// Bytes sent or received
    pub bytes: u64,
    /// Packets sent or received
    pub packets: u64,
    /// Packets lost
    pub packets_lost: u64,
    /// Interarrival jitter in milliseconds
    pub jitter_ms: f64,
    /// Round-trip time in milliseconds
    pub rtt_ms: f64,
    /// Sample time in milliseconds
    pub timestamp_ms: u64,
}

/// Encoder settings for a new sender
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOptions {
    /// Simulcast encodings; empty for audio
    pub encodings: Vec<Encoding>,
    /// Start bitrate hint in kbps
    pub start_bitrate_kbps: Option<u32>,
}

/// A started local sender
#[derive(Debug, Clone)]
pub struct LocalSender {
    /// Engine-local handle
    pub local_id: String,
    /// RTP parameters announced to the relay
    pub rtp_parameters: Value,
}

/// A started local receiver
#[derive(Debug, Clone)]
pub struct LocalReceiver {
    /// Engine-local handle
    pub local_id: String,
    /// Decoded remote track
    pub track: Track,
}

/// Local WebRTC device
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Load the relay's RTP capabilities
    async fn load(&self, capabilities: &Value) -> Result<()>;

    /// Local receive capabilities, available after `load`
    fn rtp_capabilities(&self) -> Option<Value>;

    /// Construct a local transport from relay-issued parameters
    async fn create_transport(
        &self,
        direction: Direction,
        params: &TransportParams,
    ) -> Result<Arc<dyn LocalTransport>>;

    /// Release the loaded capabilities
    fn unload(&self);
}

/// Local half of one media transport
#[async_trait]
pub trait LocalTransport: Send + Sync {
    /// Relay-side transport id
    fn id(&self) -> &str;

    /// Send or receive
    fn direction(&self) -> Direction;

    /// Connection state updates
    fn state_changes(&self) -> watch::Receiver<TransportState>;

    /// Tags attached when the transport was created
    fn app_data(&self) -> AppData {
        AppData::new()
    }

    /// Local DTLS parameters for `connectTransport`
    async fn dtls_parameters(&self) -> Result<Value>;

    /// Start encoding `track`
    async fn start_sending(&self, track: &Track, options: &SendOptions) -> Result<LocalSender>;

    /// Pause or resume a sender
    async fn set_sender_paused(&self, local_id: &str, paused: bool) -> Result<()>;

    /// Swap the track feeding a sender
    async fn replace_track(&self, local_id: &str, track: &Track) -> Result<()>;

    /// Stop a sender
    fn stop_sending(&self, local_id: &str);

    /// Start decoding a remote producer
    async fn start_receiving(&self, params: &ConsumerParams) -> Result<LocalReceiver>;

    /// Stop a receiver
    fn stop_receiving(&self, local_id: &str);

    /// Cumulative counters for a sender or receiver
    async fn counters(&self, local_id: &str) -> Result<FlowCounters>;

    /// Close the transport and everything on it
    fn close(&self);
}

/// Capture collaborator
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Acquire a fresh track for `kind`
    async fn acquire(&self, kind: MediaKind) -> Result<Track>;
}

/// Structural check of relay capabilities before they reach the engine
pub fn validate_capabilities(capabilities: &Value) -> std::result::Result<(), CapabilityError> {
    let object = capabilities
        .as_object()
        .ok_or_else(|| CapabilityError::Malformed("capabilities must be an object".to_string()))?;

    let codecs = object
        .get("codecs")
        .and_then(Value::as_array)
        .ok_or_else(|| CapabilityError::Malformed("missing codecs array".to_string()))?;

    if codecs.is_empty() {
        return Err(CapabilityError::Malformed("codecs array is empty".to_string()));
    }

    for (index, codec) in codecs.iter().enumerate() {
        for field in ["mimeType", "kind"] {
            let present = codec
                .get(field)
                .and_then(Value::as_str)
                .map(|s| !s.is_empty())
                .unwrap_or(false);
            if !present {
                return Err(CapabilityError::Malformed(format!(
                    "codec {} has no {}",
                    index, field
                )));
            }
        }
    }

    Ok(())
}
