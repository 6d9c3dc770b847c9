//! Media domain types shared by the session, transports and the monitor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Application tags attached to producers and consumers
pub type AppData = serde_json::Map<String, serde_json::Value>;

/// Kind of a media flow
///
/// `Screen` is video on the wire but lives in its own producer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Microphone audio
    Audio,
    /// Camera video
    Video,
    /// Screen share video
    Screen,
}

impl MediaKind {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Screen => "screen",
        }
    }

    /// Kind of track that can feed a flow of this kind
    pub fn track_kind(&self) -> TrackKind {
        match self {
            MediaKind::Audio => TrackKind::Audio,
            MediaKind::Video | MediaKind::Screen => TrackKind::Video,
        }
    }

    /// Parse a lowercase name; unknown names yield `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            "screen" => Some(MediaKind::Screen),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a raw track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Audio samples
    Audio,
    /// Video frames
    Video,
}

struct TrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    ended: AtomicBool,
}

/// Handle to a local or remote media track
///
/// Clones share the same underlying track; equality is by id.
#[derive(Clone)]
pub struct Track {
    inner: Arc<TrackInner>,
}

impl Track {
    /// Create a live track
    pub fn new(id: impl Into<String>, kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: id.into(),
                kind,
                label: label.into(),
                ended: AtomicBool::new(false),
            }),
        }
    }

    /// Track id
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Track kind
    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    /// Device or stream label
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether the source stopped producing
    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    /// Stop the track; every clone observes it
    pub fn stop(&self) {
        self.inner.ended.store(true, Ordering::Release);
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Track {}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// Transport direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Carries producers
    Send,
    /// Carries consumers
    Recv,
}

/// Flow direction as seen by quality reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    /// Local producer to relay
    Upstream,
    /// Relay to local consumer
    Downstream,
}

impl From<Direction> for FlowDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Send => FlowDirection::Upstream,
            Direction::Recv => FlowDirection::Downstream,
        }
    }
}

/// Transport connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    /// Created, not yet connected
    New,
    /// ICE/DTLS in progress
    Connecting,
    /// Media can flow
    Connected,
    /// Connectivity failed
    Failed,
    /// Temporarily lost connectivity
    Disconnected,
    /// Closed locally
    Closed,
}

impl TransportState {
    /// Whether the transport can no longer carry media
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportState::Failed | TransportState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_wire_names() {
        assert_eq!(serde_json::to_string(&MediaKind::Screen).unwrap(), "\"screen\"");
        let kind: MediaKind = serde_json::from_str("\"audio\"").unwrap();
        assert_eq!(kind, MediaKind::Audio);
        assert_eq!(MediaKind::parse("video"), Some(MediaKind::Video));
        assert_eq!(MediaKind::parse("data"), None);
    }

    #[test]
    fn test_screen_uses_video_tracks() {
        assert_eq!(MediaKind::Screen.track_kind(), TrackKind::Video);
        assert_eq!(MediaKind::Audio.track_kind(), TrackKind::Audio);
    }

    #[test]
    fn test_track_stop_is_shared() {
        let track = Track::new("t1", TrackKind::Audio, "mic");
        let clone = track.clone();
        assert!(!clone.is_ended());
        track.stop();
        assert!(clone.is_ended());
        assert_eq!(track, clone);
    }

    #[test]
    fn test_direction_mapping() {
        assert_eq!(FlowDirection::from(Direction::Send), FlowDirection::Upstream);
        assert_eq!(FlowDirection::from(Direction::Recv), FlowDirection::Downstream);
        assert!(TransportState::Failed.is_terminal());
        assert!(!TransportState::Disconnected.is_terminal());
    }
}
