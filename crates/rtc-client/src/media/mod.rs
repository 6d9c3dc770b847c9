//! Media session management
//!
//! Transports, producers and consumers negotiated with the relay through the
//! signaling channel. The local WebRTC stack is reached only through the
//! [`MediaEngine`], [`LocalTransport`] and [`TrackSource`] traits.

mod engine;
mod ladder;
mod negotiator;
mod owners;
mod session;
mod transport;
mod types;

pub use engine::{
    validate_capabilities, FlowCounters, LocalReceiver, LocalSender, LocalTransport, MediaEngine,
    SendOptions, TrackSource,
};
pub use ladder::{BitrateLadder, Encoding};
pub use negotiator::{Negotiator, SignalingNegotiator};
pub use owners::{FlowOwner, OwnerRegistry, OwnerResolver};
pub use session::{
    ActiveFlow, ClosedProducer, ConsumerSnapshot, MediaSession, ProducerProfile,
    ProducerSnapshot, SessionEvent, SessionSnapshot,
};
pub use transport::{ProducedFlow, Transport};
pub use types::{AppData, Direction, FlowDirection, MediaKind, Track, TrackKind, TransportState};
