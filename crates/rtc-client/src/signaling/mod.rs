//! Relay signaling
//!
//! JSON-RPC 2.0 over a duplex text link. [`SignalingChannel`] is the only
//! type most callers need; [`protocol`] holds the typed wire messages.

mod channel;
mod connector;
pub mod protocol;
mod reconnect;

pub use channel::{
    ChannelEvent, ChannelState, EventHandler, HandlerId, SignalingChannel, TeardownOutcome,
};
pub use connector::{CloseReason, LinkEvent, SignalingConnector, SignalingLink, WebSocketConnector};
pub use protocol::{JoinRoomResponse, RemoteProducer, ServerEvent, SignalingRequest};
pub use reconnect::ReconnectionPolicy;
