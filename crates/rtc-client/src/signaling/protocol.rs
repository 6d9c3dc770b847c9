//! JSON-RPC 2.0 signaling protocol types
//!
//! Outbound requests and inbound relay notifications are both modelled as
//! tagged unions so that every payload is validated once, at the channel
//! boundary, instead of being picked apart by whoever handles it.

use crate::media::{AppData, MediaKind};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 protocol version
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes plus relay-specific ones
pub mod error_codes {
    /// Invalid JSON was received
    pub const PARSE_ERROR: i32 = -32700;

    /// The method does not exist / is not available
    pub const METHOD_NOT_FOUND: i32 = -32601;

    /// Invalid method parameter(s)
    pub const INVALID_PARAMS: i32 = -32602;

    /// Internal JSON-RPC error
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Transport, producer or consumer unknown to the relay
    pub const NOT_FOUND: i32 = -32000;

    /// Credential rejected
    pub const UNAUTHORIZED: i32 = -32001;
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    /// Error code
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<ErrorObject> for Error {
    fn from(err: ErrorObject) -> Self {
        Error::Server {
            code: err.code,
            message: err.message,
        }
    }
}

/// Requests the client sends to the relay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum SignalingRequest {
    /// Join a room; may come back pending moderator approval
    JoinRoom(JoinRoomParams),
    /// Ask the relay for transport parameters
    CreateTransport(CreateTransportParams),
    /// Complete the DTLS handshake parameters for a transport
    ConnectTransport(ConnectTransportParams),
    /// Announce a new outbound flow
    Produce(ProduceParams),
    /// Request an inbound flow for a remote producer
    Consume(ConsumeParams),
    /// Pause an outbound flow
    PauseProducer(ProducerRef),
    /// Resume an outbound flow
    ResumeProducer(ProducerRef),
    /// Tell the relay a producer's source track was swapped
    ReplaceTrack(ProducerRef),
    /// Close an outbound flow
    CloseProducer(ProducerRef),
    /// Leave the room and release relay resources
    LeaveRoom(LeaveRoomParams),
}

/// Parameters for joinRoom
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomParams {
    /// Room identifier
    pub room_id: String,
    /// Name shown to other participants
    pub display_name: String,
}

/// Parameters for createTransport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransportParams {
    /// true for the send transport, false for the receive transport
    pub is_producer: bool,
}

/// Parameters for connectTransport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransportParams {
    /// Relay-side transport id
    pub transport_id: String,
    /// Local DTLS parameters
    pub dtls_parameters: Value,
}

/// Parameters for produce
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProduceParams {
    /// Send transport id
    pub transport_id: String,
    /// Flow kind
    pub kind: MediaKind,
    /// Local RTP send parameters
    pub rtp_parameters: Value,
    /// Application tags forwarded to consumers
    #[serde(default)]
    pub app_data: AppData,
}

/// Parameters for consume
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeParams {
    /// Receive transport id
    pub transport_id: String,
    /// Remote producer to consume
    pub producer_id: String,
    /// Local receive capabilities
    pub rtp_capabilities: Value,
}

/// Parameters for requests addressing a single producer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProducerRef {
    /// Producer id
    pub producer_id: String,
}

impl ProducerRef {
    /// Reference a producer by id
    pub fn new(producer_id: impl Into<String>) -> Self {
        Self {
            producer_id: producer_id.into(),
        }
    }
}

/// Parameters for leaveRoom (none)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LeaveRoomParams {}

impl SignalingRequest {
    /// Get the method name
    pub fn method_name(&self) -> &'static str {
        match self {
            SignalingRequest::JoinRoom(_) => "joinRoom",
            SignalingRequest::CreateTransport(_) => "createTransport",
            SignalingRequest::ConnectTransport(_) => "connectTransport",
            SignalingRequest::Produce(_) => "produce",
            SignalingRequest::Consume(_) => "consume",
            SignalingRequest::PauseProducer(_) => "pauseProducer",
            SignalingRequest::ResumeProducer(_) => "resumeProducer",
            SignalingRequest::ReplaceTrack(_) => "replaceTrack",
            SignalingRequest::CloseProducer(_) => "closeProducer",
            SignalingRequest::LeaveRoom(_) => "leaveRoom",
        }
    }

    /// Encode as a JSON-RPC 2.0 request frame with the given correlation id
    pub fn to_frame(&self, id: u64) -> Result<String> {
        let mut value = serde_json::to_value(self).map_err(|e| {
            Error::Serialization(format!("Failed to serialize signaling request: {}", e))
        })?;
        if let Value::Object(map) = &mut value {
            map.insert("jsonrpc".to_string(), Value::from(JSONRPC_VERSION));
            map.insert("id".to_string(), Value::from(id));
        }
        Ok(value.to_string())
    }

    /// Decode a JSON-RPC request frame (used by relay fakes in tests)
    pub fn from_frame(text: &str) -> Result<(u64, Self)> {
        let mut value: Value = serde_json::from_str(text)?;
        let id = value
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Serialization("request frame without numeric id".to_string()))?;
        if let Value::Object(map) = &mut value {
            map.remove("jsonrpc");
            map.remove("id");
        }
        let request = serde_json::from_value(value)?;
        Ok((id, request))
    }
}

/// A frame received from the relay
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Acknowledgement of one of our requests
    Response {
        /// Correlation id
        id: u64,
        /// Result payload or relay error
        outcome: std::result::Result<Value, ErrorObject>,
    },
    /// Relay-initiated event
    Notification {
        /// Event name
        method: String,
        /// Event payload
        params: Value,
    },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

impl InboundFrame {
    /// Parse a text frame from the relay
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawFrame = serde_json::from_str(text)
            .map_err(|e| Error::Serialization(format!("Invalid signaling frame: {}", e)))?;

        if let Some(method) = raw.method {
            return Ok(InboundFrame::Notification {
                method,
                params: raw.params.unwrap_or(Value::Null),
            });
        }

        let id = raw
            .id
            .as_ref()
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Serialization("response frame without numeric id".to_string()))?;

        let outcome = match raw.error {
            Some(error) => Err(error),
            None => Ok(raw.result.unwrap_or(Value::Null)),
        };

        Ok(InboundFrame::Response { id, outcome })
    }

    /// Encode a success response (used by relay fakes in tests)
    pub fn response_frame(id: u64, result: Value) -> String {
        serde_json::json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result }).to_string()
    }

    /// Encode an error response (used by relay fakes in tests)
    pub fn error_frame(id: u64, code: i32, message: &str) -> String {
        serde_json::json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "error": { "code": code, "message": message }
        })
        .to_string()
    }

    /// Encode a notification (used by relay fakes in tests)
    pub fn notification_frame(method: &str, params: Value) -> String {
        serde_json::json!({ "jsonrpc": JSONRPC_VERSION, "method": method, "params": params })
            .to_string()
    }
}

/// A producer that already exists when we join
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProducer {
    /// Producer id
    pub producer_id: String,
    /// Owning user
    pub user_id: String,
    /// Flow kind
    pub kind: MediaKind,
}

/// Result of joinRoom
///
/// A room under moderation answers successfully with `pending_approval` set;
/// callers must branch on the content rather than on success alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinRoomResponse {
    /// The user is in the room
    pub admitted: bool,
    /// The user waits for a moderator
    pub pending_approval: bool,
    /// Relay RTP capabilities (present once admitted)
    pub rtp_capabilities: Option<Value>,
    /// Producers already in the room
    pub producers: Vec<RemoteProducer>,
}

impl JoinRoomResponse {
    /// Whether media negotiation may start
    pub fn is_admitted(&self) -> bool {
        self.admitted && !self.pending_approval
    }
}

/// Result of createTransport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransportParams {
    /// Relay-side transport id
    pub id: String,
    /// ICE parameters
    pub ice_parameters: Value,
    /// ICE candidates
    pub ice_candidates: Value,
    /// Relay DTLS parameters
    pub dtls_parameters: Value,
    /// SCTP parameters when data channels are enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sctp_parameters: Option<Value>,
}

/// Result of produce
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProduceResponse {
    /// Relay-assigned producer id
    pub id: String,
}

/// Result of consume
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerParams {
    /// Relay-assigned consumer id
    pub id: String,
    /// Producer being consumed
    pub producer_id: String,
    /// Flow kind ("audio" or "video" on the wire)
    pub kind: MediaKind,
    /// RTP receive parameters
    pub rtp_parameters: Value,
    /// Producer's application tags
    #[serde(default)]
    pub app_data: AppData,
}

/// new-producer event payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewProducerEvent {
    /// Producer id
    pub producer_id: String,
    /// Owning user
    pub user_id: String,
    /// Flow kind
    pub kind: MediaKind,
}

/// producer-closed event payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProducerClosedEvent {
    /// Producer id
    pub producer_id: String,
    /// Owning user, when the relay includes it
    #[serde(default)]
    pub user_id: Option<String>,
    /// Flow kind, when the relay includes it
    #[serde(default)]
    pub kind: Option<MediaKind>,
}

/// user-left event payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftEvent {
    /// Departed user
    pub user_id: String,
}

/// Validated relay notification
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A remote participant started a flow
    NewProducer(NewProducerEvent),
    /// A remote flow ended
    ProducerClosed(ProducerClosedEvent),
    /// A remote participant left
    UserLeft(UserLeftEvent),
}

impl ServerEvent {
    /// Wire name of the new-producer event
    pub const NEW_PRODUCER: &'static str = "new-producer";
    /// Wire name of the producer-closed event
    pub const PRODUCER_CLOSED: &'static str = "producer-closed";
    /// Wire name of the user-left event
    pub const USER_LEFT: &'static str = "user-left";

    /// Validate a notification payload
    ///
    /// Returns `None` for names this client does not model.
    pub fn parse(method: &str, params: &Value) -> Option<Result<Self>> {
        let parsed = match method {
            Self::NEW_PRODUCER => decode::<NewProducerEvent>(method, params).and_then(|e| {
                require_non_empty(method, "producerId", &e.producer_id)?;
                require_non_empty(method, "userId", &e.user_id)?;
                Ok(ServerEvent::NewProducer(e))
            }),
            Self::PRODUCER_CLOSED => decode::<ProducerClosedEvent>(method, params).and_then(|e| {
                require_non_empty(method, "producerId", &e.producer_id)?;
                Ok(ServerEvent::ProducerClosed(e))
            }),
            Self::USER_LEFT => decode::<UserLeftEvent>(method, params).and_then(|e| {
                require_non_empty(method, "userId", &e.user_id)?;
                Ok(ServerEvent::UserLeft(e))
            }),
            _ => return None,
        };
        Some(parsed)
    }

    /// Wire name of this event
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewProducer(_) => Self::NEW_PRODUCER,
            ServerEvent::ProducerClosed(_) => Self::PRODUCER_CLOSED,
            ServerEvent::UserLeft(_) => Self::USER_LEFT,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(method: &str, params: &Value) -> Result<T> {
    T::deserialize(params)
        .map_err(|e| Error::Serialization(format!("Invalid {} payload: {}", method, e)))
}

fn require_non_empty(method: &str, field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Serialization(format!(
            "Invalid {} payload: {} is empty",
            method, field
        )));
    }
    Ok(())
}
