//! Error types for the RTC client core

use crate::media::MediaKind;

/// Result type alias using the client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in signaling, media session or monitoring operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Signaling connection problem
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Malformed or missing negotiation capabilities
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    /// Outbound media flow could not be created or updated
    #[error("Produce error: {0}")]
    Produce(#[from] ProduceError),

    /// Inbound media flow could not be created
    #[error("Consume error: {0}")]
    Consume(#[from] ConsumeError),

    /// The relay rejected a request
    #[error("Server error {code}: {message}")]
    Server {
        /// Relay-reported error code
        code: i32,
        /// Relay-reported message
        message: String,
    },

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Local media stack error
    #[error("Media engine error: {0}")]
    Engine(String),
}

/// Signaling connection failures
///
/// The split between authentication and transient problems decides whether
/// the channel refreshes its credential or simply backs off and retries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// No credential was supplied and none is remembered
    #[error("no credential available")]
    MissingCredential,

    /// The relay refused the credential
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network-level failure that may succeed on retry
    #[error("transient failure: {0}")]
    Transient(String),

    /// The link dropped while the request was in flight
    #[error("connection lost: {0}")]
    Lost(String),

    /// A request was made without an established connection
    #[error("not connected")]
    NotConnected,

    /// The channel was explicitly closed
    #[error("channel closed")]
    Closed,
}

impl ConnectionError {
    /// Build the right variant from a free-form failure message
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if crate::auth::is_auth_failure(&message) {
            ConnectionError::Auth(message)
        } else {
            ConnectionError::Transient(message)
        }
    }

    /// Whether this failure should go through credential refresh
    pub fn is_auth(&self) -> bool {
        matches!(self, ConnectionError::Auth(_))
    }
}

/// Capability negotiation failures (fatal)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// Transport creation attempted before `initialize`
    #[error("media session not initialized with relay capabilities")]
    NotInitialized,

    /// Remote capabilities are structurally invalid
    #[error("malformed capabilities: {0}")]
    Malformed(String),

    /// The local engine cannot satisfy the relay's capabilities
    #[error("unsupported capabilities: {0}")]
    Unsupported(String),
}

/// Outbound flow failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProduceError {
    /// The source track ended before or during negotiation (recoverable once)
    #[error("track ended")]
    TrackEnded,

    /// A producer of this kind already exists
    #[error("already producing {0}")]
    AlreadyProducing(MediaKind),

    /// No producer of this kind exists
    #[error("no {0} producer")]
    NoProducer(MediaKind),

    /// Track kind does not fit the producer kind
    #[error("track kind mismatch for {0} producer")]
    KindMismatch(MediaKind),

    /// The capture device failed
    #[error("device error: {0}")]
    Device(String),

    /// The user or platform denied capture
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

/// Inbound flow failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsumeError {
    /// The local engine cannot decode the remote producer
    #[error("cannot consume producer {0}")]
    CannotConsume(String),

    /// The relay does not know the receive transport
    #[error("receive transport {0} missing on relay")]
    TransportMissing(String),

    /// Malformed consume response
    #[error("invalid consumer parameters: {0}")]
    InvalidParameters(String),

    /// The producer was closed before its consumer was ready
    #[error("producer {0} closed while consuming")]
    ProducerClosed(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Connection(ConnectionError::Transient(_))
                | Error::Connection(ConnectionError::Lost(_))
                | Error::Produce(ProduceError::TrackEnded)
                | Error::Consume(ConsumeError::TransportMissing(_))
        )
    }

    /// Check if this error should trigger credential refresh
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Connection(c) if c.is_auth())
    }

    /// Check if the relay reports a missing transport
    ///
    /// Recognises both the typed variant and a relay message of the form
    /// "transport ... not found".
    pub fn is_transport_missing(&self) -> bool {
        match self {
            Error::Consume(ConsumeError::TransportMissing(_)) => true,
            Error::Server { message, .. } => {
                let lower = message.to_ascii_lowercase();
                lower.contains("transport") && lower.contains("not found")
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Connection(ConnectionError::Transient(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("test".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: test");

        let err = Error::Server {
            code: -32000,
            message: "nope".to_string(),
        };
        assert_eq!(err.to_string(), "Server error -32000: nope");
    }

    #[test]
    fn test_connection_error_classification() {
        assert!(ConnectionError::from_message("jwt expired").is_auth());
        assert!(ConnectionError::from_message("HTTP error: 401 Unauthorized").is_auth());
        assert!(!ConnectionError::from_message("connection reset by peer").is_auth());
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(Error::from(ConnectionError::Transient("x".into())).is_retryable());
        assert!(Error::from(ProduceError::TrackEnded).is_retryable());
        assert!(!Error::from(ProduceError::PermissionDenied("x".into())).is_retryable());
        assert!(!Error::from(CapabilityError::NotInitialized).is_retryable());
    }

    #[test]
    fn test_transport_missing_detection() {
        let err = Error::Server {
            code: -32000,
            message: "Transport abc not found".to_string(),
        };
        assert!(err.is_transport_missing());

        let err = Error::Server {
            code: -32000,
            message: "producer not found".to_string(),
        };
        assert!(!err.is_transport_missing());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = Error::from(io_err);
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::Transient(_))
        ));
    }
}
