//! Error types for path-discovery operations.

use thiserror::Error;

/// Main error type for trace operations.
#[derive(Error, Debug)]
pub enum TraceError {
    // Resolution errors
    #[error("No such interface: {0}")]
    NoSuchInterface(String),

    #[error("Failed to resolve {what}: {reason}")]
    Resolution { what: &'static str, reason: String },

    // Channel/IO errors
    #[error("Failed to open datalink channel: {0}")]
    ChannelCreation(#[source] std::io::Error),

    #[error("Read timeout exceeded")]
    ReadTimeout,

    #[error("Send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("Receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    // Decode errors
    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Unsupported ICMP message type {0}")]
    UnsupportedPacket(u8),

    #[error("Packet did not match this trace")]
    PacketMismatch,

    // Configuration errors
    #[error("Invalid hop range: first={first_hop}, max={max_hops}")]
    InvalidHopRange { first_hop: u8, max_hops: u8 },

    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(usize),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl TraceError {
    /// Returns true if this error is recovered locally by the receive loop
    /// (e.g., timeout, decode noise, unrelated capture traffic).
    ///
    /// The capture handle sees every ICMP packet addressed to this host, so
    /// packets that fail to decode or belong to another conversation must be
    /// ignored rather than surfaced.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ReadTimeout
                | Self::PacketTooShort { .. }
                | Self::MalformedPacket(_)
                | Self::UnsupportedPacket(_)
                | Self::PacketMismatch
        )
    }
}

impl From<std::io::Error> for TraceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => TraceError::ReadTimeout,
            std::io::ErrorKind::WouldBlock => TraceError::ReadTimeout,
            _ => TraceError::ReceiveFailed(err),
        }
    }
}

/// Result type alias for trace operations.
pub type TraceResult<T> = Result<T, TraceError>;
