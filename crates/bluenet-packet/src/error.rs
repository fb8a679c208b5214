//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when working with mesh messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Message is too short to carry the type header.
    #[error("message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Encoded message would exceed the non-segmented size limit.
    #[error("message too long: maximum {max} bytes, got {actual}")]
    MessageTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual encoded length.
        actual: usize,
    },

    /// Unknown message type code.
    #[error("unknown mesh message type: 0x{0:02X}")]
    UnknownType(u8),

    /// Payload size does not match what the message type requires.
    #[error("wrong payload size for {msg_type:?}: got {actual}")]
    WrongPayloadSize {
        /// The message type being validated.
        msg_type: crate::MeshMsgType,
        /// Actual payload length.
        actual: usize,
    },
}
