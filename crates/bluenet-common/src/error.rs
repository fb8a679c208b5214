//! Return codes shared across the protocol core.

use thiserror::Error;

/// Caller-facing errors, returned synchronously at admission time.
///
/// Transient link conditions (busy, wrong state) from the central
/// collaborators are not errors; they are reported as [`ConnectStatus`]
/// values and handled by retry inside the state machines.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// No free slot or buffer available.
    #[error("no space")]
    NoSpace,

    /// The component is occupied and cannot take more work.
    #[error("busy")]
    Busy,

    /// Payload length does not match what the message type requires.
    #[error("wrong payload length")]
    WrongPayloadLength,

    /// A parameter is out of range or otherwise invalid.
    #[error("wrong parameter")]
    WrongParameter,

    /// No matching entry was found.
    #[error("not found")]
    NotFound,

    /// The message failed validation.
    #[error("invalid message")]
    InvalidMessage,

    /// The operation exists in the protocol but is not implemented.
    #[error("not implemented")]
    NotImplemented,

    /// The component has not been initialized yet.
    #[error("not initialized")]
    NotInitialized,

    /// A required resource (e.g. the DFU init packet) is not available.
    #[error("not available")]
    NotAvailable,

    /// The component is in the wrong state for this operation.
    #[error("wrong state")]
    WrongState,

    /// Failure without a more specific code.
    #[error("unspecified")]
    Unspecified,
}

/// Synchronous status of an asynchronous central operation.
///
/// `WaitForSuccess` means the operation was accepted and the result will
/// arrive later as an event; the other variants mean nothing was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// Operation accepted; wait for the result event.
    WaitForSuccess,
    /// The central is already occupied with another operation.
    Busy,
    /// The central is in a state that does not allow this operation.
    WrongState,
}
