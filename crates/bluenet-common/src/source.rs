//! Command provenance and access levels.
//!
//! Every switch or state command carries where it came from and with which
//! access level it was authorized. Both are carried over the mesh in a
//! shortened form (see `bluenet-packet`).

use serde::{Deserialize, Serialize};

/// Where a command originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandSource {
    /// No source set.
    None,
    /// Default source, used when the real source cannot be represented.
    Default,
    /// Generated internally, e.g. by behaviour rules.
    Internal,
    /// Received over UART.
    Uart,
    /// Received over a BLE connection.
    Connection,
    /// Triggered by switchcraft (mains-switch detection).
    Switchcraft,
    /// A tracked-device token; carries the device id.
    DeviceToken(u16),
}

/// Access level a command was authorized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessLevel {
    Admin,
    Member,
    Basic,
    SetupKey,
    ServiceData,
    Localization,
    NotSet,
    NoOne,
}
