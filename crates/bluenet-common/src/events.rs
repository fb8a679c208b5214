//! The typed event model.
//!
//! All protocol state machines are driven by a single cooperative dispatch
//! loop handing them [`Event`] values. Connection, scan, and discovery
//! results from the BLE collaborators arrive here; the periodic [`Event::Tick`]
//! replaces the hardware timer.

use crate::{DeviceAddress, ErrorCode, Uuid};

/// Interval of the periodic tick, in milliseconds.
pub const TICK_INTERVAL_MS: u32 = 100;

/// GATT handle sentinel for "not discovered".
pub const INVALID_HANDLE: u16 = 0xFFFF;

/// One discovered attribute, reported during service discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredAttribute {
    /// UUID of the discovered service or characteristic.
    pub uuid: Uuid,
    /// GATT value handle, [`INVALID_HANDLE`] for a service entry.
    pub value_handle: u16,
}

/// An advertisement observed by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedDevice {
    /// Address of the advertising device.
    pub address: DeviceAddress,
}

/// Events dispatched into the protocol core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Periodic tick, carrying a monotonically increasing tick count.
    Tick(u32),
    /// Result of a Crownstone-protocol central connect attempt.
    CsCentralConnectResult(Result<(), ErrorCode>),
    /// Result of a raw BLE central connect attempt.
    BleCentralConnectResult(Result<(), ErrorCode>),
    /// The BLE central link was disconnected.
    BleCentralDisconnected,
    /// A single attribute was discovered.
    BleCentralDiscovery(DiscoveredAttribute),
    /// Service discovery finished with the given result.
    BleCentralDiscoveryResult(Result<(), ErrorCode>),
    /// An advertisement was scanned.
    DeviceScanned(ScannedDevice),
}

/// Discriminant of [`Event`], used to register interest in one event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Tick,
    CsCentralConnectResult,
    BleCentralConnectResult,
    BleCentralDisconnected,
    BleCentralDiscovery,
    BleCentralDiscoveryResult,
    DeviceScanned,
}

impl Event {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Tick(_) => EventKind::Tick,
            Event::CsCentralConnectResult(_) => EventKind::CsCentralConnectResult,
            Event::BleCentralConnectResult(_) => EventKind::BleCentralConnectResult,
            Event::BleCentralDisconnected => EventKind::BleCentralDisconnected,
            Event::BleCentralDiscovery(_) => EventKind::BleCentralDiscovery,
            Event::BleCentralDiscoveryResult(_) => EventKind::BleCentralDiscoveryResult,
            Event::DeviceScanned(_) => EventKind::DeviceScanned,
        }
    }
}
