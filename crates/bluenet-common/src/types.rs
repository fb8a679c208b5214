//! Core identifier types.

use serde::{Deserialize, Serialize};

/// Short integer network address of a node in the mesh.
///
/// Id 0 is reserved for "everyone": publishing to stone id 0 targets the
/// group address instead of a unicast address.
pub type StoneId = u16;

/// Length of a BLE device address in bytes.
pub const MAC_ADDRESS_LEN: usize = 6;

/// BLE device address (MAC), as scanned over the air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceAddress(pub [u8; MAC_ADDRESS_LEN]);

impl DeviceAddress {
    /// Create an address from raw bytes.
    pub fn new(bytes: [u8; MAC_ADDRESS_LEN]) -> Self {
        DeviceAddress(bytes)
    }
}

/// A 128-bit BLE UUID.
///
/// Vendor services use a 16-byte base with a 16-bit short UUID patched into
/// bytes 12..14 (the position the SIG base reserves for the short form).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uuid {
    bytes: [u8; 16],
}

/// The Bluetooth SIG base UUID (0000xxxx-0000-1000-8000-00805F9B34FB),
/// stored little-endian as the softdevice keeps it.
const SIG_BASE_UUID: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

impl Uuid {
    /// Build a UUID from a full 16-byte base (little-endian).
    pub fn from_full(bytes: [u8; 16]) -> Self {
        Uuid { bytes }
    }

    /// Build a UUID from a 16-bit short UUID on the SIG base.
    pub fn from_short(short: u16) -> Self {
        Uuid::from_base(&Uuid::from_full(SIG_BASE_UUID), short)
    }

    /// Build a UUID by patching a 16-bit short UUID into another UUID's base.
    pub fn from_base(base: &Uuid, short: u16) -> Self {
        let mut bytes = base.bytes;
        bytes[12] = (short & 0xFF) as u8;
        bytes[13] = (short >> 8) as u8;
        Uuid { bytes }
    }

    /// Raw little-endian bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.bytes
    }
}
