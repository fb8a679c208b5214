//! Nordic secure DFU protocol constants and host tuning values.

use bluenet_common::Uuid;

// ============================================================================
// Host tuning
// ============================================================================

/// How often a failed connect to the target is retried before aborting.
pub const MAX_RECONNECTION_ATTEMPTS: u8 = 3;

/// Timeout for a connect attempt, in milliseconds.
pub const CONNECT_TIMEOUT_MS: u32 = 3000;

/// How long to wait for the target to drop the link after the DFU command.
pub const DISCONNECT_TIMEOUT_MS: u32 = 5000;

/// How long to wait for the rebooted target to show up in scans before
/// connecting blindly.
pub const SCAN_TIMEOUT_MS: u32 = 2000;

/// Timeout for service discovery on the DFU target.
pub const DISCOVERY_TIMEOUT_MS: u32 = 5000;
/// Back-off before retrying a refused or timed out service discovery.
pub const DISCOVERY_RETRY_MS: u32 = 500;

// ============================================================================
// Nordic secure DFU service
// ============================================================================

/// Short UUID of the Nordic DFU service.
pub const DFU_SERVICE_UUID_SHORT: u16 = 0xFE59;

/// Base UUID of the secure DFU characteristics
/// (8EC90000-F315-4F60-9FB8-838830DAEA50), stored little-endian.
pub const DFU_BASE_UUID: [u8; 16] = [
    0x50, 0xEA, 0xDA, 0x30, 0x88, 0x83, 0xB8, 0x9F, 0x60, 0x4F, 0x15, 0xF3, 0x00, 0x00, 0xC9, 0x8E,
];

/// Short UUID of the DFU control point characteristic, on [`DFU_BASE_UUID`].
pub const DFU_CONTROL_POINT_UUID_SHORT: u16 = 0x0001;
/// Short UUID of the DFU data point characteristic, on [`DFU_BASE_UUID`].
pub const DFU_DATA_POINT_UUID_SHORT: u16 = 0x0002;

/// The full DFU service UUID.
pub fn dfu_service_uuid() -> Uuid {
    Uuid::from_short(DFU_SERVICE_UUID_SHORT)
}

// ============================================================================
// Secure DFU wire protocol
// ============================================================================

/// Operation codes of the secure DFU control point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DfuOpCode {
    CreateObject = 0x01,
    SetReceiptNotification = 0x02,
    CalculateChecksum = 0x03,
    Execute = 0x04,
    ReadObject = 0x06,
    Response = 0x60,
}

/// Result codes returned on the secure DFU control point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DfuResultCode {
    InvalidCode = 0x00,
    Success = 0x01,
    NotSupported = 0x02,
    InvalidParameter = 0x03,
    InsufficientResources = 0x04,
    InvalidObject = 0x05,
    InvalidSignature = 0x06,
    UnsupportedType = 0x07,
    OperationNotPermitted = 0x08,
    OperationFailed = 0x0A,
    ExtendedError = 0x0B,
}

impl DfuResultCode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(DfuResultCode::InvalidCode),
            0x01 => Some(DfuResultCode::Success),
            0x02 => Some(DfuResultCode::NotSupported),
            0x03 => Some(DfuResultCode::InvalidParameter),
            0x04 => Some(DfuResultCode::InsufficientResources),
            0x05 => Some(DfuResultCode::InvalidObject),
            0x06 => Some(DfuResultCode::InvalidSignature),
            0x07 => Some(DfuResultCode::UnsupportedType),
            0x08 => Some(DfuResultCode::OperationNotPermitted),
            0x0A => Some(DfuResultCode::OperationFailed),
            0x0B => Some(DfuResultCode::ExtendedError),
            _ => None,
        }
    }
}

/// Human readable text for an extended error byte following
/// [`DfuResultCode::ExtendedError`].
pub fn extended_error_text(code: u8) -> &'static str {
    match code {
        0x00 => "No extended error code has been set.",
        0x01 => "Invalid error code.",
        0x02 => "The format of the command was incorrect.",
        0x03 => "The command was successfully parsed, but it is not supported or unknown.",
        0x04 => "The init command is invalid.",
        0x05 => "The firmware version is too low.",
        0x06 => "The hardware version of the device does not match.",
        0x07 => "The array of supported SoftDevices does not contain this one.",
        0x08 => "The init packet does not contain a signature.",
        0x09 => "The hash type that is specified by the init packet is not supported.",
        0x0A => "The hash of the firmware image cannot be calculated.",
        0x0B => "The type of the signature is unknown or not supported.",
        0x0C => "The hash of the received firmware image does not match.",
        0x0D => "The available space on the device is insufficient.",
        _ => "Unknown extended error code.",
    }
}
