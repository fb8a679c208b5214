//! Framing constants, byte stuffing, and the frame CRC.

use thiserror::Error;

// ============================================================================
// Framing
// ============================================================================

/// Marks the start of a frame. Never appears escaped inside one.
pub const UART_START_BYTE: u8 = 0x7E;
/// Escape marker for byte stuffing.
pub const UART_ESCAPE_BYTE: u8 = 0x5C;
/// XOR mask applied to an escaped byte.
pub const UART_ESCAPE_FLIP_MASK: u8 = 0x40;

/// Size of the frame size header.
pub const SIZE_HEADER_LEN: usize = 2;
/// Size of the CRC tail.
pub const CRC_LEN: usize = 2;
/// Size of the wrapper type field.
pub const WRAPPER_HEADER_LEN: usize = 1;
/// Size of the inner message header: device id plus opcode.
pub const UART_MSG_HEADER_LEN: usize = 3;

/// Largest accepted frame payload. Oversized size headers reset the reader.
pub const UART_MAX_PAYLOAD_SIZE: usize = 500;

/// Wrapper type of a plain UART message.
pub const WRAPPER_UART_MSG: u8 = 0;
/// Wrapper type of an encrypted UART message.
pub const WRAPPER_ENCRYPTED_UART_MSG: u8 = 1;

// ============================================================================
// Encryption
// ============================================================================

/// Length of the per-packet nonce in an encrypted wrapper.
pub const PACKET_NONCE_LEN: usize = 8;
/// Length of the per-session nonce, exchanged at session setup.
pub const SESSION_NONCE_LEN: usize = 8;
/// Length of the UART key.
pub const UART_KEY_LEN: usize = 16;
/// AES block size; encrypted payloads are padded to this.
pub const AES_BLOCK_LEN: usize = 16;

/// When to encrypt an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionPolicy {
    /// Never encrypt, for handshake traffic.
    Never,
    /// Encrypt, or fail when no session is established.
    OrFail,
    /// Follow the per-opcode requirement table.
    #[default]
    AccordingToType,
    /// Encrypt whenever a session is available.
    IfEnabled,
}

// Handshake opcodes, exchanged before any session exists.
pub const OPCODE_HELLO: u8 = 0;
pub const OPCODE_SESSION_NONCE: u8 = 1;
/// Periodic liveness message.
pub const OPCODE_HEARTBEAT: u8 = 2;
/// Node status report.
pub const OPCODE_STATUS: u8 = 3;
/// Control command for the node.
pub const OPCODE_CONTROL: u8 = 10;
/// Result of a control command.
pub const OPCODE_RESULT: u8 = 11;

/// Whether an opcode carries data that must be encrypted once the host
/// demands encryption. Handshake opcodes are exempt, nothing else is.
pub fn opcode_requires_encryption(opcode: u8) -> bool {
    !matches!(opcode, OPCODE_HELLO | OPCODE_SESSION_NONCE)
}

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced to the writing side. The reading side never errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UartError {
    #[error("message requires encryption but no session is established")]
    EncryptionNotReady,
    #[error("payload of {actual} bytes exceeds the maximum of {max}")]
    PayloadTooLarge { max: usize, actual: usize },
    #[error("a message write is already in progress")]
    WriteInProgress,
    #[error("no message write in progress")]
    NoWriteInProgress,
    #[error("message parts do not match the announced size")]
    SizeMismatch,
}

// ============================================================================
// CRC
// ============================================================================

/// Incremental CRC-16/CCITT-FALSE over the frame bytes.
#[derive(Debug, Clone, Copy)]
pub struct Crc16 {
    value: u16,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 {
    pub fn new() -> Self {
        Crc16 { value: 0xFFFF }
    }

    pub fn update(&mut self, byte: u8) {
        self.value ^= (byte as u16) << 8;
        for _ in 0..8 {
            if self.value & 0x8000 != 0 {
                self.value = (self.value << 1) ^ 0x1021;
            } else {
                self.value <<= 1;
            }
        }
    }

    pub fn update_all(&mut self, data: &[u8]) {
        for byte in data {
            self.update(*byte);
        }
    }

    pub fn finish(&self) -> u16 {
        self.value
    }
}

// ============================================================================
// Byte stuffing
// ============================================================================

/// Whether a byte must be escaped on the wire.
pub fn needs_escaping(byte: u8) -> bool {
    byte == UART_START_BYTE || byte == UART_ESCAPE_BYTE
}

/// The flip applied to a byte following the escape marker. Its own inverse.
pub fn escape_flip(byte: u8) -> u8 {
    byte ^ UART_ESCAPE_FLIP_MASK
}
