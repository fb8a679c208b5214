//! Tuning constants for the mesh send path.

// ============================================================================
// Queue
// ============================================================================

/// Number of slots in the reliable multicast queue.
pub const QUEUE_SIZE: usize = 4;

/// Interval between retries of the in-flight message, in milliseconds.
/// Must be a multiple of the tick interval.
pub const ACKED_RETRY_INTERVAL_MS: u32 = 200;

/// How often a reply to a reliable message is transmitted.
pub const ACK_TRANSMISSIONS: u8 = 3;

/// Maximum number of targets of one reliable message, the width of the
/// reply bitmask.
pub const MAX_ACKED_TARGETS: usize = 32;

// ============================================================================
// Admission policy
// ============================================================================

/// Timeout for a reliable message when the caller passes 0, in seconds.
pub const RELIABLE_TIMEOUT_DEFAULT_S: u8 = 10;
/// Minimum timeout for a reliable message, in seconds.
pub const RELIABLE_TIMEOUT_MIN_S: u8 = 2;
/// Maximum timeout for a reliable message, in seconds.
pub const RELIABLE_TIMEOUT_MAX_S: u8 = 60;

/// Transmission count for an unacked message when the caller passes 0.
pub const TRANSMISSIONS_DEFAULT: u8 = 3;
/// Maximum transmission count for an unacked message.
pub const TRANSMISSIONS_MAX: u8 = 10;
