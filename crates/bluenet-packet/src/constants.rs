//! Protocol constants
//!
//! Type codes, opcodes, and size limits of the bluenet mesh message
//! protocol.

// ============================================================================
// Message Type Codes
// ============================================================================

/// Test message, used to measure mesh reliability.
pub const MESH_TYPE_TEST: u8 = 0;
/// Acknowledgement, empty payload.
pub const MESH_TYPE_ACK: u8 = 1;
/// Periodic time state broadcast.
pub const MESH_TYPE_STATE_TIME: u8 = 2;
/// Set-time command.
pub const MESH_TYPE_CMD_TIME: u8 = 3;
/// No-operation command, empty payload.
pub const MESH_TYPE_CMD_NOOP: u8 = 4;
/// Multi-switch item: switch one stone to a value, with delay.
pub const MESH_TYPE_CMD_MULTI_SWITCH: u8 = 5;
/// State part 0: switch state and power usage.
pub const MESH_TYPE_STATE_0: u8 = 6;
/// State part 1: temperature and energy.
pub const MESH_TYPE_STATE_1: u8 = 7;
/// Profile/location event for presence tracking.
pub const MESH_TYPE_PROFILE_LOCATION: u8 = 8;
/// Behaviour settings broadcast.
pub const MESH_TYPE_SET_BEHAVIOUR_SETTINGS: u8 = 9;
/// Register a tracked device.
pub const MESH_TYPE_TRACKED_DEVICE_REGISTER: u8 = 10;
/// Update a tracked device token.
pub const MESH_TYPE_TRACKED_DEVICE_TOKEN: u8 = 11;
/// Request a sync of missing state.
pub const MESH_TYPE_SYNC_REQUEST: u8 = 12;
/// Broadcast the tracked device list size.
pub const MESH_TYPE_TRACKED_DEVICE_LIST_SIZE: u8 = 14;
/// Generic state-set command with shortened header.
pub const MESH_TYPE_STATE_SET: u8 = 15;
/// Result of a command, sent as reply on the acked model.
pub const MESH_TYPE_RESULT: u8 = 16;

// ============================================================================
// Model Opcodes
// ============================================================================

/// Opcode of a plain (unacked) multicast message.
pub const OPCODE_MULTICAST_MSG: u8 = 0xC2;
/// Opcode of a reliable multicast message awaiting per-target replies.
pub const OPCODE_MULTICAST_RELIABLE_MSG: u8 = 0xC3;
/// Opcode of the reply to a reliable multicast message.
pub const OPCODE_MULTICAST_REPLY: u8 = 0xC4;

// ============================================================================
// Sizes
// ============================================================================

/// Size of the mesh message header (the type byte).
pub const MESH_HEADER_SIZE: usize = 1;
/// Maximum size of a non-segmented mesh message, header included.
pub const MAX_MESH_MSG_NON_SEGMENTED_SIZE: usize = 15;

// ============================================================================
// Reliability Levels
// ============================================================================
//
// For non-reliable (unacked) messages these are transmission counts; higher
// means a better chance of delivery at the cost of airtime.

/// Single transmission.
pub const RELIABILITY_LOWEST: u8 = 1;
/// A few transmissions, the default for most commands.
pub const RELIABILITY_LOW: u8 = 3;
/// Medium reliability.
pub const RELIABILITY_MEDIUM: u8 = 5;
/// High reliability, for commands that must not be missed.
pub const RELIABILITY_HIGH: u8 = 10;
