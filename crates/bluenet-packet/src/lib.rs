//! Bluenet Mesh Message Protocol
//!
//! This crate provides types and utilities for the application messages
//! carried over the bluenet mesh. Every non-segmented mesh message is a
//! single type byte followed by a type-specific payload:
//!
//! ```text
//! +------+----------------------+
//! | type | payload[0..n]        |
//! +------+----------------------+
//! ```
//!
//! Validity is type-dependent: fixed-size payloads must match exactly,
//! header-prefixed payloads (STATE_SET, RESULT) must meet a minimum size,
//! and unknown type codes are always invalid.
//!
//! The crate also implements the protocol-shortened field encodings used by
//! the STATE_SET message (state type/id, persistence mode, access level,
//! command source), which squeeze wider host-side values into a few bits.

mod codec;
mod constants;
mod error;
mod shorten;
mod types;

pub use codec::*;
pub use constants::*;
pub use error::*;
pub use shorten::*;
pub use types::*;
