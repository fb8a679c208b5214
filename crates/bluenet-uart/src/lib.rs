//! The binary UART protocol between a node and its attached host.
//!
//! Wire format of one frame:
//!
//! ```text
//! +-------+---------+---------+--------------+--------+
//! | 0x7E  | size_lo | size_hi | wrapper type | ...    |
//! +-------+---------+---------+--------------+--------+
//!                   payload continues         crc_lo crc_hi
//! ```
//!
//! `size` counts wrapper type, payload, and CRC. Every byte after the start
//! byte is byte-stuffed: start and escape bytes in the data are replaced by
//! the escape byte followed by the value XORed with a flip mask. The CRC
//! covers the size header through the payload.
//!
//! Two wrapper types exist: a plain UART message
//! (`[device_id:u16][opcode:u8][data]`) and an encrypted one carrying a
//! packet nonce, a key id, and the AES-CTR ciphertext of an inner
//! size-prefixed message padded to 16-byte blocks. Integrity failures are
//! dropped silently; the byte source never sees an error.

mod connection;
mod handler;
mod protocol;
mod reader;
mod writer;

pub use connection::*;
pub use handler::*;
pub use protocol::*;
pub use reader::*;
pub use writer::*;
