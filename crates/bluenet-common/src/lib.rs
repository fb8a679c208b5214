//! # bluenet-common
//!
//! Shared types and the typed event model for the bluenet protocol core.
//!
//! Every state machine in this workspace (the reliable multicast queue, the
//! mesh DFU host, the UART handler) is a plain `&mut self` struct driven by
//! one cooperative dispatch context: events arrive as [`Event`] values and a
//! periodic [`Event::Tick`] stands in for the hardware timer. No component
//! blocks; waiting is expressed by registering interest and returning.

mod error;
mod events;
mod source;
mod types;

pub use error::*;
pub use events::*;
pub use source::*;
pub use types::*;
