//! Mesh DFU: update the firmware of a neighbouring node over BLE.
//!
//! [`MeshDfuHost`] walks a fixed sequence of phases: command the target into
//! its DFU bootloader over the Crownstone protocol, reconnect to the bare
//! bootloader, discover the Nordic secure DFU characteristics, then hand the
//! firmware over. The transfer phases themselves are not implemented yet and
//! abort cleanly. [`MeshDfuTransport`] tracks the discovered DFU service and
//! answers whether the connected peer is actually in DFU mode.
//!
//! The host owns both central seams and registers at most one expected event
//! and one timeout at any moment, in the style of a hardware event loop.

mod constants;
mod host;
mod transport;

pub use constants::*;
pub use host::*;
pub use transport::*;
