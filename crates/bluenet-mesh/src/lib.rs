//! Mesh send path: a retry queue for acked multicast messages and the
//! sender that applies per-command reliability policy.
//!
//! The queue holds at most one message in flight. It broadcasts the message
//! to the group address, collects one reply per target stone in a bitmask,
//! and resends on a fixed interval until every target replied or the retry
//! budget runs out. The sender sits in front of it: one method per command
//! kind, each deciding reliability, priority, and the dedup id, and replacing
//! any queued message with the same type and id.
//!
//! Everything here is single threaded. The embedder delivers [`Event::Tick`]
//! at a fixed interval and routes incoming model messages to
//! [`ReliableMulticastQueue::handle_reply`].
//!
//! [`Event::Tick`]: bluenet_common::Event::Tick

mod constants;
mod queue;
mod sender;

pub use constants::*;
pub use queue::*;
pub use sender::*;
