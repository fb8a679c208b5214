//! Acked multicast queue: broadcast, collect per-target replies, retry.

use bluenet_common::{ErrorCode, Event, StoneId, TICK_INTERVAL_MS};
use bluenet_packet::{
    get_type, is_valid_mesh_message, set_mesh_message, MeshMsgType, ResultHeader,
    MAX_MESH_MSG_NON_SEGMENTED_SIZE, OPCODE_MULTICAST_MSG, OPCODE_MULTICAST_RELIABLE_MSG,
    OPCODE_MULTICAST_REPLY,
};

use crate::constants::*;

/// Where a model publication is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishAddress {
    /// The group address every node subscribes to.
    Group,
    /// The unicast address of one stone.
    Stone(StoneId),
}

/// Access to the underlying mesh model publication.
///
/// The embedder backs this with the real mesh stack; tests back it with a
/// recording mock.
pub trait MeshAccess {
    /// Publish a mesh message with the given model opcode, repeated
    /// `transmissions` times.
    fn publish(&mut self, address: PublishAddress, opcode: u8, msg: &[u8], transmissions: u8);
}

/// A message admitted to the send path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshMsgItem {
    /// Type byte of the encoded message, kept for dedup matching.
    pub msg_type: MeshMsgType,
    /// Dedup id. A new item replaces a queued item with the same type and id.
    pub id: u16,
    /// Priority items are picked from the queue first.
    pub priority: bool,
    /// Reliable items wait for a reply from every target.
    pub reliable: bool,
    /// Timeout in seconds for reliable items, transmission count otherwise.
    pub timeout_or_transmissions: u8,
    /// Targets that must reply. Empty for unacked broadcasts.
    pub stone_ids: Vec<StoneId>,
    /// The encoded mesh message, type byte included.
    pub msg: Vec<u8>,
}

/// Admission interface the sender talks to.
pub trait MeshQueue {
    fn add_to_queue(&mut self, item: MeshMsgItem) -> Result<(), ErrorCode>;
    fn remove_from_queue(&mut self, msg_type: MeshMsgType, id: u16) -> Result<(), ErrorCode>;
}

/// Outcome of one reliable message, reported when its slot is freed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckResult {
    /// Type of the message this result is for.
    pub msg_type: MeshMsgType,
    /// Whether every target replied in time.
    pub success: bool,
    /// Targets that replied.
    pub acked: Vec<StoneId>,
    /// Targets that never replied.
    pub missed: Vec<StoneId>,
}

/// One reply bit per target of the in-flight message.
#[derive(Debug, Clone, Copy, Default)]
struct AckBitmask {
    num_bits: u8,
    mask: u32,
}

impl AckBitmask {
    fn reset(&mut self, num_bits: u8) {
        debug_assert!(num_bits as usize <= 32);
        self.num_bits = num_bits;
        self.mask = 0;
    }

    fn set_bit(&mut self, index: u8) {
        if index < self.num_bits {
            self.mask |= 1 << index;
        }
    }

    fn is_set(&self, index: u8) -> bool {
        index < self.num_bits && self.mask & (1 << index) != 0
    }

    fn is_all_set(&self) -> bool {
        if self.num_bits == 0 {
            return true;
        }
        let all = if self.num_bits as usize >= 32 {
            u32::MAX
        } else {
            (1u32 << self.num_bits) - 1
        };
        self.mask == all
    }
}

/// Ticks between retries of the in-flight message.
const TICKS_PER_RETRY: u32 = ACKED_RETRY_INTERVAL_MS / TICK_INTERVAL_MS;

/// The reliable multicast queue.
///
/// Owns the mesh access seam. At most one item is in flight; the rest wait
/// in a fixed slot array scanned circularly so queued items interleave
/// fairly.
pub struct ReliableMulticastQueue<M: MeshAccess> {
    mesh: M,
    slots: [Option<MeshMsgItem>; QUEUE_SIZE],
    /// Slot index to start the next scan at, advanced past each sent item.
    queue_index_next: usize,
    index_in_progress: Option<usize>,
    reply_mask: AckBitmask,
    /// Remaining process calls before the in-flight item is dropped.
    process_calls_left: u32,
}

impl<M: MeshAccess> ReliableMulticastQueue<M> {
    pub fn new(mesh: M) -> Self {
        ReliableMulticastQueue {
            mesh,
            slots: Default::default(),
            queue_index_next: 0,
            index_in_progress: None,
            reply_mask: AckBitmask::default(),
            process_calls_left: 0,
        }
    }

    /// Dispatch an event into the queue. Only ticks are of interest.
    pub fn handle_event(&mut self, event: &Event) -> Option<AckResult> {
        match event {
            Event::Tick(count) => self.tick(*count),
            _ => None,
        }
    }

    /// Process the queue once per retry interval.
    pub fn tick(&mut self, tick_count: u32) -> Option<AckResult> {
        if tick_count % TICKS_PER_RETRY != 0 {
            return None;
        }
        self.process_queue()
    }

    /// Check the in-flight item, retry it, or start the next one.
    fn process_queue(&mut self) -> Option<AckResult> {
        let result = self.check_done();
        match self.index_in_progress {
            Some(index) => self.retry_msg(index),
            None => self.send_msg_from_queue(),
        }
        result
    }

    /// Resolve the in-flight item: free it when all targets replied or the
    /// retry budget ran out, otherwise spend one budget unit.
    fn check_done(&mut self) -> Option<AckResult> {
        let index = self.index_in_progress?;
        let item = self.slots[index].as_ref()?;

        if self.reply_mask.is_all_set() {
            log::debug!("acked msg type={:?} done, all {} targets replied", item.msg_type, item.stone_ids.len());
            let result = self.make_result(item, true);
            self.free_in_progress();
            return Some(result);
        }
        if self.process_calls_left == 0 {
            log::warn!("acked msg type={:?} timed out, mask={:#x}", item.msg_type, self.reply_mask.mask);
            let result = self.make_result(item, false);
            self.free_in_progress();
            return Some(result);
        }
        self.process_calls_left -= 1;
        None
    }

    fn make_result(&self, item: &MeshMsgItem, success: bool) -> AckResult {
        let mut acked = Vec::new();
        let mut missed = Vec::new();
        for (i, id) in item.stone_ids.iter().enumerate() {
            if self.reply_mask.is_set(i as u8) {
                acked.push(*id);
            } else {
                missed.push(*id);
            }
        }
        AckResult {
            msg_type: item.msg_type,
            success,
            acked,
            missed,
        }
    }

    fn free_in_progress(&mut self) {
        if let Some(index) = self.index_in_progress.take() {
            self.slots[index] = None;
        }
    }

    /// Resend the in-flight message unchanged.
    fn retry_msg(&mut self, index: usize) {
        if let Some(item) = self.slots[index].as_ref() {
            self.mesh
                .publish(PublishAddress::Group, OPCODE_MULTICAST_RELIABLE_MSG, &item.msg, 1);
        }
    }

    /// Pick the next queued item, priority first, and put it in flight.
    fn send_msg_from_queue(&mut self) {
        let index = self
            .next_item_in_queue(true)
            .or_else(|| self.next_item_in_queue(false));
        let Some(index) = index else {
            return;
        };
        let item = self.slots[index].as_ref().unwrap();

        self.reply_mask.reset(item.stone_ids.len() as u8);
        self.process_calls_left =
            item.timeout_or_transmissions as u32 * 1000 / ACKED_RETRY_INTERVAL_MS;
        self.mesh
            .publish(PublishAddress::Group, OPCODE_MULTICAST_RELIABLE_MSG, &item.msg, 1);
        log::debug!(
            "sent acked msg type={:?} targets={} budget={}",
            item.msg_type,
            item.stone_ids.len(),
            self.process_calls_left
        );

        self.index_in_progress = Some(index);
        self.queue_index_next = (index + 1) % QUEUE_SIZE;
    }

    /// Circular scan from `queue_index_next` for a waiting item.
    fn next_item_in_queue(&self, priority: bool) -> Option<usize> {
        for offset in 0..QUEUE_SIZE {
            let index = (self.queue_index_next + offset) % QUEUE_SIZE;
            if Some(index) == self.index_in_progress {
                continue;
            }
            if let Some(item) = &self.slots[index] {
                if !priority || item.priority {
                    return Some(index);
                }
            }
        }
        None
    }

    /// Handle a reply from `src_id` to the in-flight message.
    ///
    /// The reply is a RESULT message whose header names the original type.
    /// Replies that do not match the in-flight item are ignored.
    pub fn handle_reply(&mut self, src_id: StoneId, msg: &[u8]) {
        let Some(index) = self.index_in_progress else {
            return;
        };
        if !is_valid_mesh_message(msg) {
            return;
        }
        if get_type(msg) != Ok(MeshMsgType::Result) {
            return;
        }
        let Ok(header) = ResultHeader::decode(&msg[1..]) else {
            return;
        };
        let Some(item) = self.slots[index].as_ref() else {
            return;
        };
        if header.msg_type != item.msg_type as u8 {
            return;
        }
        if let Some(bit) = item.stone_ids.iter().position(|id| *id == src_id) {
            self.reply_mask.set_bit(bit as u8);
            log::trace!("reply from {} for type={:?}, mask={:#x}", src_id, item.msg_type, self.reply_mask.mask);
        }
    }

    /// Send a reply for a received reliable message back to its source.
    ///
    /// Transmitted several times since a lost reply costs a full retry round.
    pub fn send_reply(&mut self, src_id: StoneId, result: ResultHeader, data: &[u8]) -> Result<(), ErrorCode> {
        let mut payload = result.encode();
        payload.extend_from_slice(data);
        let msg = set_mesh_message(MeshMsgType::Result, &payload)
            .map_err(|_| ErrorCode::WrongPayloadLength)?;
        self.mesh
            .publish(PublishAddress::Stone(src_id), OPCODE_MULTICAST_REPLY, &msg, ACK_TRANSMISSIONS);
        Ok(())
    }
}

impl<M: MeshAccess> MeshQueue for ReliableMulticastQueue<M> {
    /// Admit an item. Unacked items are published right away; reliable items
    /// take a slot and are sent as soon as nothing else is in flight.
    fn add_to_queue(&mut self, item: MeshMsgItem) -> Result<(), ErrorCode> {
        if item.msg.len() > MAX_MESH_MSG_NON_SEGMENTED_SIZE {
            return Err(ErrorCode::WrongPayloadLength);
        }
        if !item.reliable {
            self.mesh.publish(
                PublishAddress::Group,
                OPCODE_MULTICAST_MSG,
                &item.msg,
                item.timeout_or_transmissions,
            );
            return Ok(());
        }
        if item.stone_ids.is_empty() || item.stone_ids.len() > MAX_ACKED_TARGETS {
            return Err(ErrorCode::WrongParameter);
        }

        let mut free = None;
        for offset in 0..QUEUE_SIZE {
            let index = (self.queue_index_next + offset) % QUEUE_SIZE;
            if self.slots[index].is_none() {
                free = Some(index);
                break;
            }
        }
        let Some(index) = free else {
            log::warn!("queue full, dropping msg type={:?}", item.msg_type);
            return Err(ErrorCode::Busy);
        };
        self.slots[index] = Some(item);
        if self.index_in_progress.is_none() {
            self.send_msg_from_queue();
        }
        Ok(())
    }

    /// Remove every queued item matching type and id. Cancels the in-flight
    /// item too.
    fn remove_from_queue(&mut self, msg_type: MeshMsgType, id: u16) -> Result<(), ErrorCode> {
        let mut found = false;
        for index in 0..QUEUE_SIZE {
            let matches = self.slots[index]
                .as_ref()
                .is_some_and(|item| item.msg_type == msg_type && item.id == id);
            if matches {
                self.slots[index] = None;
                if self.index_in_progress == Some(index) {
                    self.index_in_progress = None;
                }
                found = true;
            }
        }
        if found {
            Ok(())
        } else {
            Err(ErrorCode::NotFound)
        }
    }
}
