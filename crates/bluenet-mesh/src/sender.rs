//! Mesh message sender: per-command reliability policy and supersession.

use bluenet_common::{AccessLevel, CommandSource, ErrorCode, StoneId};
use bluenet_packet::{
    can_shorten_access_level, can_shorten_persistence_mode, can_shorten_source,
    can_shorten_state_id, can_shorten_state_type, set_mesh_message, shortened_access_level,
    shortened_source, BehaviourSettingsPayload, DeviceListSizePayload, DeviceRegisterPayload,
    DeviceTokenPayload, MeshMsgType, MultiSwitchItem, ProfileLocationPayload, StateSetHeader,
    SyncRequestPayload, TestPayload, TimePayload, RELIABILITY_LOW, RELIABILITY_LOWEST,
};

use crate::constants::*;
use crate::queue::{MeshMsgItem, MeshQueue};

/// A generic mesh control command, as received over UART or a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshControlCommand {
    pub command: ControlCommandType,
    /// Target stone ids. Empty means broadcast.
    pub target_ids: Vec<StoneId>,
    /// Timeout in seconds for reliable delivery. 0 means default.
    pub timeout_seconds: u8,
    pub payload: Vec<u8>,
}

/// The control commands that can be put on the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommandType {
    SetTime,
    Noop,
    StateSet(StateSetRequest),
    Unknown(u16),
}

/// A state-set request with the full width fields, shortened on admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSetRequest {
    pub state_type: u16,
    pub state_id: u16,
    pub persistence_mode: u8,
    pub access_level: AccessLevel,
    pub source: CommandSource,
}

/// Applies per-command policy and hands items to the queue.
///
/// Every send replaces a queued message with the same type and dedup id, so
/// a rapid series of commands collapses to the latest one.
pub struct MeshMsgSender<Q: MeshQueue> {
    queue: Q,
}

impl<Q: MeshQueue> MeshMsgSender<Q> {
    pub fn new(queue: Q) -> Self {
        MeshMsgSender { queue }
    }

    /// The underlying queue, for tick dispatch and reply handling.
    pub fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    // ========================================================================
    // Per-kind send operations
    // ========================================================================

    /// Send a test message, single transmission.
    pub fn send_test(&mut self, counter: u32) -> Result<(), ErrorCode> {
        let payload = TestPayload::new(counter).encode();
        self.add_unreliable(MeshMsgType::Test, 0, &payload, RELIABILITY_LOWEST, false)
    }

    /// Command every node to set its clock. Zero is not a valid time.
    pub fn send_set_time(&mut self, timestamp: u32) -> Result<(), ErrorCode> {
        if timestamp == 0 {
            return Err(ErrorCode::WrongParameter);
        }
        let payload = TimePayload { timestamp }.encode();
        self.add_unreliable(MeshMsgType::CmdTime, 0, &payload, RELIABILITY_LOW, true)
    }

    /// Broadcast the current time state.
    pub fn send_time_state(&mut self, timestamp: u32) -> Result<(), ErrorCode> {
        if timestamp == 0 {
            return Err(ErrorCode::WrongParameter);
        }
        let payload = TimePayload { timestamp }.encode();
        self.add_unreliable(MeshMsgType::StateTime, 0, &payload, RELIABILITY_LOWEST, true)
    }

    /// Send a noop, used as a keepalive.
    pub fn send_noop(&mut self) -> Result<(), ErrorCode> {
        self.add_unreliable(MeshMsgType::CmdNoop, 0, &[], RELIABILITY_LOW, false)
    }

    /// Send a multi switch item.
    ///
    /// When the command came from an asker that expects a result (UART or a
    /// BLE connection), the item goes out reliably to its target. Otherwise
    /// it is broadcast.
    pub fn send_multi_switch_item(
        &mut self,
        item: &MultiSwitchItem,
        source: CommandSource,
    ) -> Result<(), ErrorCode> {
        if !item.is_valid() {
            return Err(ErrorCode::WrongParameter);
        }
        let payload = item.encode();
        match source {
            CommandSource::Uart | CommandSource::Connection => self.add_reliable(
                MeshMsgType::CmdMultiSwitch,
                item.id,
                &payload,
                &[item.id],
                0,
                true,
            ),
            _ => self.add_unreliable(
                MeshMsgType::CmdMultiSwitch,
                item.id,
                &payload,
                RELIABILITY_LOW,
                true,
            ),
        }
    }

    /// Broadcast the behaviour settings.
    pub fn send_behaviour_settings(&mut self, settings: &BehaviourSettingsPayload) -> Result<(), ErrorCode> {
        self.add_unreliable(
            MeshMsgType::SetBehaviourSettings,
            0,
            &settings.encode(),
            RELIABILITY_LOWEST,
            false,
        )
    }

    /// Broadcast a profile/location presence event.
    pub fn send_profile_location(&mut self, payload: &ProfileLocationPayload) -> Result<(), ErrorCode> {
        // One queued event per (location, profile) pair.
        let id = ((payload.location as u16) << 8) | payload.profile as u16;
        self.add_unreliable(
            MeshMsgType::ProfileLocation,
            id,
            &payload.encode(),
            RELIABILITY_LOWEST,
            false,
        )
    }

    /// Broadcast a tracked device registration.
    pub fn send_tracked_device_register(&mut self, payload: &DeviceRegisterPayload) -> Result<(), ErrorCode> {
        self.add_unreliable(
            MeshMsgType::TrackedDeviceRegister,
            payload.device_id,
            &payload.encode(),
            RELIABILITY_LOW,
            false,
        )
    }

    /// Broadcast a tracked device token update.
    pub fn send_tracked_device_token(&mut self, payload: &DeviceTokenPayload) -> Result<(), ErrorCode> {
        self.add_unreliable(
            MeshMsgType::TrackedDeviceToken,
            payload.device_id,
            &payload.encode(),
            RELIABILITY_LOW,
            false,
        )
    }

    /// Broadcast the tracked device list size.
    pub fn send_tracked_device_list_size(&mut self, payload: &DeviceListSizePayload) -> Result<(), ErrorCode> {
        self.add_unreliable(
            MeshMsgType::TrackedDeviceListSize,
            0,
            &payload.encode(),
            RELIABILITY_LOW,
            false,
        )
    }

    /// Broadcast a sync request.
    pub fn send_sync_request(&mut self, payload: &SyncRequestPayload) -> Result<(), ErrorCode> {
        self.add_unreliable(
            MeshMsgType::SyncRequest,
            payload.id,
            &payload.encode(),
            RELIABILITY_LOW,
            false,
        )
    }

    // ========================================================================
    // Generic control command path
    // ========================================================================

    /// Handle a mesh control command from an external asker.
    pub fn handle_mesh_command(&mut self, command: &MeshControlCommand) -> Result<(), ErrorCode> {
        match &command.command {
            ControlCommandType::SetTime => {
                if command.payload.len() != TimePayload::WIRE_SIZE {
                    return Err(ErrorCode::WrongPayloadLength);
                }
                let time = TimePayload::decode(&command.payload)
                    .map_err(|_| ErrorCode::WrongPayloadLength)?;
                self.send_set_time(time.timestamp)
            }
            ControlCommandType::Noop => {
                if !command.payload.is_empty() {
                    return Err(ErrorCode::WrongPayloadLength);
                }
                self.send_noop()
            }
            ControlCommandType::StateSet(request) => self.send_state_set(request, command),
            ControlCommandType::Unknown(code) => {
                log::debug!("unsupported mesh control command {}", code);
                Err(ErrorCode::NotImplemented)
            }
        }
    }

    /// Send a state-set to a single target, reliably.
    ///
    /// Every header field must survive the shortened mesh representation,
    /// otherwise the command is rejected before anything is queued.
    fn send_state_set(
        &mut self,
        request: &StateSetRequest,
        command: &MeshControlCommand,
    ) -> Result<(), ErrorCode> {
        if command.target_ids.len() != 1 {
            return Err(ErrorCode::WrongParameter);
        }
        if !can_shorten_state_type(request.state_type)
            || !can_shorten_state_id(request.state_id)
            || !can_shorten_persistence_mode(request.persistence_mode)
            || !can_shorten_access_level(request.access_level)
            || !can_shorten_source(request.source)
        {
            return Err(ErrorCode::WrongParameter);
        }
        let header = StateSetHeader {
            state_type: request.state_type as u8,
            state_id: request.state_id as u8,
            persistence_mode: request.persistence_mode,
            access_level: shortened_access_level(request.access_level),
            source_id: shortened_source(request.source),
        };
        let mut payload = header.encode();
        payload.extend_from_slice(&command.payload);
        let target = command.target_ids[0];
        self.add_reliable(
            MeshMsgType::StateSet,
            target,
            &payload,
            &command.target_ids,
            command.timeout_seconds,
            false,
        )
    }

    // ========================================================================
    // Admission
    // ========================================================================

    fn add_unreliable(
        &mut self,
        msg_type: MeshMsgType,
        id: u16,
        payload: &[u8],
        transmissions: u8,
        priority: bool,
    ) -> Result<(), ErrorCode> {
        let msg = set_mesh_message(msg_type, payload).map_err(|_| ErrorCode::WrongPayloadLength)?;
        let item = MeshMsgItem {
            msg_type,
            id,
            priority,
            reliable: false,
            timeout_or_transmissions: clamp_transmissions(transmissions),
            stone_ids: Vec::new(),
            msg,
        };
        self.replace_in_queue(item)
    }

    fn add_reliable(
        &mut self,
        msg_type: MeshMsgType,
        id: u16,
        payload: &[u8],
        targets: &[StoneId],
        timeout_seconds: u8,
        priority: bool,
    ) -> Result<(), ErrorCode> {
        let msg = set_mesh_message(msg_type, payload).map_err(|_| ErrorCode::WrongPayloadLength)?;
        let item = MeshMsgItem {
            msg_type,
            id,
            priority,
            reliable: true,
            timeout_or_transmissions: clamp_timeout(timeout_seconds),
            stone_ids: targets.to_vec(),
            msg,
        };
        self.replace_in_queue(item)
    }

    /// Supersession: drop any queued message with the same type and id first.
    fn replace_in_queue(&mut self, item: MeshMsgItem) -> Result<(), ErrorCode> {
        let _ = self.queue.remove_from_queue(item.msg_type, item.id);
        self.queue.add_to_queue(item)
    }
}

/// Clamp a reliable timeout to the allowed range, 0 meaning default.
fn clamp_timeout(timeout_seconds: u8) -> u8 {
    if timeout_seconds == 0 {
        return RELIABLE_TIMEOUT_DEFAULT_S;
    }
    timeout_seconds.clamp(RELIABLE_TIMEOUT_MIN_S, RELIABLE_TIMEOUT_MAX_S)
}

/// Clamp a transmission count to the allowed range, 0 meaning default.
fn clamp_transmissions(transmissions: u8) -> u8 {
    if transmissions == 0 {
        return TRANSMISSIONS_DEFAULT;
    }
    transmissions.min(TRANSMISSIONS_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluenet_packet::get_type;

    /// Records admissions and removals.
    #[derive(Default)]
    struct MockQueue {
        added: Vec<MeshMsgItem>,
        removed: Vec<(MeshMsgType, u16)>,
    }

    impl MeshQueue for MockQueue {
        fn add_to_queue(&mut self, item: MeshMsgItem) -> Result<(), ErrorCode> {
            self.added.push(item);
            Ok(())
        }

        fn remove_from_queue(&mut self, msg_type: MeshMsgType, id: u16) -> Result<(), ErrorCode> {
            self.removed.push((msg_type, id));
            Err(ErrorCode::NotFound)
        }
    }

    fn state_set_command(request: StateSetRequest) -> MeshControlCommand {
        MeshControlCommand {
            command: ControlCommandType::StateSet(request),
            target_ids: vec![12],
            timeout_seconds: 0,
            payload: vec![1],
        }
    }

    fn valid_request() -> StateSetRequest {
        StateSetRequest {
            state_type: 0x80,
            state_id: 0,
            persistence_mode: 0,
            access_level: AccessLevel::Admin,
            source: CommandSource::Uart,
        }
    }

    #[test]
    fn test_set_time_rejects_zero() {
        let mut sender = MeshMsgSender::new(MockQueue::default());
        assert_eq!(sender.send_set_time(0), Err(ErrorCode::WrongParameter));
        assert!(sender.queue.added.is_empty());
    }

    #[test]
    fn test_send_removes_before_adding() {
        let mut sender = MeshMsgSender::new(MockQueue::default());
        sender.send_set_time(1234).unwrap();
        assert_eq!(sender.queue.removed, vec![(MeshMsgType::CmdTime, 0)]);
        assert_eq!(sender.queue.added.len(), 1);
        let item = &sender.queue.added[0];
        assert!(item.priority);
        assert!(!item.reliable);
        assert_eq!(get_type(&item.msg), Ok(MeshMsgType::CmdTime));
    }

    #[test]
    fn test_multi_switch_reliable_for_uart_source() {
        let mut sender = MeshMsgSender::new(MockQueue::default());
        let item = MultiSwitchItem { id: 12, switch_cmd: 255, delay: 0, source_id: 3 };

        sender.send_multi_switch_item(&item, CommandSource::Uart).unwrap();
        let queued = &sender.queue.added[0];
        assert!(queued.reliable);
        assert_eq!(queued.stone_ids, vec![12]);
        assert_eq!(queued.timeout_or_transmissions, RELIABLE_TIMEOUT_DEFAULT_S);

        sender.send_multi_switch_item(&item, CommandSource::Switchcraft).unwrap();
        let queued = &sender.queue.added[1];
        assert!(!queued.reliable);
        assert!(queued.stone_ids.is_empty());
    }

    #[test]
    fn test_multi_switch_rejects_invalid_item() {
        let mut sender = MeshMsgSender::new(MockQueue::default());
        let item = MultiSwitchItem { id: 0, switch_cmd: 255, delay: 0, source_id: 3 };
        assert_eq!(
            sender.send_multi_switch_item(&item, CommandSource::Internal),
            Err(ErrorCode::WrongParameter)
        );
    }

    #[test]
    fn test_timeout_clamping() {
        assert_eq!(clamp_timeout(0), RELIABLE_TIMEOUT_DEFAULT_S);
        assert_eq!(clamp_timeout(1), RELIABLE_TIMEOUT_MIN_S);
        assert_eq!(clamp_timeout(200), RELIABLE_TIMEOUT_MAX_S);
        assert_eq!(clamp_timeout(30), 30);
    }

    #[test]
    fn test_transmission_clamping() {
        assert_eq!(clamp_transmissions(0), TRANSMISSIONS_DEFAULT);
        assert_eq!(clamp_transmissions(50), TRANSMISSIONS_MAX);
        assert_eq!(clamp_transmissions(5), 5);
    }

    #[test]
    fn test_state_set_shortening_rejections() {
        let mut sender = MeshMsgSender::new(MockQueue::default());

        let mut request = valid_request();
        request.state_type = 0xFF;
        assert_eq!(
            sender.handle_mesh_command(&state_set_command(request)),
            Err(ErrorCode::WrongParameter)
        );

        let mut request = valid_request();
        request.state_id = 63;
        assert_eq!(
            sender.handle_mesh_command(&state_set_command(request)),
            Err(ErrorCode::WrongParameter)
        );

        let mut request = valid_request();
        request.persistence_mode = 3;
        assert_eq!(
            sender.handle_mesh_command(&state_set_command(request)),
            Err(ErrorCode::WrongParameter)
        );

        let mut request = valid_request();
        request.access_level = AccessLevel::ServiceData;
        assert_eq!(
            sender.handle_mesh_command(&state_set_command(request)),
            Err(ErrorCode::WrongParameter)
        );

        assert!(sender.queue.added.is_empty());
    }

    #[test]
    fn test_state_set_requires_single_target() {
        let mut sender = MeshMsgSender::new(MockQueue::default());
        let mut command = state_set_command(valid_request());
        command.target_ids = vec![1, 2];
        assert_eq!(
            sender.handle_mesh_command(&command),
            Err(ErrorCode::WrongParameter)
        );
    }

    #[test]
    fn test_state_set_queued_reliably() {
        let mut sender = MeshMsgSender::new(MockQueue::default());
        sender
            .handle_mesh_command(&state_set_command(valid_request()))
            .unwrap();
        let queued = &sender.queue.added[0];
        assert!(queued.reliable);
        assert_eq!(queued.stone_ids, vec![12]);
        assert_eq!(get_type(&queued.msg), Ok(MeshMsgType::StateSet));
    }

    #[test]
    fn test_noop_payload_must_be_empty() {
        let mut sender = MeshMsgSender::new(MockQueue::default());
        let command = MeshControlCommand {
            command: ControlCommandType::Noop,
            target_ids: Vec::new(),
            timeout_seconds: 0,
            payload: vec![1],
        };
        assert_eq!(
            sender.handle_mesh_command(&command),
            Err(ErrorCode::WrongPayloadLength)
        );
    }

    #[test]
    fn test_set_time_payload_must_be_four_bytes() {
        let mut sender = MeshMsgSender::new(MockQueue::default());
        let command = MeshControlCommand {
            command: ControlCommandType::SetTime,
            target_ids: Vec::new(),
            timeout_seconds: 0,
            payload: vec![1, 2, 3],
        };
        assert_eq!(
            sender.handle_mesh_command(&command),
            Err(ErrorCode::WrongPayloadLength)
        );
    }

    #[test]
    fn test_unknown_command_not_implemented() {
        let mut sender = MeshMsgSender::new(MockQueue::default());
        let command = MeshControlCommand {
            command: ControlCommandType::Unknown(0x99),
            target_ids: Vec::new(),
            timeout_seconds: 0,
            payload: Vec::new(),
        };
        assert_eq!(
            sender.handle_mesh_command(&command),
            Err(ErrorCode::NotImplemented)
        );
    }
}
