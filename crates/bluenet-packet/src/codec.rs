//! Mesh message header codec and payload size validation.

use crate::constants::*;
use crate::types::*;
use crate::PacketError;

/// Type code of a mesh message, the first byte of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MeshMsgType {
    Test = MESH_TYPE_TEST,
    Ack = MESH_TYPE_ACK,
    StateTime = MESH_TYPE_STATE_TIME,
    CmdTime = MESH_TYPE_CMD_TIME,
    CmdNoop = MESH_TYPE_CMD_NOOP,
    CmdMultiSwitch = MESH_TYPE_CMD_MULTI_SWITCH,
    State0 = MESH_TYPE_STATE_0,
    State1 = MESH_TYPE_STATE_1,
    ProfileLocation = MESH_TYPE_PROFILE_LOCATION,
    SetBehaviourSettings = MESH_TYPE_SET_BEHAVIOUR_SETTINGS,
    TrackedDeviceRegister = MESH_TYPE_TRACKED_DEVICE_REGISTER,
    TrackedDeviceToken = MESH_TYPE_TRACKED_DEVICE_TOKEN,
    SyncRequest = MESH_TYPE_SYNC_REQUEST,
    TrackedDeviceListSize = MESH_TYPE_TRACKED_DEVICE_LIST_SIZE,
    StateSet = MESH_TYPE_STATE_SET,
    Result = MESH_TYPE_RESULT,
}

impl TryFrom<u8> for MeshMsgType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, PacketError> {
        match value {
            MESH_TYPE_TEST => Ok(MeshMsgType::Test),
            MESH_TYPE_ACK => Ok(MeshMsgType::Ack),
            MESH_TYPE_STATE_TIME => Ok(MeshMsgType::StateTime),
            MESH_TYPE_CMD_TIME => Ok(MeshMsgType::CmdTime),
            MESH_TYPE_CMD_NOOP => Ok(MeshMsgType::CmdNoop),
            MESH_TYPE_CMD_MULTI_SWITCH => Ok(MeshMsgType::CmdMultiSwitch),
            MESH_TYPE_STATE_0 => Ok(MeshMsgType::State0),
            MESH_TYPE_STATE_1 => Ok(MeshMsgType::State1),
            MESH_TYPE_PROFILE_LOCATION => Ok(MeshMsgType::ProfileLocation),
            MESH_TYPE_SET_BEHAVIOUR_SETTINGS => Ok(MeshMsgType::SetBehaviourSettings),
            MESH_TYPE_TRACKED_DEVICE_REGISTER => Ok(MeshMsgType::TrackedDeviceRegister),
            MESH_TYPE_TRACKED_DEVICE_TOKEN => Ok(MeshMsgType::TrackedDeviceToken),
            MESH_TYPE_SYNC_REQUEST => Ok(MeshMsgType::SyncRequest),
            MESH_TYPE_TRACKED_DEVICE_LIST_SIZE => Ok(MeshMsgType::TrackedDeviceListSize),
            MESH_TYPE_STATE_SET => Ok(MeshMsgType::StateSet),
            MESH_TYPE_RESULT => Ok(MeshMsgType::Result),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

/// Build a mesh message: type byte followed by the payload.
///
/// Fails when the payload does not fit in a non-segmented message.
pub fn set_mesh_message(msg_type: MeshMsgType, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    let total = MESH_HEADER_SIZE + payload.len();
    if total > MAX_MESH_MSG_NON_SEGMENTED_SIZE {
        return Err(PacketError::MessageTooLong {
            max: MAX_MESH_MSG_NON_SEGMENTED_SIZE,
            actual: total,
        });
    }
    let mut msg = Vec::with_capacity(total);
    msg.push(msg_type as u8);
    msg.extend_from_slice(payload);
    Ok(msg)
}

/// Read the type byte of a mesh message.
pub fn get_type(msg: &[u8]) -> Result<MeshMsgType, PacketError> {
    if msg.is_empty() {
        return Err(PacketError::MessageTooShort {
            expected: MESH_HEADER_SIZE,
            actual: 0,
        });
    }
    MeshMsgType::try_from(msg[0])
}

/// Slice off the payload of a mesh message.
pub fn get_payload(msg: &[u8]) -> Result<&[u8], PacketError> {
    if msg.is_empty() {
        return Err(PacketError::MessageTooShort {
            expected: MESH_HEADER_SIZE,
            actual: 0,
        });
    }
    Ok(&msg[MESH_HEADER_SIZE..])
}

/// Check whether the payload size is valid for the given type.
///
/// Header-prefixed types accept any trailing data after their header.
pub fn is_valid_payload(msg_type: MeshMsgType, payload: &[u8]) -> bool {
    let size = payload.len();
    match msg_type {
        MeshMsgType::Test => size == TestPayload::WIRE_SIZE,
        MeshMsgType::Ack => size == 0,
        MeshMsgType::StateTime => size == TimePayload::WIRE_SIZE,
        MeshMsgType::CmdTime => size == TimePayload::WIRE_SIZE,
        MeshMsgType::CmdNoop => size == 0,
        MeshMsgType::CmdMultiSwitch => size == MultiSwitchItem::WIRE_SIZE,
        MeshMsgType::State0 => size == State0Payload::WIRE_SIZE,
        MeshMsgType::State1 => size == State1Payload::WIRE_SIZE,
        MeshMsgType::ProfileLocation => size == ProfileLocationPayload::WIRE_SIZE,
        MeshMsgType::SetBehaviourSettings => size == BehaviourSettingsPayload::WIRE_SIZE,
        MeshMsgType::TrackedDeviceRegister => size == DeviceRegisterPayload::WIRE_SIZE,
        MeshMsgType::TrackedDeviceToken => size == DeviceTokenPayload::WIRE_SIZE,
        MeshMsgType::SyncRequest => size == SyncRequestPayload::WIRE_SIZE,
        MeshMsgType::TrackedDeviceListSize => size == DeviceListSizePayload::WIRE_SIZE,
        MeshMsgType::StateSet => size >= StateSetHeader::WIRE_SIZE,
        MeshMsgType::Result => size >= ResultHeader::WIRE_SIZE,
    }
}

/// Check a full mesh message: known type and valid payload size.
pub fn is_valid_mesh_message(msg: &[u8]) -> bool {
    let Ok(msg_type) = get_type(msg) else {
        return false;
    };
    is_valid_payload(msg_type, &msg[MESH_HEADER_SIZE..])
}
