//! Mesh message payload types.
//!
//! Each struct maps one-to-one to a wire payload. All multi-byte fields are
//! little-endian. `WIRE_SIZE` is the exact encoded size; header-prefixed
//! payloads (STATE_SET, RESULT) carry trailing data beyond their header.

use bluenet_common::StoneId;

use crate::PacketError;

/// Test message payload: counter plus recognizable filler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestPayload {
    /// Sequence counter, incremented per test message.
    pub counter: u32,
    /// Filler bytes, set to 0, 1, 2, ...
    pub dummy: [u8; 8],
}

impl TestPayload {
    /// Exact encoded size in bytes.
    pub const WIRE_SIZE: usize = 12;

    /// Create a test payload with the standard filler pattern.
    pub fn new(counter: u32) -> Self {
        let mut dummy = [0u8; 8];
        for (i, b) in dummy.iter_mut().enumerate() {
            *b = i as u8;
        }
        TestPayload { counter, dummy }
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        buf.extend_from_slice(&self.counter.to_le_bytes());
        buf.extend_from_slice(&self.dummy);
        buf
    }

    /// Decode from wire bytes.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != Self::WIRE_SIZE {
            return Err(PacketError::WrongPayloadSize {
                msg_type: crate::MeshMsgType::Test,
                actual: data.len(),
            });
        }
        let counter = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let mut dummy = [0u8; 8];
        dummy.copy_from_slice(&data[4..12]);
        Ok(TestPayload { counter, dummy })
    }
}

/// Time payload, used for both the time state and the set-time command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePayload {
    /// Posix timestamp in seconds. Zero is invalid.
    pub timestamp: u32,
}

impl TimePayload {
    pub const WIRE_SIZE: usize = 4;

    pub fn encode(&self) -> Vec<u8> {
        self.timestamp.to_le_bytes().to_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != Self::WIRE_SIZE {
            return Err(PacketError::WrongPayloadSize {
                msg_type: crate::MeshMsgType::CmdTime,
                actual: data.len(),
            });
        }
        Ok(TimePayload {
            timestamp: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        })
    }
}

/// Multi-switch item: switch one stone, optionally delayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiSwitchItem {
    /// Target stone id. Zero is invalid for a switch item.
    pub id: StoneId,
    /// Switch command value: 0..=100 dim percent, 255 = fully on.
    pub switch_cmd: u8,
    /// Delay before applying, in seconds.
    pub delay: u16,
    /// Shortened source id of the command (see [`crate::shortened_source`]).
    pub source_id: u8,
}

impl MultiSwitchItem {
    pub const WIRE_SIZE: usize = 6;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.push(self.switch_cmd);
        buf.extend_from_slice(&self.delay.to_le_bytes());
        buf.push(self.source_id);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != Self::WIRE_SIZE {
            return Err(PacketError::WrongPayloadSize {
                msg_type: crate::MeshMsgType::CmdMultiSwitch,
                actual: data.len(),
            });
        }
        Ok(MultiSwitchItem {
            id: u16::from_le_bytes([data[0], data[1]]),
            switch_cmd: data[2],
            delay: u16::from_le_bytes([data[3], data[4]]),
            source_id: data[5],
        })
    }

    /// A switch item is valid when it has a real target and a known command.
    pub fn is_valid(&self) -> bool {
        self.id != 0 && (self.switch_cmd <= 100 || self.switch_cmd == 255)
    }
}

/// State part 0: switch state and power.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State0Payload {
    /// Current switch state (dim value / relay bit).
    pub switch_state: u8,
    /// Error and state flags.
    pub flags: u8,
    /// Power factor, fixed point.
    pub power_factor: i8,
    /// Real power usage in units of 1/8 W.
    pub power_usage_real: i16,
    /// Partial timestamp for ordering.
    pub partial_timestamp: u16,
}

impl State0Payload {
    pub const WIRE_SIZE: usize = 7;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        buf.push(self.switch_state);
        buf.push(self.flags);
        buf.push(self.power_factor as u8);
        buf.extend_from_slice(&self.power_usage_real.to_le_bytes());
        buf.extend_from_slice(&self.partial_timestamp.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != Self::WIRE_SIZE {
            return Err(PacketError::WrongPayloadSize {
                msg_type: crate::MeshMsgType::State0,
                actual: data.len(),
            });
        }
        Ok(State0Payload {
            switch_state: data[0],
            flags: data[1],
            power_factor: data[2] as i8,
            power_usage_real: i16::from_le_bytes([data[3], data[4]]),
            partial_timestamp: u16::from_le_bytes([data[5], data[6]]),
        })
    }
}

/// State part 1: temperature and energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State1Payload {
    /// Chip temperature in degrees Celsius.
    pub temperature: i8,
    /// Energy used, in units of 64 J.
    pub energy_used: i32,
    /// Partial timestamp for ordering.
    pub partial_timestamp: u16,
}

impl State1Payload {
    pub const WIRE_SIZE: usize = 7;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        buf.push(self.temperature as u8);
        buf.extend_from_slice(&self.energy_used.to_le_bytes());
        buf.extend_from_slice(&self.partial_timestamp.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != Self::WIRE_SIZE {
            return Err(PacketError::WrongPayloadSize {
                msg_type: crate::MeshMsgType::State1,
                actual: data.len(),
            });
        }
        Ok(State1Payload {
            temperature: data[0] as i8,
            energy_used: i32::from_le_bytes([data[1], data[2], data[3], data[4]]),
            partial_timestamp: u16::from_le_bytes([data[5], data[6]]),
        })
    }
}

/// Profile/location event for presence tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileLocationPayload {
    /// Profile id of the person or group.
    pub profile: u8,
    /// Location id within the sphere.
    pub location: u8,
}

impl ProfileLocationPayload {
    pub const WIRE_SIZE: usize = 2;

    pub fn encode(&self) -> Vec<u8> {
        vec![self.profile, self.location]
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != Self::WIRE_SIZE {
            return Err(PacketError::WrongPayloadSize {
                msg_type: crate::MeshMsgType::ProfileLocation,
                actual: data.len(),
            });
        }
        Ok(ProfileLocationPayload {
            profile: data[0],
            location: data[1],
        })
    }
}

/// Behaviour settings broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BehaviourSettingsPayload {
    /// Settings flags; bit 0 = behaviour enabled.
    pub flags: u32,
}

impl BehaviourSettingsPayload {
    pub const WIRE_SIZE: usize = 4;

    pub fn encode(&self) -> Vec<u8> {
        self.flags.to_le_bytes().to_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != Self::WIRE_SIZE {
            return Err(PacketError::WrongPayloadSize {
                msg_type: crate::MeshMsgType::SetBehaviourSettings,
                actual: data.len(),
            });
        }
        Ok(BehaviourSettingsPayload {
            flags: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        })
    }
}

/// Register a tracked device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRegisterPayload {
    /// Tracked device id.
    pub device_id: u16,
    /// Location the device was registered at.
    pub location_id: u8,
    /// Profile of the device owner.
    pub profile_id: u8,
    /// RSSI calibration offset.
    pub rssi_offset: i8,
    /// Device flags.
    pub flags: u8,
    /// Access level granted to the device.
    pub access_level: u8,
}

impl DeviceRegisterPayload {
    pub const WIRE_SIZE: usize = 7;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        buf.extend_from_slice(&self.device_id.to_le_bytes());
        buf.push(self.location_id);
        buf.push(self.profile_id);
        buf.push(self.rssi_offset as u8);
        buf.push(self.flags);
        buf.push(self.access_level);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != Self::WIRE_SIZE {
            return Err(PacketError::WrongPayloadSize {
                msg_type: crate::MeshMsgType::TrackedDeviceRegister,
                actual: data.len(),
            });
        }
        Ok(DeviceRegisterPayload {
            device_id: u16::from_le_bytes([data[0], data[1]]),
            location_id: data[2],
            profile_id: data[3],
            rssi_offset: data[4] as i8,
            flags: data[5],
            access_level: data[6],
        })
    }
}

/// Update the token of a tracked device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTokenPayload {
    /// Tracked device id.
    pub device_id: u16,
    /// Rolling device token.
    pub device_token: [u8; 3],
    /// Token time to live, in minutes.
    pub ttl_minutes: u16,
}

impl DeviceTokenPayload {
    pub const WIRE_SIZE: usize = 7;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        buf.extend_from_slice(&self.device_id.to_le_bytes());
        buf.extend_from_slice(&self.device_token);
        buf.extend_from_slice(&self.ttl_minutes.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != Self::WIRE_SIZE {
            return Err(PacketError::WrongPayloadSize {
                msg_type: crate::MeshMsgType::TrackedDeviceToken,
                actual: data.len(),
            });
        }
        let mut device_token = [0u8; 3];
        device_token.copy_from_slice(&data[2..5]);
        Ok(DeviceTokenPayload {
            device_id: u16::from_le_bytes([data[0], data[1]]),
            device_token,
            ttl_minutes: u16::from_le_bytes([data[5], data[6]]),
        })
    }
}

/// Broadcast of the tracked device list size, for sync checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceListSizePayload {
    /// Number of tracked devices on this node.
    pub list_size: u8,
}

impl DeviceListSizePayload {
    pub const WIRE_SIZE: usize = 1;

    pub fn encode(&self) -> Vec<u8> {
        vec![self.list_size]
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != Self::WIRE_SIZE {
            return Err(PacketError::WrongPayloadSize {
                msg_type: crate::MeshMsgType::TrackedDeviceListSize,
                actual: data.len(),
            });
        }
        Ok(DeviceListSizePayload { list_size: data[0] })
    }
}

/// Request missing state from the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRequestPayload {
    /// Id of the requesting stone.
    pub id: StoneId,
    /// Bitmask of the things that need syncing.
    pub bitmask: u32,
}

impl SyncRequestPayload {
    pub const WIRE_SIZE: usize = 6;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.bitmask.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != Self::WIRE_SIZE {
            return Err(PacketError::WrongPayloadSize {
                msg_type: crate::MeshMsgType::SyncRequest,
                actual: data.len(),
            });
        }
        Ok(SyncRequestPayload {
            id: u16::from_le_bytes([data[0], data[1]]),
            bitmask: u32::from_le_bytes([data[2], data[3], data[4], data[5]]),
        })
    }
}

/// Shortened header of a STATE_SET message.
///
/// Wire layout (3 bytes):
/// - byte 0: shortened state type
/// - byte 1: state id (6 bits) | persistence mode (2 bits)
/// - byte 2: access level (3 bits) | source id (5 bits)
///
/// The trailing state payload follows the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSetHeader {
    /// Shortened state type (must fit u8, see [`crate::can_shorten_state_type`]).
    pub state_type: u8,
    /// State id, 6 bits.
    pub state_id: u8,
    /// Persistence mode, 2 bits.
    pub persistence_mode: u8,
    /// Shortened access level, 3 bits.
    pub access_level: u8,
    /// Shortened source id, 5 bits.
    pub source_id: u8,
}

impl StateSetHeader {
    pub const WIRE_SIZE: usize = 3;

    pub fn encode(&self) -> Vec<u8> {
        vec![
            self.state_type,
            (self.state_id & 0x3F) | ((self.persistence_mode & 0x03) << 6),
            (self.access_level & 0x07) | ((self.source_id & 0x1F) << 3),
        ]
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::WIRE_SIZE {
            return Err(PacketError::WrongPayloadSize {
                msg_type: crate::MeshMsgType::StateSet,
                actual: data.len(),
            });
        }
        Ok(StateSetHeader {
            state_type: data[0],
            state_id: data[1] & 0x3F,
            persistence_mode: (data[1] >> 6) & 0x03,
            access_level: data[2] & 0x07,
            source_id: (data[2] >> 3) & 0x1F,
        })
    }
}

/// Header of a RESULT message, sent as reply on the acked model.
///
/// The trailing result data follows the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultHeader {
    /// Type code of the message this result is for.
    pub msg_type: u8,
    /// Shortened return code.
    pub ret_code: u8,
}

impl ResultHeader {
    pub const WIRE_SIZE: usize = 2;

    pub fn encode(&self) -> Vec<u8> {
        vec![self.msg_type, self.ret_code]
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::WIRE_SIZE {
            return Err(PacketError::WrongPayloadSize {
                msg_type: crate::MeshMsgType::Result,
                actual: data.len(),
            });
        }
        Ok(ResultHeader {
            msg_type: data[0],
            ret_code: data[1],
        })
    }
}
