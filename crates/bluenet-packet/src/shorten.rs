//! Compression of STATE_SET fields into the 3 byte mesh header.
//!
//! State type, state id, persistence mode, access level, and command source
//! are all wider than the bits reserved for them on the mesh. A field can
//! only be put on the mesh when it survives the round trip unchanged.

use bluenet_common::{AccessLevel, CommandSource};

/// Shortened access level for a setup key.
const SHORT_ACCESS_SETUP: u8 = 6;
/// Shortened access level for anything that cannot be shortened.
const SHORT_ACCESS_INVALID: u8 = 7;

/// Shortened source id for a tracked device token.
const SHORT_SOURCE_DEVICE_TOKEN: u8 = 30;
/// Shortened source id for anything that cannot be shortened.
const SHORT_SOURCE_INVALID: u8 = 31;

/// Whether a state type fits the single byte reserved on the mesh.
pub fn can_shorten_state_type(state_type: u16) -> bool {
    state_type < 0xFF
}

/// Whether a state id fits the 6 bits reserved on the mesh.
pub fn can_shorten_state_id(state_id: u16) -> bool {
    state_id < 63
}

/// Whether a persistence mode fits the 2 bits reserved on the mesh.
pub fn can_shorten_persistence_mode(mode: u8) -> bool {
    mode < 3
}

/// Whether an access level survives shortening to 3 bits.
pub fn can_shorten_access_level(level: AccessLevel) -> bool {
    matches!(
        level,
        AccessLevel::Admin | AccessLevel::Member | AccessLevel::Basic | AccessLevel::SetupKey
    )
}

/// Whether a command source survives shortening to 5 bits.
pub fn can_shorten_source(source: CommandSource) -> bool {
    matches!(
        source,
        CommandSource::None
            | CommandSource::Default
            | CommandSource::Internal
            | CommandSource::Uart
            | CommandSource::Connection
            | CommandSource::Switchcraft
            | CommandSource::DeviceToken(_)
    )
}

/// Shorten an access level to its 3 bit mesh representation.
pub fn shortened_access_level(level: AccessLevel) -> u8 {
    match level {
        AccessLevel::Admin => 0,
        AccessLevel::Member => 1,
        AccessLevel::Basic => 2,
        AccessLevel::SetupKey => SHORT_ACCESS_SETUP,
        _ => SHORT_ACCESS_INVALID,
    }
}

/// Inflate a 3 bit mesh access level back to the full enum.
pub fn inflated_access_level(shortened: u8) -> AccessLevel {
    match shortened {
        0 => AccessLevel::Admin,
        1 => AccessLevel::Member,
        2 => AccessLevel::Basic,
        SHORT_ACCESS_SETUP => AccessLevel::SetupKey,
        _ => AccessLevel::NotSet,
    }
}

/// Shorten a command source to its 5 bit mesh representation.
///
/// The device id of a token source does not fit and is dropped.
pub fn shortened_source(source: CommandSource) -> u8 {
    match source {
        CommandSource::None => 0,
        CommandSource::Default => 1,
        CommandSource::Internal => 2,
        CommandSource::Uart => 3,
        CommandSource::Connection => 4,
        CommandSource::Switchcraft => 5,
        CommandSource::DeviceToken(_) => SHORT_SOURCE_DEVICE_TOKEN,
    }
}

/// Inflate a 5 bit mesh source id back to the full enum.
///
/// A device token source comes back with device id 0, since the id
/// was dropped at shortening.
pub fn inflated_source(shortened: u8) -> CommandSource {
    match shortened {
        0 => CommandSource::None,
        1 => CommandSource::Default,
        2 => CommandSource::Internal,
        3 => CommandSource::Uart,
        4 => CommandSource::Connection,
        5 => CommandSource::Switchcraft,
        SHORT_SOURCE_DEVICE_TOKEN => CommandSource::DeviceToken(0),
        _ => CommandSource::None,
    }
}
