//! Tracks discovery of the Nordic secure DFU service on a connected target.

use bluenet_common::{DiscoveredAttribute, Event, Uuid, INVALID_HANDLE};

use crate::constants::*;

/// Discovery state of the DFU service and its two characteristics.
///
/// Fed with discovery events while connected to the (suspected) DFU target.
/// After discovery completes this answers the one question the host cares
/// about: is the peer actually running the DFU bootloader?
pub struct MeshDfuTransport {
    initialized: bool,
    service_uuid: Uuid,
    control_point_uuid: Uuid,
    data_point_uuid: Uuid,
    control_point_handle: u16,
    data_point_handle: u16,
    service_found: bool,
    discovery_complete: bool,
}

impl Default for MeshDfuTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshDfuTransport {
    pub fn new() -> Self {
        let base = Uuid::from_full(DFU_BASE_UUID);
        MeshDfuTransport {
            initialized: false,
            service_uuid: dfu_service_uuid(),
            control_point_uuid: Uuid::from_base(&base, DFU_CONTROL_POINT_UUID_SHORT),
            data_point_uuid: Uuid::from_base(&base, DFU_DATA_POINT_UUID_SHORT),
            control_point_handle: INVALID_HANDLE,
            data_point_handle: INVALID_HANDLE,
            service_found: false,
            discovery_complete: false,
        }
    }

    /// Prepare for use. Idempotent, later calls are no-ops.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        self.clear_discovery();
    }

    /// The service UUIDs to pass to the central's discovery.
    pub fn service_uuids(&self) -> [Uuid; 1] {
        [self.service_uuid]
    }

    /// Whether the connected peer exposes a complete DFU service.
    ///
    /// True only when the service was seen and both characteristic handles
    /// were resolved.
    pub fn is_target_in_dfu_mode(&self) -> bool {
        self.service_found
            && self.control_point_handle != INVALID_HANDLE
            && self.data_point_handle != INVALID_HANDLE
    }

    /// Value handle of the DFU control point, if discovered.
    pub fn control_point_handle(&self) -> Option<u16> {
        (self.control_point_handle != INVALID_HANDLE).then_some(self.control_point_handle)
    }

    /// Value handle of the DFU data point, if discovered.
    pub fn data_point_handle(&self) -> Option<u16> {
        (self.data_point_handle != INVALID_HANDLE).then_some(self.data_point_handle)
    }

    pub fn handle_event(&mut self, event: &Event) {
        match event {
            Event::BleCentralDiscovery(attribute) => self.on_discover(attribute),
            Event::BleCentralDiscoveryResult(_) => {
                self.discovery_complete = true;
            }
            Event::BleCentralDisconnected => self.clear_discovery(),
            _ => {}
        }
    }

    /// Record one discovered attribute.
    ///
    /// Results arriving after discovery already completed belong to a new
    /// discovery round, so the old state is cleared first.
    fn on_discover(&mut self, attribute: &DiscoveredAttribute) {
        if self.discovery_complete {
            tracing::debug!("discovery result after completion, clearing stale state");
            self.clear_discovery();
        }
        if attribute.uuid == self.service_uuid {
            self.service_found = true;
        } else if attribute.uuid == self.control_point_uuid {
            self.control_point_handle = attribute.value_handle;
        } else if attribute.uuid == self.data_point_uuid {
            self.data_point_handle = attribute.value_handle;
        }
    }

    fn clear_discovery(&mut self) {
        self.control_point_handle = INVALID_HANDLE;
        self.data_point_handle = INVALID_HANDLE;
        self.service_found = false;
        self.discovery_complete = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discover_all(transport: &mut MeshDfuTransport) {
        let base = Uuid::from_full(DFU_BASE_UUID);
        transport.handle_event(&Event::BleCentralDiscovery(DiscoveredAttribute {
            uuid: dfu_service_uuid(),
            value_handle: INVALID_HANDLE,
        }));
        transport.handle_event(&Event::BleCentralDiscovery(DiscoveredAttribute {
            uuid: Uuid::from_base(&base, DFU_CONTROL_POINT_UUID_SHORT),
            value_handle: 0x0010,
        }));
        transport.handle_event(&Event::BleCentralDiscovery(DiscoveredAttribute {
            uuid: Uuid::from_base(&base, DFU_DATA_POINT_UUID_SHORT),
            value_handle: 0x0012,
        }));
        transport.handle_event(&Event::BleCentralDiscoveryResult(Ok(())));
    }

    #[test]
    fn test_dfu_mode_requires_service_and_both_handles() {
        let mut transport = MeshDfuTransport::new();
        transport.init();
        assert!(!transport.is_target_in_dfu_mode());

        // Service plus control point only is not enough.
        let base = Uuid::from_full(DFU_BASE_UUID);
        transport.handle_event(&Event::BleCentralDiscovery(DiscoveredAttribute {
            uuid: dfu_service_uuid(),
            value_handle: INVALID_HANDLE,
        }));
        transport.handle_event(&Event::BleCentralDiscovery(DiscoveredAttribute {
            uuid: Uuid::from_base(&base, DFU_CONTROL_POINT_UUID_SHORT),
            value_handle: 0x0010,
        }));
        assert!(!transport.is_target_in_dfu_mode());

        transport.handle_event(&Event::BleCentralDiscovery(DiscoveredAttribute {
            uuid: Uuid::from_base(&base, DFU_DATA_POINT_UUID_SHORT),
            value_handle: 0x0012,
        }));
        assert!(transport.is_target_in_dfu_mode());
        assert_eq!(transport.control_point_handle(), Some(0x0010));
        assert_eq!(transport.data_point_handle(), Some(0x0012));
    }

    #[test]
    fn test_unrelated_attributes_ignored() {
        let mut transport = MeshDfuTransport::new();
        transport.init();
        transport.handle_event(&Event::BleCentralDiscovery(DiscoveredAttribute {
            uuid: Uuid::from_short(0x180F),
            value_handle: 0x0020,
        }));
        assert!(!transport.is_target_in_dfu_mode());
    }

    #[test]
    fn test_disconnect_clears_discovery() {
        let mut transport = MeshDfuTransport::new();
        transport.init();
        discover_all(&mut transport);
        assert!(transport.is_target_in_dfu_mode());

        transport.handle_event(&Event::BleCentralDisconnected);
        assert!(!transport.is_target_in_dfu_mode());
        assert_eq!(transport.control_point_handle(), None);
    }

    #[test]
    fn test_discovery_after_completion_starts_fresh() {
        let mut transport = MeshDfuTransport::new();
        transport.init();
        discover_all(&mut transport);

        // A stray attribute after completion belongs to a new round.
        transport.handle_event(&Event::BleCentralDiscovery(DiscoveredAttribute {
            uuid: Uuid::from_short(0x180F),
            value_handle: 0x0030,
        }));
        assert!(!transport.is_target_in_dfu_mode());
    }

    #[test]
    fn test_init_idempotent() {
        let mut transport = MeshDfuTransport::new();
        transport.init();
        discover_all(&mut transport);
        transport.init();
        assert!(transport.is_target_in_dfu_mode());
    }
}
