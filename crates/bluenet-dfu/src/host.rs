//! The DFU host: phased orchestration of a firmware handover.

use bluenet_common::{
    ConnectStatus, DeviceAddress, ErrorCode, Event, EventKind, TICK_INTERVAL_MS,
};

use crate::constants::*;
use crate::transport::MeshDfuTransport;

/// Crownstone-protocol central: an encrypted control connection to a node
/// running the application firmware.
pub trait CrownstoneCentral {
    /// Start connecting. Results arrive as `CsCentralConnectResult` events.
    fn connect(&mut self, address: &DeviceAddress, timeout_ms: u32) -> ConnectStatus;
    /// Write a control command over the established connection.
    fn write_control_command(&mut self, command: ControlCommand) -> Result<(), ErrorCode>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
}

/// Raw BLE central: an unencrypted GATT connection, used to talk to the
/// bootloader which knows no Crownstone protocol.
pub trait BleCentral {
    /// Start connecting. Results arrive as `BleCentralConnectResult` events.
    fn connect(&mut self, address: &DeviceAddress, timeout_ms: u32) -> ConnectStatus;
    /// Start service discovery. Attributes and the final result arrive as
    /// `BleCentralDiscovery` / `BleCentralDiscoveryResult` events.
    fn discover_services(&mut self, uuids: &[bluenet_common::Uuid]) -> Result<(), ErrorCode>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
}

/// Control commands written over the Crownstone central.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Tell the target to reboot into its DFU bootloader.
    GotoDfu,
}

/// The phases of a DFU run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuPhase {
    /// Nothing going on, ready to start.
    Idle,
    /// Connected to the running firmware, commanding it into DFU mode.
    TargetTriggerDfuMode,
    /// Waiting for the rebooted target and connecting to its bootloader.
    ConnectTargetInDfuMode,
    /// Discovering the DFU service on the connected bootloader.
    DiscoverDfuCharacteristics,
    /// Transfer phases, not implemented yet.
    TargetPreparing,
    TargetInitializing,
    TargetUpdating,
    TargetVerifying,
    /// Tearing down connections after a failure.
    Aborting,
    /// Unrecoverable. The host stays here until reboot.
    None,
}

/// What to do when the expected event arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    SendDfuCommand,
    VerifyDisconnectAfterDfu,
    ConnectScannedTarget,
    CheckDfuTargetConnected,
    CheckDiscoveryResult,
}

/// What to do when the armed timeout expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutAction {
    RestartPhase,
    Abort,
    ConnectTarget,
    CompletePhase,
}

/// Debug seam: start a DFU run automatically after a number of ticks.
#[derive(Debug, Clone, Copy)]
pub struct AutoStart {
    pub ticks: u32,
    pub address: DeviceAddress,
}

/// Orchestrates one DFU run against a neighbouring node.
///
/// Owns both central seams and the transport. Drives itself purely off
/// dispatched events; at any moment at most one event registration and one
/// timeout are armed. Arming either while one is armed replaces it and
/// reports the displacement, which phase code treats as a logic error worth
/// logging but not stopping for.
pub struct MeshDfuHost<C: CrownstoneCentral, B: BleCentral> {
    cs_central: C,
    ble_central: B,
    transport: MeshDfuTransport,
    phase: DfuPhase,
    /// Override of the natural next phase, consumed by `complete_phase`.
    phase_on_complete: Option<DfuPhase>,
    expected_event: Option<(EventKind, EventAction)>,
    /// Armed timeout and the ticks left until it fires.
    timeout: Option<(TimeoutAction, u32)>,
    reconnection_attempts_left: u8,
    /// Whether the init packet of the firmware to hand over is present.
    init_packet_available: bool,
    target_address: Option<DeviceAddress>,
    cs_central_connected: bool,
    ble_central_connected: bool,
    auto_start: Option<AutoStart>,
}

impl<C: CrownstoneCentral, B: BleCentral> MeshDfuHost<C, B> {
    pub fn new(cs_central: C, ble_central: B) -> Self {
        let mut transport = MeshDfuTransport::new();
        transport.init();
        MeshDfuHost {
            cs_central,
            ble_central,
            transport,
            phase: DfuPhase::Idle,
            phase_on_complete: None,
            expected_event: None,
            timeout: None,
            reconnection_attempts_left: MAX_RECONNECTION_ATTEMPTS,
            init_packet_available: false,
            target_address: None,
            cs_central_connected: false,
            ble_central_connected: false,
            auto_start: None,
        }
    }

    /// Arm the debug auto-start: after `ticks` ticks a DFU run starts
    /// against the given address.
    pub fn set_auto_start(&mut self, auto_start: AutoStart) {
        self.auto_start = Some(auto_start);
    }

    pub fn phase(&self) -> DfuPhase {
        self.phase
    }

    pub fn transport(&self) -> &MeshDfuTransport {
        &self.transport
    }

    /// Mark the init packet of the firmware to hand over as (un)available.
    pub fn set_init_packet_available(&mut self, available: bool) {
        self.init_packet_available = available;
    }

    /// Start a DFU run against the node at `address`.
    pub fn start_dfu(&mut self, address: DeviceAddress) -> Result<(), ErrorCode> {
        if !self.init_packet_available {
            tracing::warn!("dfu start refused, no init packet");
            return Err(ErrorCode::NotAvailable);
        }
        if self.phase != DfuPhase::Idle {
            tracing::warn!(phase = ?self.phase, "dfu start refused, not idle");
            return Err(ErrorCode::WrongState);
        }
        self.target_address = Some(address);
        self.start_phase(DfuPhase::TargetTriggerDfuMode);
        Ok(())
    }

    /// Abort the current run and tear everything down.
    pub fn abort(&mut self) {
        self.start_phase(DfuPhase::Aborting);
    }

    // ========================================================================
    // Event dispatch
    // ========================================================================

    pub fn handle_event(&mut self, event: &Event) {
        // Connection bookkeeping happens before any phase logic runs, so
        // actions observe the up-to-date link state.
        match event {
            Event::CsCentralConnectResult(result) => {
                self.cs_central_connected = result.is_ok();
            }
            Event::BleCentralConnectResult(result) => {
                self.ble_central_connected = result.is_ok();
            }
            Event::BleCentralDisconnected => {
                self.cs_central_connected = false;
                self.ble_central_connected = false;
            }
            _ => {}
        }
        self.transport.handle_event(event);

        if let Event::Tick(_) = event {
            self.on_tick();
        }

        let expecting = self
            .expected_event
            .as_ref()
            .is_some_and(|(kind, _)| *kind == event.kind());
        if expecting {
            // Cleared before running, so the action can register the next
            // expectation without being clobbered afterwards.
            let (_, action) = self.expected_event.take().unwrap();
            self.run_event_action(action, event);
        }
    }

    fn on_tick(&mut self) {
        if let Some(auto_start) = &mut self.auto_start {
            if auto_start.ticks > 0 {
                auto_start.ticks -= 1;
            } else {
                let address = auto_start.address;
                self.auto_start = None;
                tracing::info!("auto starting dfu");
                if let Err(code) = self.start_dfu(address) {
                    tracing::warn!(?code, "auto start failed");
                }
            }
        }

        let fire = match &mut self.timeout {
            Some((_, ticks_left)) => {
                if *ticks_left > 0 {
                    *ticks_left -= 1;
                }
                *ticks_left == 0
            }
            None => false,
        };
        if fire {
            let (action, _) = self.timeout.take().unwrap();
            self.run_timeout_action(action);
        }
    }

    fn run_event_action(&mut self, action: EventAction, event: &Event) {
        match action {
            EventAction::SendDfuCommand => self.send_dfu_command(event),
            EventAction::VerifyDisconnectAfterDfu => self.verify_disconnect_after_dfu(event),
            EventAction::ConnectScannedTarget => self.connect_scanned_target(event),
            EventAction::CheckDfuTargetConnected => self.check_dfu_target_connected(event),
            EventAction::CheckDiscoveryResult => self.check_discovery_result(event),
        }
    }

    fn run_timeout_action(&mut self, action: TimeoutAction) {
        tracing::debug!(?action, phase = ?self.phase, "timeout fired");
        match action {
            TimeoutAction::RestartPhase => self.restart_phase(),
            TimeoutAction::Abort => self.abort(),
            TimeoutAction::ConnectTarget => self.connect_target(),
            TimeoutAction::CompletePhase => self.complete_phase(),
        }
    }

    // ========================================================================
    // Registration slots
    // ========================================================================

    /// Arm the event expectation. Returns true when a previous registration
    /// was displaced.
    fn set_event_callback(&mut self, kind: EventKind, action: EventAction) -> bool {
        let displaced = self.expected_event.replace((kind, action)).is_some();
        if displaced {
            tracing::warn!(?kind, "event registration displaced a pending one");
        }
        displaced
    }

    /// Arm the timeout. Returns true when a previous timeout was displaced.
    fn set_timeout(&mut self, action: TimeoutAction, timeout_ms: u32) -> bool {
        let ticks = (timeout_ms / TICK_INTERVAL_MS).max(1);
        let displaced = self.timeout.replace((action, ticks)).is_some();
        if displaced {
            tracing::warn!(?action, "timeout registration displaced a pending one");
        }
        displaced
    }

    fn clear_registrations(&mut self) {
        self.expected_event = None;
        self.timeout = None;
    }

    // ========================================================================
    // Phase machine
    // ========================================================================

    fn start_phase(&mut self, phase: DfuPhase) {
        tracing::info!(from = ?self.phase, to = ?phase, "dfu phase");
        self.phase = phase;
        let armed = match phase {
            DfuPhase::Idle => {
                self.clear_registrations();
                self.target_address = None;
                true
            }
            DfuPhase::TargetTriggerDfuMode => self.start_target_trigger_dfu_mode(),
            DfuPhase::ConnectTargetInDfuMode => self.start_connect_target_in_dfu_mode(),
            DfuPhase::DiscoverDfuCharacteristics => self.start_discover_dfu_characteristics(),
            DfuPhase::TargetPreparing
            | DfuPhase::TargetInitializing
            | DfuPhase::TargetUpdating
            | DfuPhase::TargetVerifying => {
                tracing::warn!(?phase, "transfer phase not implemented, aborting");
                false
            }
            DfuPhase::Aborting => self.start_aborting(),
            DfuPhase::None => true,
        };
        if !armed {
            if self.phase == DfuPhase::Aborting {
                // Abort itself could not arm its completion. Give up.
                self.clear_registrations();
                self.phase = DfuPhase::None;
            } else {
                self.abort();
            }
        }
    }

    /// Re-enter the current phase, typically after a timed out attempt.
    /// The phase start spends the attempt budget, so a restart loop ends in
    /// an abort once the budget runs out.
    fn restart_phase(&mut self) {
        self.start_phase(self.phase);
    }

    /// Spend one reconnection attempt. False when the budget ran out.
    fn take_attempt(&mut self) -> bool {
        if self.reconnection_attempts_left == 0 {
            tracing::warn!(phase = ?self.phase, "out of reconnection attempts");
            return false;
        }
        self.reconnection_attempts_left -= 1;
        true
    }

    /// Finish the current phase and move to its successor, honoring a
    /// pending override.
    fn complete_phase(&mut self) {
        let next = match self.phase_on_complete.take() {
            Some(phase) => phase,
            None => match self.phase {
                DfuPhase::TargetTriggerDfuMode => DfuPhase::ConnectTargetInDfuMode,
                DfuPhase::ConnectTargetInDfuMode => DfuPhase::DiscoverDfuCharacteristics,
                DfuPhase::DiscoverDfuCharacteristics => DfuPhase::TargetPreparing,
                DfuPhase::TargetPreparing => DfuPhase::TargetInitializing,
                DfuPhase::TargetInitializing => DfuPhase::TargetUpdating,
                DfuPhase::TargetUpdating => DfuPhase::TargetVerifying,
                DfuPhase::TargetVerifying => DfuPhase::Idle,
                DfuPhase::Aborting => DfuPhase::Idle,
                DfuPhase::Idle | DfuPhase::None => return,
            },
        };
        self.start_phase(next);
    }

    // ========================================================================
    // Phase: TargetTriggerDfuMode
    // ========================================================================

    /// Connect to the running firmware. Returns whether a wait was armed.
    ///
    /// Every entry spends one reconnection attempt; with none left the run
    /// aborts before any connect is issued.
    fn start_target_trigger_dfu_mode(&mut self) -> bool {
        if !self.take_attempt() {
            return false;
        }
        let Some(address) = self.target_address else {
            return false;
        };
        match self.cs_central.connect(&address, CONNECT_TIMEOUT_MS) {
            ConnectStatus::WaitForSuccess => {
                self.set_event_callback(
                    EventKind::CsCentralConnectResult,
                    EventAction::SendDfuCommand,
                );
                self.set_timeout(TimeoutAction::RestartPhase, CONNECT_TIMEOUT_MS + 1000);
                true
            }
            ConnectStatus::Busy | ConnectStatus::WrongState => {
                tracing::warn!("crownstone central not available for connect");
                false
            }
        }
    }

    fn send_dfu_command(&mut self, event: &Event) {
        let Event::CsCentralConnectResult(result) = event else {
            return;
        };
        self.timeout = None;
        if result.is_err() {
            tracing::info!(attempts_left = self.reconnection_attempts_left, "connect failed");
            self.restart_phase();
            return;
        }
        // Connection established, the attempt counter starts over.
        self.reconnection_attempts_left = MAX_RECONNECTION_ATTEMPTS;
        match self.cs_central.write_control_command(ControlCommand::GotoDfu) {
            Ok(()) => {
                // The target reboots into DFU mode, dropping the link.
                self.set_event_callback(
                    EventKind::BleCentralDisconnected,
                    EventAction::VerifyDisconnectAfterDfu,
                );
                self.set_timeout(TimeoutAction::Abort, DISCONNECT_TIMEOUT_MS);
            }
            Err(code) => {
                tracing::warn!(?code, "goto dfu command failed");
                self.abort();
            }
        }
    }

    fn verify_disconnect_after_dfu(&mut self, _event: &Event) {
        self.timeout = None;
        self.reconnection_attempts_left = MAX_RECONNECTION_ATTEMPTS;
        self.complete_phase();
    }

    // ========================================================================
    // Phase: ConnectTargetInDfuMode
    // ========================================================================

    /// Wait for the rebooted target to be scanned, or connect blindly after
    /// a settle timeout.
    fn start_connect_target_in_dfu_mode(&mut self) -> bool {
        if !self.take_attempt() {
            return false;
        }
        self.set_event_callback(EventKind::DeviceScanned, EventAction::ConnectScannedTarget);
        self.set_timeout(TimeoutAction::ConnectTarget, SCAN_TIMEOUT_MS);
        true
    }

    fn connect_scanned_target(&mut self, event: &Event) {
        let Event::DeviceScanned(device) = event else {
            return;
        };
        if Some(device.address) != self.target_address {
            // Someone else's advertisement. Keep waiting.
            self.set_event_callback(EventKind::DeviceScanned, EventAction::ConnectScannedTarget);
            return;
        }
        self.timeout = None;
        self.connect_target();
    }

    fn connect_target(&mut self) {
        self.expected_event = None;
        let Some(address) = self.target_address else {
            self.abort();
            return;
        };
        match self.ble_central.connect(&address, CONNECT_TIMEOUT_MS) {
            ConnectStatus::WaitForSuccess => {
                self.set_event_callback(
                    EventKind::BleCentralConnectResult,
                    EventAction::CheckDfuTargetConnected,
                );
                self.set_timeout(TimeoutAction::RestartPhase, CONNECT_TIMEOUT_MS + 1000);
            }
            ConnectStatus::Busy | ConnectStatus::WrongState => {
                tracing::warn!("ble central not available for connect");
                self.abort();
            }
        }
    }

    fn check_dfu_target_connected(&mut self, event: &Event) {
        let Event::BleCentralConnectResult(result) = event else {
            return;
        };
        self.timeout = None;
        if result.is_err() {
            tracing::info!(attempts_left = self.reconnection_attempts_left, "dfu target connect failed");
            if self.reconnection_attempts_left == 0 {
                self.abort();
                return;
            }
            self.reconnection_attempts_left -= 1;
            self.connect_target();
            return;
        }
        self.reconnection_attempts_left = MAX_RECONNECTION_ATTEMPTS;
        self.complete_phase();
    }

    // ========================================================================
    // Phase: DiscoverDfuCharacteristics
    // ========================================================================

    /// Discover the DFU service. A refused discovery is retried after a
    /// short back-off, a started one after the discovery timeout, both until
    /// the attempt budget runs out.
    fn start_discover_dfu_characteristics(&mut self) -> bool {
        if !self.take_attempt() {
            return false;
        }
        if !self.ble_central_connected {
            return false;
        }
        let uuids = self.transport.service_uuids();
        match self.ble_central.discover_services(&uuids) {
            Ok(()) => {
                self.set_event_callback(
                    EventKind::BleCentralDiscoveryResult,
                    EventAction::CheckDiscoveryResult,
                );
                self.set_timeout(TimeoutAction::RestartPhase, DISCOVERY_TIMEOUT_MS);
                true
            }
            Err(code) => {
                tracing::warn!(
                    ?code,
                    attempts_left = self.reconnection_attempts_left,
                    "service discovery refused, retrying after back-off"
                );
                self.set_timeout(TimeoutAction::RestartPhase, DISCOVERY_RETRY_MS);
                true
            }
        }
    }

    fn check_discovery_result(&mut self, event: &Event) {
        let Event::BleCentralDiscoveryResult(result) = event else {
            return;
        };
        self.timeout = None;
        if result.is_err() || !self.transport.is_target_in_dfu_mode() {
            tracing::warn!("target is not in dfu mode");
            self.abort();
            return;
        }
        self.reconnection_attempts_left = MAX_RECONNECTION_ATTEMPTS;
        self.complete_phase();
    }

    // ========================================================================
    // Phase: Aborting
    // ========================================================================

    /// Drop every connection in the next tick and return to idle.
    fn start_aborting(&mut self) -> bool {
        self.clear_registrations();
        if self.cs_central.is_connected() {
            self.cs_central.disconnect();
        }
        if self.ble_central.is_connected() {
            self.ble_central.disconnect();
        }
        self.set_timeout(TimeoutAction::CompletePhase, TICK_INTERVAL_MS);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluenet_common::{DiscoveredAttribute, ScannedDevice, Uuid, INVALID_HANDLE};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        CsConnect,
        CsWrite,
        CsDisconnect,
        BleConnect,
        BleDiscover,
        BleDisconnect,
    }

    #[derive(Default)]
    struct SharedState {
        calls: Vec<Call>,
        cs_connect_status: Option<ConnectStatus>,
        write_result: Option<Result<(), ErrorCode>>,
        /// Number of discovery requests to refuse before accepting them.
        discover_refusals: u8,
        connected: bool,
    }

    #[derive(Clone, Default)]
    struct MockCentral {
        state: Rc<RefCell<SharedState>>,
    }

    impl CrownstoneCentral for MockCentral {
        fn connect(&mut self, _address: &DeviceAddress, _timeout_ms: u32) -> ConnectStatus {
            let mut state = self.state.borrow_mut();
            state.calls.push(Call::CsConnect);
            state.cs_connect_status.unwrap_or(ConnectStatus::WaitForSuccess)
        }

        fn write_control_command(&mut self, _command: ControlCommand) -> Result<(), ErrorCode> {
            let mut state = self.state.borrow_mut();
            state.calls.push(Call::CsWrite);
            state.write_result.unwrap_or(Ok(()))
        }

        fn disconnect(&mut self) {
            self.state.borrow_mut().calls.push(Call::CsDisconnect);
        }

        fn is_connected(&self) -> bool {
            self.state.borrow().connected
        }
    }

    impl BleCentral for MockCentral {
        fn connect(&mut self, _address: &DeviceAddress, _timeout_ms: u32) -> ConnectStatus {
            self.state.borrow_mut().calls.push(Call::BleConnect);
            ConnectStatus::WaitForSuccess
        }

        fn discover_services(&mut self, _uuids: &[Uuid]) -> Result<(), ErrorCode> {
            let mut state = self.state.borrow_mut();
            state.calls.push(Call::BleDiscover);
            if state.discover_refusals > 0 {
                state.discover_refusals -= 1;
                return Err(ErrorCode::Busy);
            }
            Ok(())
        }

        fn disconnect(&mut self) {
            self.state.borrow_mut().calls.push(Call::BleDisconnect);
        }

        fn is_connected(&self) -> bool {
            self.state.borrow().connected
        }
    }

    fn target() -> DeviceAddress {
        DeviceAddress::new([1, 2, 3, 4, 5, 6])
    }

    fn new_host() -> (MeshDfuHost<MockCentral, MockCentral>, Rc<RefCell<SharedState>>) {
        let central = MockCentral::default();
        let state = central.state.clone();
        let mut host = MeshDfuHost::new(central.clone(), central);
        host.set_init_packet_available(true);
        (host, state)
    }

    fn calls(state: &Rc<RefCell<SharedState>>) -> Vec<Call> {
        state.borrow().calls.clone()
    }

    fn count_calls(state: &Rc<RefCell<SharedState>>, call: Call) -> usize {
        state.borrow().calls.iter().filter(|c| **c == call).count()
    }

    /// Drive ticks until the armed timeout would have fired.
    fn run_ticks(host: &mut MeshDfuHost<MockCentral, MockCentral>, count: u32) {
        for i in 0..count {
            host.handle_event(&Event::Tick(i));
        }
    }

    fn discover_dfu_service(host: &mut MeshDfuHost<MockCentral, MockCentral>) {
        let base = Uuid::from_full(DFU_BASE_UUID);
        host.handle_event(&Event::BleCentralDiscovery(DiscoveredAttribute {
            uuid: dfu_service_uuid(),
            value_handle: INVALID_HANDLE,
        }));
        host.handle_event(&Event::BleCentralDiscovery(DiscoveredAttribute {
            uuid: Uuid::from_base(&base, DFU_CONTROL_POINT_UUID_SHORT),
            value_handle: 0x0010,
        }));
        host.handle_event(&Event::BleCentralDiscovery(DiscoveredAttribute {
            uuid: Uuid::from_base(&base, DFU_DATA_POINT_UUID_SHORT),
            value_handle: 0x0012,
        }));
    }

    /// Walk the host up to the discovery phase.
    fn run_to_discovery(host: &mut MeshDfuHost<MockCentral, MockCentral>) {
        host.start_dfu(target()).unwrap();
        host.handle_event(&Event::CsCentralConnectResult(Ok(())));
        host.handle_event(&Event::BleCentralDisconnected);
        assert_eq!(host.phase(), DfuPhase::ConnectTargetInDfuMode);

        host.handle_event(&Event::DeviceScanned(ScannedDevice { address: target() }));
        host.handle_event(&Event::BleCentralConnectResult(Ok(())));
        assert_eq!(host.phase(), DfuPhase::DiscoverDfuCharacteristics);
    }

    /// Walk the host up to the placeholder transfer phase.
    fn run_to_preparing(host: &mut MeshDfuHost<MockCentral, MockCentral>) {
        run_to_discovery(host);
        discover_dfu_service(host);
        host.handle_event(&Event::BleCentralDiscoveryResult(Ok(())));
    }

    #[test]
    fn test_start_refused_when_not_idle() {
        let (mut host, _) = new_host();
        host.start_dfu(target()).unwrap();
        assert_eq!(host.start_dfu(target()), Err(ErrorCode::WrongState));
    }

    #[test]
    fn test_start_refused_without_init_packet() {
        let central = MockCentral::default();
        let state = central.state.clone();
        let mut host = MeshDfuHost::new(central.clone(), central);

        assert_eq!(host.start_dfu(target()), Err(ErrorCode::NotAvailable));
        assert_eq!(host.phase(), DfuPhase::Idle);
        assert!(calls(&state).is_empty());

        host.set_init_packet_available(true);
        host.start_dfu(target()).unwrap();
        assert_eq!(host.phase(), DfuPhase::TargetTriggerDfuMode);
    }

    #[test]
    fn test_full_run_aborts_at_unimplemented_transfer() {
        let (mut host, state) = new_host();
        run_to_preparing(&mut host);

        // The transfer phases are placeholders, so the run winds down.
        assert_eq!(host.phase(), DfuPhase::Aborting);
        run_ticks(&mut host, 2);
        assert_eq!(host.phase(), DfuPhase::Idle);
        assert!(calls(&state).contains(&Call::CsWrite));
        assert!(calls(&state).contains(&Call::BleDiscover));
    }

    #[test]
    fn test_connect_failures_exhaust_attempts_then_abort() {
        let (mut host, state) = new_host();
        host.start_dfu(target()).unwrap();

        for _ in 0..MAX_RECONNECTION_ATTEMPTS {
            host.handle_event(&Event::CsCentralConnectResult(Err(ErrorCode::NotFound)));
        }
        assert_eq!(host.phase(), DfuPhase::Aborting);
        run_ticks(&mut host, 2);
        assert_eq!(host.phase(), DfuPhase::Idle);

        // Every phase entry spends one attempt, so the connect count equals
        // the budget.
        assert_eq!(
            count_calls(&state, Call::CsConnect),
            MAX_RECONNECTION_ATTEMPTS as usize
        );
    }

    #[test]
    fn test_start_with_spent_budget_aborts_without_connecting() {
        let (mut host, state) = new_host();
        host.start_dfu(target()).unwrap();
        for _ in 0..MAX_RECONNECTION_ATTEMPTS {
            host.handle_event(&Event::CsCentralConnectResult(Err(ErrorCode::NotFound)));
        }
        run_ticks(&mut host, 2);
        assert_eq!(host.phase(), DfuPhase::Idle);
        let connects = count_calls(&state, Call::CsConnect);

        // The budget is spent and nothing replenished it, so a new run winds
        // straight down without touching the centrals.
        host.start_dfu(target()).unwrap();
        assert_eq!(host.phase(), DfuPhase::Aborting);
        run_ticks(&mut host, 2);
        assert_eq!(host.phase(), DfuPhase::Idle);
        assert_eq!(count_calls(&state, Call::CsConnect), connects);
    }

    #[test]
    fn test_no_disconnect_after_dfu_command_aborts() {
        let (mut host, _) = new_host();
        host.start_dfu(target()).unwrap();
        host.handle_event(&Event::CsCentralConnectResult(Ok(())));
        assert_eq!(host.phase(), DfuPhase::TargetTriggerDfuMode);

        // Target never drops the link; the disconnect timeout aborts.
        run_ticks(&mut host, DISCONNECT_TIMEOUT_MS / TICK_INTERVAL_MS + 2);
        assert_eq!(host.phase(), DfuPhase::Idle);
    }

    #[test]
    fn test_goto_dfu_write_failure_aborts() {
        let (mut host, state) = new_host();
        state.borrow_mut().write_result = Some(Err(ErrorCode::Busy));
        host.start_dfu(target()).unwrap();
        host.handle_event(&Event::CsCentralConnectResult(Ok(())));
        assert_eq!(host.phase(), DfuPhase::Aborting);
    }

    #[test]
    fn test_foreign_scan_keeps_waiting() {
        let (mut host, state) = new_host();
        host.start_dfu(target()).unwrap();
        host.handle_event(&Event::CsCentralConnectResult(Ok(())));
        host.handle_event(&Event::BleCentralDisconnected);

        host.handle_event(&Event::DeviceScanned(ScannedDevice {
            address: DeviceAddress::new([9; 6]),
        }));
        assert!(!calls(&state).contains(&Call::BleConnect));

        host.handle_event(&Event::DeviceScanned(ScannedDevice { address: target() }));
        assert!(calls(&state).contains(&Call::BleConnect));
    }

    #[test]
    fn test_scan_timeout_connects_blindly() {
        let (mut host, state) = new_host();
        host.start_dfu(target()).unwrap();
        host.handle_event(&Event::CsCentralConnectResult(Ok(())));
        host.handle_event(&Event::BleCentralDisconnected);

        run_ticks(&mut host, SCAN_TIMEOUT_MS / TICK_INTERVAL_MS + 1);
        assert!(calls(&state).contains(&Call::BleConnect));
        assert_eq!(host.phase(), DfuPhase::ConnectTargetInDfuMode);
    }

    #[test]
    fn test_incomplete_discovery_aborts() {
        let (mut host, _) = new_host();
        run_to_discovery(&mut host);

        // No DFU service discovered before the result arrives.
        host.handle_event(&Event::BleCentralDiscoveryResult(Ok(())));
        assert_eq!(host.phase(), DfuPhase::Aborting);
    }

    #[test]
    fn test_refused_discovery_retried_after_backoff() {
        let (mut host, state) = new_host();
        state.borrow_mut().discover_refusals = 1;
        run_to_discovery(&mut host);
        assert_eq!(count_calls(&state, Call::BleDiscover), 1);

        run_ticks(&mut host, DISCOVERY_RETRY_MS / TICK_INTERVAL_MS + 1);
        assert_eq!(count_calls(&state, Call::BleDiscover), 2);
        assert_eq!(host.phase(), DfuPhase::DiscoverDfuCharacteristics);

        // The retried discovery completes the phase as usual.
        discover_dfu_service(&mut host);
        host.handle_event(&Event::BleCentralDiscoveryResult(Ok(())));
        assert_eq!(host.phase(), DfuPhase::Aborting);
    }

    #[test]
    fn test_discovery_refusals_exhaust_attempts_then_abort() {
        let (mut host, state) = new_host();
        state.borrow_mut().discover_refusals = u8::MAX;
        run_to_discovery(&mut host);

        let backoff_ticks = DISCOVERY_RETRY_MS / TICK_INTERVAL_MS + 1;
        run_ticks(&mut host, backoff_ticks * (MAX_RECONNECTION_ATTEMPTS as u32 + 1));
        assert_eq!(host.phase(), DfuPhase::Idle);
        assert_eq!(
            count_calls(&state, Call::BleDiscover),
            MAX_RECONNECTION_ATTEMPTS as usize
        );
    }

    #[test]
    fn test_discovery_timeout_retries_then_aborts() {
        let (mut host, state) = new_host();
        run_to_discovery(&mut host);

        // The discovery result never arrives; each timeout restarts the
        // phase until the attempt budget is spent.
        let timeout_ticks = DISCOVERY_TIMEOUT_MS / TICK_INTERVAL_MS + 1;
        run_ticks(&mut host, timeout_ticks * (MAX_RECONNECTION_ATTEMPTS as u32 + 1));
        assert_eq!(host.phase(), DfuPhase::Idle);
        assert_eq!(
            count_calls(&state, Call::BleDiscover),
            MAX_RECONNECTION_ATTEMPTS as usize
        );
    }

    #[test]
    fn test_timeout_fires_once() {
        let (mut host, state) = new_host();
        host.start_dfu(target()).unwrap();
        host.handle_event(&Event::CsCentralConnectResult(Ok(())));
        host.handle_event(&Event::BleCentralDisconnected);

        // Run well past the scan timeout; only one blind connect happens.
        run_ticks(&mut host, SCAN_TIMEOUT_MS / TICK_INTERVAL_MS * 3);
        let connects = calls(&state)
            .iter()
            .filter(|call| **call == Call::BleConnect)
            .count();
        assert_eq!(connects, 1);
    }

    #[test]
    fn test_registration_overwrite_reports_displacement() {
        let (mut host, _) = new_host();
        assert!(!host.set_event_callback(EventKind::Tick, EventAction::SendDfuCommand));
        assert!(host.set_event_callback(EventKind::Tick, EventAction::SendDfuCommand));
        assert!(!host.set_timeout(TimeoutAction::Abort, 1000));
        assert!(host.set_timeout(TimeoutAction::Abort, 1000));
    }

    #[test]
    fn test_auto_start_after_ticks() {
        let (mut host, state) = new_host();
        host.set_auto_start(AutoStart { ticks: 3, address: target() });
        run_ticks(&mut host, 3);
        assert!(!calls(&state).contains(&Call::CsConnect));
        run_ticks(&mut host, 1);
        assert!(calls(&state).contains(&Call::CsConnect));
        assert_eq!(host.phase(), DfuPhase::TargetTriggerDfuMode);
    }

    #[test]
    fn test_abort_disconnects_live_links() {
        let (mut host, state) = new_host();
        host.start_dfu(target()).unwrap();
        state.borrow_mut().connected = true;
        host.abort();
        assert!(calls(&state).contains(&Call::CsDisconnect));
        assert!(calls(&state).contains(&Call::BleDisconnect));
    }
}
