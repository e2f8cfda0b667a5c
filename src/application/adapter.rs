//! The SysEx hardware adapter: one exclusively-owned MIDI in/out pair per
//! session.
//!
//! The adapter mediates every hardware operation for its session: port
//! enumeration, lazy input/output port selection, SysEx writes, and the
//! asynchronous receive path.  Driver faults stop here — they become logs,
//! boolean failures, or `midierror*` pushes, never propagated errors.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::application::driver::{DriverError, MidiDriver, ReceiveHandler};
use crate::application::resend::{ResendController, SendState};
use crate::domain::config::ResendPolicy;
use crate::domain::messages::{PortDescriptor, PortList, ServerMessage};

/// First byte of a System-Exclusive message.  Buffers starting with any
/// other status byte are ignored by the receive path.
pub const SYSEX_START: u8 = 0xF0;

/// Mediates access to one physical MIDI input/output port pair.
///
/// Exactly one adapter exists per session and is never shared across
/// connections.  Ports open lazily on demand; dropping the adapter closes
/// whatever is open.
pub struct SysexAdapter {
    driver: Box<dyn MidiDriver + Send>,
    /// Index of the currently open output port, if any.  At most one output
    /// port is open at a time.
    opened_output: Option<usize>,
    /// Shared with the receive handler installed on the input port.
    send_state: Arc<SendState>,
    resend: ResendController,
    /// Push channel to the owning connection's writer task.  Sends to a
    /// closed channel are dropped silently.
    push: UnboundedSender<ServerMessage>,
    debug: bool,
}

impl SysexAdapter {
    /// Builds an adapter around a driver instance.
    ///
    /// No ports are opened here; a driver whose hardware is unavailable
    /// still yields a working adapter whose operations fail gracefully.
    pub fn new(
        driver: Box<dyn MidiDriver + Send>,
        policy: ResendPolicy,
        push: UnboundedSender<ServerMessage>,
        debug: bool,
    ) -> Self {
        Self {
            driver,
            opened_output: None,
            send_state: Arc::new(SendState::new()),
            resend: ResendController::new(policy),
            push,
            debug,
        }
    }

    /// The pending-send flag, for assertions in tests.
    pub fn send_state(&self) -> &Arc<SendState> {
        &self.send_state
    }

    /// Index of the currently open output port, if any.
    pub fn opened_output(&self) -> Option<usize> {
        self.opened_output
    }

    // ── Enumeration ───────────────────────────────────────────────────────────

    /// Queries the driver for the current port snapshot, each direction
    /// independently.  A driver error downgrades to an empty list for that
    /// direction; enumeration itself always succeeds.
    pub fn enumerate_ports(&self) -> PortList {
        let inports = match self.driver.input_port_names() {
            Ok(names) => names.into_iter().map(PortDescriptor::new).collect(),
            Err(e) => {
                warn!(error = %e, "input port enumeration failed");
                Vec::new()
            }
        };
        let outports = match self.driver.output_port_names() {
            Ok(names) => names.into_iter().map(PortDescriptor::new).collect(),
            Err(e) => {
                warn!(error = %e, "output port enumeration failed");
                Vec::new()
            }
        };
        PortList { inports, outports }
    }

    // ── Input port selection ──────────────────────────────────────────────────

    /// Closes any open input port, then opens `index` and installs this
    /// adapter's receive handler with no message-category filtering.
    ///
    /// Returns `false` (and pushes a `midierrorin`) on any driver failure;
    /// never panics or propagates past this boundary.
    pub fn open_input_port(&mut self, index: usize) -> bool {
        self.driver.close_input();

        let handler = Self::receive_handler(Arc::clone(&self.send_state), self.push.clone());
        match self.driver.open_input(index, handler) {
            Ok(()) => {
                if self.debug {
                    debug!(port = index, "input port opened");
                }
                true
            }
            Err(e) => {
                warn!(port = index, error = %e, "failed to open input port");
                self.push_error_in(&e);
                false
            }
        }
    }

    // ── Output port selection ─────────────────────────────────────────────────

    /// Idempotent output-port selection.
    ///
    /// A request for a different index (or when nothing is open) closes the
    /// current output port first, then opens the new one.  Returns `true`
    /// only when a closed→open transition just occurred; `false` both when
    /// the right port was already open and when the open fails.  Callers
    /// must not read the boolean as "ready" — it only signals a state
    /// change.
    pub fn ensure_port_opened(&mut self, index: usize) -> bool {
        if self.opened_output != Some(index) {
            self.driver.close_output();
            self.opened_output = None;
        }

        if self.opened_output.is_none() {
            match self.driver.open_output(index) {
                Ok(()) => {
                    if self.debug {
                        debug!(port = index, "output port opened");
                    }
                    self.opened_output = Some(index);
                    return true;
                }
                Err(e) => {
                    warn!(port = index, error = %e, "failed to open output port");
                    self.push_error_out(&e);
                }
            }
        }
        false
    }

    // ── Send path ─────────────────────────────────────────────────────────────

    /// Writes `payload` to the open output port, marking the pending-send
    /// flag as awaiting acknowledgment first.
    ///
    /// With `resend` set, the resend controller runs to completion before
    /// this returns: it waits for the device's echoed receipt, re-issuing
    /// the payload on every interval expiry up to the retry budget.  Budget
    /// exhaustion is logged, not an error.
    pub async fn send_message(&mut self, payload: &[u8], resend: bool) -> Result<(), DriverError> {
        self.send_state.mark_awaiting();

        if let Err(e) = self.driver.write(payload) {
            self.send_state.reset();
            self.push_error_out(&e);
            return Err(e);
        }

        if resend
            && !self
                .resend
                .run(&self.send_state, payload, self.driver.as_mut())
                .await
        {
            debug!(len = payload.len(), "message was never acknowledged");
        }
        Ok(())
    }

    // ── Receive path ──────────────────────────────────────────────────────────

    /// Builds the handler the driver invokes on its own thread for every
    /// received buffer.
    ///
    /// Only SysEx buffers (first byte `0xF0`) are processed: they clear the
    /// pending-send flag and are pushed to the owning connection as a
    /// base64-encoded `midimessage`.  Everything else is ignored.
    fn receive_handler(
        state: Arc<SendState>,
        push: UnboundedSender<ServerMessage>,
    ) -> ReceiveHandler {
        Box::new(move |bytes| {
            if bytes.first() != Some(&SYSEX_START) {
                return;
            }
            state.acknowledge();
            let _ = push.send(ServerMessage::MidiMessage {
                data: BASE64.encode(bytes),
            });
        })
    }

    fn push_error_in(&self, error: &DriverError) {
        let _ = self.push.send(ServerMessage::MidiErrorIn {
            data: error.to_string(),
        });
    }

    fn push_error_out(&self, error: &DriverError) {
        let _ = self.push.send(ServerMessage::MidiErrorOut {
            data: error.to_string(),
        });
    }
}

impl Drop for SysexAdapter {
    /// Releases both ports when the session is destroyed.
    fn drop(&mut self) {
        self.driver.close_input();
        self.driver.close_output();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resend::PendingSend;
    use crate::infrastructure::midi::mock::{MockEvent, MockMidiDriver};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn quick_policy() -> ResendPolicy {
        ResendPolicy {
            max_attempts: 3,
            interval: Duration::from_millis(5),
        }
    }

    fn adapter_with(
        driver: MockMidiDriver,
    ) -> (
        SysexAdapter,
        std::sync::Arc<crate::infrastructure::midi::mock::MockDriverState>,
        mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        let handle = driver.handle();
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let adapter = SysexAdapter::new(Box::new(driver), quick_policy(), push_tx, false);
        (adapter, handle, push_rx)
    }

    #[test]
    fn test_enumerate_reports_ports_in_both_directions() {
        let driver = MockMidiDriver::new(&["DeviceA"], &["DeviceA", "DeviceB"]);
        let (adapter, _, _rx) = adapter_with(driver);

        let ports = adapter.enumerate_ports();

        assert_eq!(ports.inports, vec![PortDescriptor::new("DeviceA")]);
        assert_eq!(ports.outports.len(), 2);
    }

    #[test]
    fn test_enumerate_with_unavailable_driver_returns_empty_lists() {
        let mut driver = MockMidiDriver::new(&["DeviceA"], &["DeviceA"]);
        driver.fail_enumerate = true;
        let (adapter, _, _rx) = adapter_with(driver);

        let ports = adapter.enumerate_ports();

        assert!(ports.inports.is_empty());
        assert!(ports.outports.is_empty());
    }

    #[test]
    fn test_open_input_port_success() {
        let driver = MockMidiDriver::new(&["DeviceA"], &[]);
        let (mut adapter, handle, _rx) = adapter_with(driver);

        assert!(adapter.open_input_port(0));
        assert_eq!(handle.open_input(), Some(0));
    }

    #[test]
    fn test_open_input_port_out_of_range_fails_and_pushes_error() {
        let driver = MockMidiDriver::new(&["DeviceA"], &[]);
        let (mut adapter, handle, mut rx) = adapter_with(driver);

        // Act: index 5 with a single port attached
        let opened = adapter.open_input_port(5);

        // Assert: failure reported, no port left open, midierrorin pushed
        assert!(!opened);
        assert_eq!(handle.open_input(), None);
        match rx.try_recv() {
            Ok(ServerMessage::MidiErrorIn { .. }) => {}
            other => panic!("expected MidiErrorIn push, got {:?}", other),
        }
    }

    #[test]
    fn test_reopening_input_closes_previous_port_first() {
        let driver = MockMidiDriver::new(&["A", "B"], &[]);
        let (mut adapter, handle, _rx) = adapter_with(driver);

        assert!(adapter.open_input_port(0));
        assert!(adapter.open_input_port(1));

        let events = handle.events();
        let close_pos = events
            .iter()
            .position(|e| *e == MockEvent::CloseInput)
            .expect("previous input must be closed");
        let reopen_pos = events
            .iter()
            .position(|e| *e == MockEvent::OpenInput(1))
            .unwrap();
        assert!(close_pos < reopen_pos);
        assert_eq!(handle.open_input(), Some(1));
    }

    #[test]
    fn test_ensure_port_opened_reports_transition_only() {
        let driver = MockMidiDriver::new(&[], &["Out0", "Out1"]);
        let (mut adapter, _, _rx) = adapter_with(driver);

        // closed → open: a transition
        assert!(adapter.ensure_port_opened(0));
        // already open on the right port: no action, no transition
        assert!(!adapter.ensure_port_opened(0));
        assert_eq!(adapter.opened_output(), Some(0));
    }

    #[test]
    fn test_switching_output_port_closes_previous_first() {
        let driver = MockMidiDriver::new(&[], &["Out0", "Out1"]);
        let (mut adapter, handle, _rx) = adapter_with(driver);

        assert!(adapter.ensure_port_opened(0));
        assert!(adapter.ensure_port_opened(1));

        let events = handle.events();
        let close_pos = events
            .iter()
            .position(|e| *e == MockEvent::CloseOutput)
            .expect("previous output must be closed");
        let reopen_pos = events
            .iter()
            .position(|e| *e == MockEvent::OpenOutput(1))
            .unwrap();
        assert!(close_pos < reopen_pos, "close must precede the new open");
        assert_eq!(adapter.opened_output(), Some(1));
    }

    #[test]
    fn test_ensure_port_opened_failure_returns_false_and_pushes_error() {
        let mut driver = MockMidiDriver::new(&[], &["Out0"]);
        driver.fail_open_output = true;
        let (mut adapter, _, mut rx) = adapter_with(driver);

        assert!(!adapter.ensure_port_opened(0));
        assert_eq!(adapter.opened_output(), None);
        match rx.try_recv() {
            Ok(ServerMessage::MidiErrorOut { .. }) => {}
            other => panic!("expected MidiErrorOut push, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_without_resend_writes_once_and_returns_immediately() {
        let driver = MockMidiDriver::new(&[], &["Out"]);
        let (mut adapter, handle, _rx) = adapter_with(driver);
        adapter.ensure_port_opened(0);

        let started = std::time::Instant::now();
        adapter.send_message(&[0xF0, 0x37, 0x00, 0xF7], false).await.unwrap();

        // No retry wait: nowhere near even one resend interval elapsed
        assert!(started.elapsed() < Duration::from_millis(5));
        assert_eq!(handle.written(), vec![vec![0xF0, 0x37, 0x00, 0xF7]]);
        assert_eq!(adapter.send_state().snapshot(), PendingSend::AwaitingAck);
    }

    #[tokio::test]
    async fn test_send_with_resend_and_no_ack_completes_after_budget() {
        let driver = MockMidiDriver::new(&[], &["Out"]);
        let (mut adapter, handle, _rx) = adapter_with(driver);
        adapter.ensure_port_opened(0);

        let started = std::time::Instant::now();
        adapter.send_message(&[0xF0, 0xF7], true).await.unwrap();

        // 3 attempts × 5 ms: bounded, and the full budget was waited out
        assert!(started.elapsed() >= Duration::from_millis(15));
        // original write + one resend per attempt
        assert_eq!(handle.written().len(), 4);
        assert_eq!(adapter.send_state().snapshot(), PendingSend::Idle);
    }

    #[tokio::test]
    async fn test_send_write_failure_pushes_midierrorout() {
        let mut driver = MockMidiDriver::new(&[], &["Out"]);
        driver.fail_write = true;
        let (mut adapter, _, mut rx) = adapter_with(driver);
        adapter.ensure_port_opened(0);

        let result = adapter.send_message(&[0xF0, 0xF7], false).await;

        assert!(result.is_err());
        match rx.try_recv() {
            Ok(ServerMessage::MidiErrorOut { .. }) => {}
            other => panic!("expected MidiErrorOut push, got {:?}", other),
        }
    }

    #[test]
    fn test_receive_path_pushes_sysex_as_base64() {
        let driver = MockMidiDriver::new(&["In"], &[]);
        let (mut adapter, handle, mut rx) = adapter_with(driver);
        adapter.open_input_port(0);

        // Simulate the driver thread delivering a SysEx buffer
        handle.emit(&[0xF0, 0x37, 0x00, 0xF7]);

        match rx.try_recv() {
            Ok(ServerMessage::MidiMessage { data }) => assert_eq!(data, "8DcA9w=="),
            other => panic!("expected MidiMessage push, got {:?}", other),
        }
    }

    #[test]
    fn test_receive_path_ignores_non_sysex_buffers() {
        let driver = MockMidiDriver::new(&["In"], &[]);
        let (mut adapter, handle, mut rx) = adapter_with(driver);
        adapter.open_input_port(0);

        // A note-on status byte, not SysEx
        handle.emit(&[0x90, 0x40, 0x7F]);

        assert!(rx.try_recv().is_err(), "non-SysEx must produce no push");
    }

    #[test]
    fn test_receive_acknowledges_outstanding_send() {
        let driver = MockMidiDriver::new(&["In"], &[]);
        let (mut adapter, handle, _rx) = adapter_with(driver);
        adapter.open_input_port(0);
        adapter.send_state().mark_awaiting();

        handle.emit(&[0xF0, 0x01, 0xF7]);

        assert_eq!(adapter.send_state().snapshot(), PendingSend::Acknowledged);
    }

    #[test]
    fn test_drop_closes_open_ports() {
        let driver = MockMidiDriver::new(&["In"], &["Out"]);
        let (mut adapter, handle, _rx) = adapter_with(driver);
        adapter.open_input_port(0);
        adapter.ensure_port_opened(0);

        drop(adapter);

        assert_eq!(handle.open_input(), None);
        assert_eq!(handle.open_output(), None);
    }
}
