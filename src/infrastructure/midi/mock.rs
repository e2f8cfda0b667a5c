//! In-memory MIDI driver for unit and integration tests.
//!
//! The real backend talks to OS MIDI APIs that need physical hardware and
//! cannot be observed from test code.  `MockMidiDriver` replaces every
//! driver call with recording: opens, closes, and writes land in a shared
//! [`MockDriverState`] that assertions can inspect, and tests can feed
//! buffers into the stored receive handler exactly as the driver thread
//! would.
//!
//! # Usage in tests
//!
//! ```ignore
//! let driver = MockMidiDriver::new(&["DeviceA"], &["DeviceA"]);
//! let handle = driver.handle();
//! let mut adapter = SysexAdapter::new(Box::new(driver), policy, push_tx, false);
//!
//! adapter.open_input_port(0);
//! handle.emit(&[0xF0, 0x01, 0xF7]); // simulate a hardware receive
//! assert_eq!(handle.written(), Vec::<Vec<u8>>::new());
//! ```
//!
//! # Failure flags
//!
//! Set `fail_open_input` / `fail_open_output` / `fail_write` /
//! `fail_enumerate` to exercise the error-handling paths without broken
//! hardware.

use std::sync::{Arc, Mutex};

use crate::application::driver::{DriverError, MidiDriver, ReceiveHandler};

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// `open_input(index)` succeeded.
    OpenInput(usize),
    /// An open input port was closed.
    CloseInput,
    /// `open_output(index)` succeeded.
    OpenOutput(usize),
    /// An open output port was closed.
    CloseOutput,
    /// A payload was written to the output port.
    Write(Vec<u8>),
}

/// State shared between a [`MockMidiDriver`] and the test holding its
/// handle.  Everything is mutex-guarded so the handle can be used from a
/// spawned task standing in for the driver thread.
#[derive(Default)]
pub struct MockDriverState {
    events: Mutex<Vec<MockEvent>>,
    open_input: Mutex<Option<usize>>,
    open_output: Mutex<Option<usize>>,
    receive_handler: Mutex<Option<ReceiveHandler>>,
}

impl MockDriverState {
    /// Every call recorded so far, in order.
    pub fn events(&self) -> Vec<MockEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Payloads written to the output port, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                MockEvent::Write(payload) => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    /// Index of the currently open input port.
    pub fn open_input(&self) -> Option<usize> {
        *self.open_input.lock().unwrap()
    }

    /// Index of the currently open output port.
    pub fn open_output(&self) -> Option<usize> {
        *self.open_output.lock().unwrap()
    }

    /// Delivers `bytes` to the installed receive handler, as the driver
    /// thread would.  Panics if no input port is open — that is a test
    /// sequencing bug.
    pub fn emit(&self, bytes: &[u8]) {
        let mut handler = self.receive_handler.lock().unwrap();
        handler
            .as_mut()
            .expect("emit() requires an open input port")(bytes);
    }

    fn record(&self, event: MockEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A mock driver that records all calls without touching any OS API.
pub struct MockMidiDriver {
    /// Names returned by input enumeration; also bounds valid input indices.
    pub inport_names: Vec<String>,
    /// Names returned by output enumeration; also bounds valid output indices.
    pub outport_names: Vec<String>,
    /// When `true`, enumeration fails with [`DriverError::Init`].
    pub fail_enumerate: bool,
    /// When `true`, `open_input` fails with [`DriverError::Connect`].
    pub fail_open_input: bool,
    /// When `true`, `open_output` fails with [`DriverError::Connect`].
    pub fail_open_output: bool,
    /// When `true`, `write` fails with [`DriverError::Send`].
    pub fail_write: bool,
    state: Arc<MockDriverState>,
}

impl MockMidiDriver {
    /// Creates a mock with the given attached port names and no failures.
    pub fn new(inports: &[&str], outports: &[&str]) -> Self {
        Self {
            inport_names: inports.iter().map(|s| s.to_string()).collect(),
            outport_names: outports.iter().map(|s| s.to_string()).collect(),
            fail_enumerate: false,
            fail_open_input: false,
            fail_open_output: false,
            fail_write: false,
            state: Arc::new(MockDriverState::default()),
        }
    }

    /// A handle for inspecting recorded calls and emitting receives after
    /// the driver has been boxed into an adapter.
    pub fn handle(&self) -> Arc<MockDriverState> {
        Arc::clone(&self.state)
    }
}

impl MidiDriver for MockMidiDriver {
    fn input_port_names(&self) -> Result<Vec<String>, DriverError> {
        if self.fail_enumerate {
            return Err(DriverError::Init("mock enumeration failure".to_string()));
        }
        Ok(self.inport_names.clone())
    }

    fn output_port_names(&self) -> Result<Vec<String>, DriverError> {
        if self.fail_enumerate {
            return Err(DriverError::Init("mock enumeration failure".to_string()));
        }
        Ok(self.outport_names.clone())
    }

    fn open_input(&mut self, index: usize, handler: ReceiveHandler) -> Result<(), DriverError> {
        if self.fail_open_input {
            return Err(DriverError::Connect {
                index,
                reason: "mock open failure".to_string(),
            });
        }
        if index >= self.inport_names.len() {
            return Err(DriverError::PortOutOfRange {
                index,
                available: self.inport_names.len(),
            });
        }
        *self.state.open_input.lock().unwrap() = Some(index);
        *self.state.receive_handler.lock().unwrap() = Some(handler);
        self.state.record(MockEvent::OpenInput(index));
        Ok(())
    }

    fn close_input(&mut self) {
        let was_open = self.state.open_input.lock().unwrap().take().is_some();
        self.state.receive_handler.lock().unwrap().take();
        if was_open {
            self.state.record(MockEvent::CloseInput);
        }
    }

    fn open_output(&mut self, index: usize) -> Result<(), DriverError> {
        if self.fail_open_output {
            return Err(DriverError::Connect {
                index,
                reason: "mock open failure".to_string(),
            });
        }
        if index >= self.outport_names.len() {
            return Err(DriverError::PortOutOfRange {
                index,
                available: self.outport_names.len(),
            });
        }
        *self.state.open_output.lock().unwrap() = Some(index);
        self.state.record(MockEvent::OpenOutput(index));
        Ok(())
    }

    fn close_output(&mut self) {
        let was_open = self.state.open_output.lock().unwrap().take().is_some();
        if was_open {
            self.state.record(MockEvent::CloseOutput);
        }
    }

    fn write(&mut self, payload: &[u8]) -> Result<(), DriverError> {
        if self.fail_write {
            return Err(DriverError::Send("mock write failure".to_string()));
        }
        if self.state.open_output().is_none() {
            return Err(DriverError::Send("no output port open".to_string()));
        }
        self.state.record(MockEvent::Write(payload.to_vec()));
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_returns_configured_names() {
        let driver = MockMidiDriver::new(&["A", "B"], &["C"]);
        assert_eq!(driver.input_port_names().unwrap(), vec!["A", "B"]);
        assert_eq!(driver.output_port_names().unwrap(), vec!["C"]);
    }

    #[test]
    fn test_open_input_out_of_range_is_rejected() {
        let mut driver = MockMidiDriver::new(&["A"], &[]);
        let result = driver.open_input(1, Box::new(|_| {}));
        assert!(matches!(
            result,
            Err(DriverError::PortOutOfRange {
                index: 1,
                available: 1
            })
        ));
    }

    #[test]
    fn test_write_without_open_output_fails() {
        let mut driver = MockMidiDriver::new(&[], &["Out"]);
        assert!(driver.write(&[0xF0]).is_err());
    }

    #[test]
    fn test_emit_reaches_installed_handler() {
        let mut driver = MockMidiDriver::new(&["In"], &[]);
        let handle = driver.handle();
        let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        driver
            .open_input(0, Box::new(move |bytes| sink.lock().unwrap().push(bytes.to_vec())))
            .unwrap();

        handle.emit(&[0xF0, 0x7F]);

        assert_eq!(received.lock().unwrap().as_slice(), &[vec![0xF0, 0x7F]]);
    }

    #[test]
    fn test_close_without_open_records_nothing() {
        let mut driver = MockMidiDriver::new(&[], &[]);
        driver.close_input();
        driver.close_output();
        assert!(driver.handle().events().is_empty());
    }
}
