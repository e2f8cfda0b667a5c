//! Production MIDI backend built on `midir`.
//!
//! `midir` hands out one-shot client objects: a `MidiInput`/`MidiOutput` is
//! consumed by `connect()` and only returned when the connection closes.
//! The backend therefore creates a fresh client for every enumeration and
//! every open — which also matches the gateway's contract that port
//! listings are never cached.
//!
//! Received buffers are delivered by `midir` on a thread it owns; the
//! installed [`ReceiveHandler`] is the only thing that runs there.

use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::application::driver::{DriverError, MidiDriver, ReceiveHandler};

/// Client name reported to the OS MIDI subsystem.
const CLIENT_NAME: &str = "sysexd";

/// One in/out MIDI device pair backed by `midir`.
///
/// Holds only the live connections; clients are created on demand.
#[derive(Default)]
pub struct MidirBackend {
    input: Option<MidiInputConnection<()>>,
    output: Option<MidiOutputConnection>,
}

impl MidirBackend {
    /// Creates a backend with no ports open.
    ///
    /// Never fails: MIDI subsystem availability is probed per operation, so
    /// a host without MIDI still gets a session whose operations fail
    /// gracefully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh input client with SysEx reception enabled.
    fn new_input() -> Result<MidiInput, DriverError> {
        let mut input =
            MidiInput::new(CLIENT_NAME).map_err(|e| DriverError::Init(e.to_string()))?;
        // Receive every message category; the adapter does the filtering.
        input.ignore(Ignore::None);
        Ok(input)
    }

    fn new_output() -> Result<MidiOutput, DriverError> {
        MidiOutput::new(CLIENT_NAME).map_err(|e| DriverError::Init(e.to_string()))
    }
}

impl MidiDriver for MidirBackend {
    fn input_port_names(&self) -> Result<Vec<String>, DriverError> {
        let input = Self::new_input()?;
        Ok(input
            .ports()
            .iter()
            .map(|port| {
                input
                    .port_name(port)
                    .unwrap_or_else(|_| String::from("(unknown)"))
            })
            .collect())
    }

    fn output_port_names(&self) -> Result<Vec<String>, DriverError> {
        let output = Self::new_output()?;
        Ok(output
            .ports()
            .iter()
            .map(|port| {
                output
                    .port_name(port)
                    .unwrap_or_else(|_| String::from("(unknown)"))
            })
            .collect())
    }

    fn open_input(&mut self, index: usize, mut handler: ReceiveHandler) -> Result<(), DriverError> {
        self.close_input();

        let input = Self::new_input()?;
        let ports = input.ports();
        let port = ports.get(index).ok_or(DriverError::PortOutOfRange {
            index,
            available: ports.len(),
        })?;

        let connection = input
            .connect(
                port,
                "sysexd-in",
                move |_timestamp, bytes, _context| handler(bytes),
                (),
            )
            .map_err(|e| DriverError::Connect {
                index,
                reason: e.to_string(),
            })?;
        self.input = Some(connection);
        Ok(())
    }

    fn close_input(&mut self) {
        if let Some(connection) = self.input.take() {
            connection.close();
        }
    }

    fn open_output(&mut self, index: usize) -> Result<(), DriverError> {
        self.close_output();

        let output = Self::new_output()?;
        let ports = output.ports();
        let port = ports.get(index).ok_or(DriverError::PortOutOfRange {
            index,
            available: ports.len(),
        })?;

        let connection = output
            .connect(port, "sysexd-out")
            .map_err(|e| DriverError::Connect {
                index,
                reason: e.to_string(),
            })?;
        self.output = Some(connection);
        Ok(())
    }

    fn close_output(&mut self) {
        if let Some(connection) = self.output.take() {
            connection.close();
        }
    }

    fn write(&mut self, payload: &[u8]) -> Result<(), DriverError> {
        match self.output.as_mut() {
            Some(connection) => connection
                .send(payload)
                .map_err(|e| DriverError::Send(e.to_string())),
            None => Err(DriverError::Send("no output port open".to_string())),
        }
    }
}
