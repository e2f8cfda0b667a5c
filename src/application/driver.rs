//! The hardware driver boundary.
//!
//! [`MidiDriver`] is the seam between the session engine and the actual MIDI
//! stack.  The production implementation wraps `midir`
//! (`infrastructure::midi::midir_backend`); tests use the in-memory mock
//! (`infrastructure::midi::mock`).
//!
//! Driver faults never propagate past this boundary as panics or raw library
//! errors: every operation returns a [`DriverError`], and the adapter
//! translates those into logs, boolean failures, or `midierror*` pushes.

use thiserror::Error;

/// Callback invoked by the driver for every buffer received on the open
/// input port.
///
/// Runs on a thread owned by the driver, concurrently with request handling.
/// Implementations must confine themselves to synchronized state and channel
/// sends.
pub type ReceiveHandler = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Errors reported by a MIDI driver backend.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The underlying MIDI client could not be created at all (no MIDI
    /// subsystem available on the host).
    #[error("MIDI driver unavailable: {0}")]
    Init(String),

    /// The requested port index does not exist right now.
    #[error("port {index} out of range ({available} port(s) available)")]
    PortOutOfRange {
        /// The index the client asked for.
        index: usize,
        /// How many ports the driver currently reports.
        available: usize,
    },

    /// The port exists but could not be opened.
    #[error("failed to open port {index}: {reason}")]
    Connect {
        /// The index that failed to open.
        index: usize,
        /// Driver-reported reason.
        reason: String,
    },

    /// A write to the open output port failed.
    #[error("send failed: {0}")]
    Send(String),
}

/// One logical MIDI in/out device pair.
///
/// Exactly one driver instance exists per session, exclusively owned by that
/// session's adapter.  Port enumeration is re-queried on every call — the
/// physical port set may change between calls, so nothing is cached.
pub trait MidiDriver: Send {
    /// Names of the currently attached input ports, in index order.
    fn input_port_names(&self) -> Result<Vec<String>, DriverError>;

    /// Names of the currently attached output ports, in index order.
    fn output_port_names(&self) -> Result<Vec<String>, DriverError>;

    /// Opens input port `index` and installs `handler` for every received
    /// buffer, with no message-category filtering.  Any previously open
    /// input port must be closed by the caller first.
    fn open_input(&mut self, index: usize, handler: ReceiveHandler) -> Result<(), DriverError>;

    /// Closes the open input port, if any.  Idempotent.
    fn close_input(&mut self);

    /// Opens output port `index`.
    fn open_output(&mut self, index: usize) -> Result<(), DriverError>;

    /// Closes the open output port, if any.  Idempotent.
    fn close_output(&mut self);

    /// Writes a raw payload to the open output port.
    fn write(&mut self, payload: &[u8]) -> Result<(), DriverError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_out_of_range_error_names_both_indices() {
        let err = DriverError::PortOutOfRange {
            index: 7,
            available: 2,
        };
        let text = err.to_string();
        assert!(text.contains('7'));
        assert!(text.contains('2'));
    }

    #[test]
    fn test_connect_error_carries_reason() {
        let err = DriverError::Connect {
            index: 0,
            reason: "device busy".to_string(),
        };
        assert!(err.to_string().contains("device busy"));
    }
}
