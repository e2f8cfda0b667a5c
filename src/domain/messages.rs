//! JSON message types for the client-facing WebSocket protocol.
//!
//! Every message is a JSON object with a `"type"` field that identifies the
//! variant; all other fields are flattened into the same object.  Serde's
//! `#[serde(tag = "type")]` attribute handles this automatically:
//!
//! ```json
//! {"type":"send","token":"...","port":"0","data":"8DcA9w==","resend":"false"}
//! ```
//!
//! # Wire compatibility notes
//!
//! - Every inbound field is a string, including `port` and `resend`.  The
//!   dispatcher parses them; a parse failure is a per-request failure, never
//!   a protocol error.
//! - The reply to an `inport` request carries `"type":"send"` — a quirk of
//!   the deployed protocol that existing clients depend on.  It is preserved
//!   here, not fixed.

use serde::{Deserialize, Serialize};

// ── Client → Gateway messages ─────────────────────────────────────────────────

/// All requests a client can send to the gateway over WebSocket.
///
/// Each variant carries the shared-secret `token`; requests with a
/// non-matching token are dropped without a reply.
///
/// # Serde representation
///
/// ```json
/// {"type":"query","token":"T"}
/// {"type":"inport","token":"T","port":"1"}
/// {"type":"send","token":"T","port":"0","data":"8DcA9w==","resend":"true"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientRequest {
    /// Enumerate the currently attached MIDI input and output ports.
    Query {
        /// Shared secret; must equal the configured gateway token.
        token: String,
    },

    /// Select the MIDI input port from which to receive messages.
    Inport {
        token: String,
        /// Port index as a string-encoded non-negative integer, matching an
        /// index into the `inports` list of a prior `query` reply.
        port: String,
    },

    /// Send a SysEx message on a given MIDI output port.
    Send {
        token: String,
        /// Port index as a string-encoded non-negative integer.
        port: String,
        /// The SysEx payload, base64-encoded.
        data: String,
        /// `"true"` to wait for a device acknowledgment and re-transmit if
        /// none arrives; any other value disables the resend wait.
        resend: String,
    },
}

impl ClientRequest {
    /// Returns the `token` field common to every request variant.
    pub fn token(&self) -> &str {
        match self {
            ClientRequest::Query { token }
            | ClientRequest::Inport { token, .. }
            | ClientRequest::Send { token, .. } => token,
        }
    }
}

// ── Gateway → Client messages ─────────────────────────────────────────────────

/// All messages the gateway sends to a client over WebSocket.
///
/// `Query` and `Send` are replies to requests; the `Midi*` variants are
/// asynchronous pushes driven by hardware events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Reply to a `query` request: the current port snapshot.
    Query {
        /// Input and output port listings at the time of the request.
        data: PortList,
    },

    /// Boolean outcome of an `inport` or `send` request.
    Send {
        /// `"true"` or `"false"`.
        data: String,
    },

    /// A SysEx message received on the session's input port.
    #[serde(rename = "midimessage")]
    MidiMessage {
        /// The received payload, base64-encoded.
        data: String,
    },

    /// A hardware error reported on the input direction.
    #[serde(rename = "midierrorin")]
    MidiErrorIn {
        /// Human-readable error text.
        data: String,
    },

    /// A hardware error reported on the output direction.
    #[serde(rename = "midierrorout")]
    MidiErrorOut {
        /// Human-readable error text.
        data: String,
    },
}

// ── Port listing types ────────────────────────────────────────────────────────

/// Snapshot of the attached MIDI ports in both directions.
///
/// Never cached: physical ports may appear or disappear between requests, so
/// each `query` re-enumerates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortList {
    /// Input ports, in driver index order.
    pub inports: Vec<PortDescriptor>,
    /// Output ports, in driver index order.
    pub outports: Vec<PortDescriptor>,
}

/// One physical MIDI port, addressed on the wire by its position in the
/// enclosing list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// Human-readable port name as reported by the driver.
    pub name: String,
}

impl PortDescriptor {
    /// Creates a descriptor from any string-ish name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
