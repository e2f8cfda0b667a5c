//! The JSON control-protocol dispatcher.
//!
//! [`handle_inbound`] is the single entry point for every text frame a
//! connection delivers: parse, authenticate, route to one of the three
//! operations (`query`, `inport`, `send`), and build the reply.
//!
//! # Drop semantics
//!
//! Malformed input produces no reply at all — not an error reply.  The
//! same holds for an unknown connection and for a bad token (nothing is
//! leaked about why a request was ignored).  Only authenticated requests
//! that reached an operation get a reply, and that reply reports failure
//! through a boolean field, never through a propagated fault.

use thiserror::Error;
use tracing::{debug, warn};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::application::registry::{ConnectionId, Session, SessionRegistry};
use crate::domain::config::GatewayConfig;
use crate::domain::messages::{ClientRequest, ServerMessage};

// ── Error taxonomy ────────────────────────────────────────────────────────────

/// Everything that can go wrong while handling one inbound request.
///
/// None of these are fatal to the process; each is logged and either drops
/// the request or turns into a `data:"false"` reply.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unparseable JSON or a missing required field.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A request arrived for an identity with no registered session.
    #[error("invalid connection: {0}")]
    InvalidConnection(ConnectionId),

    /// The request's token did not match the configured shared secret.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// A `port` field was not a non-negative integer.
    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    /// A `data` field was not valid base64.
    #[error("base64 decode failure: {0}")]
    DecodeFailure(String),

    /// The driver reported a failure during open or send.
    #[error("hardware failure: {0}")]
    HardwareFailure(#[from] crate::application::driver::DriverError),
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Handles one inbound text frame for connection `id`.
///
/// Returns the reply to deliver to the same connection, or `None` when the
/// request was dropped (malformed, unknown connection, bad token).
pub async fn handle_inbound(
    registry: &SessionRegistry,
    config: &GatewayConfig,
    id: ConnectionId,
    raw: &str,
) -> Option<ServerMessage> {
    // 1. Parse.  A failure here covers bad JSON, a missing field, and an
    //    unknown `type` — all dropped without a reply.
    let request: ClientRequest = match serde_json::from_str(raw) {
        Ok(request) => request,
        Err(e) => {
            if config.debug {
                debug!(%id, error = %GatewayError::MalformedMessage(e.to_string()), "dropping request");
            }
            return None;
        }
    };

    // 2. Look up the session.
    let session = match registry.lookup(id) {
        Some(session) => session,
        None => {
            warn!(error = %GatewayError::InvalidConnection(id), "dropping request");
            return None;
        }
    };
    let mut session = session.lock().await;

    // 3. Authenticate.  Nothing is revealed on mismatch.
    if request.token() != config.token {
        if session.debug {
            debug!(%id, error = %GatewayError::AuthenticationFailed, "dropping request");
        }
        return None;
    }

    // 4. Dispatch.
    Some(dispatch(&mut session, request).await)
}

/// Routes an authenticated request to its operation and builds the reply.
async fn dispatch(session: &mut Session, request: ClientRequest) -> ServerMessage {
    match request {
        ClientRequest::Query { .. } => ServerMessage::Query {
            data: session.adapter.enumerate_ports(),
        },

        // The `"send"` reply type for an `inport` request is a preserved
        // wire-protocol quirk; see domain::messages.
        ClientRequest::Inport { port, .. } => ServerMessage::Send {
            data: bool_reply(handle_inport(session, &port)),
        },

        ClientRequest::Send {
            port, data, resend, ..
        } => ServerMessage::Send {
            data: bool_reply(handle_send(session, &port, &data, &resend).await),
        },
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

/// `inport`: select the input port to receive from.
fn handle_inport(session: &mut Session, port: &str) -> bool {
    match parse_port(port) {
        Ok(index) => session.adapter.open_input_port(index),
        Err(e) => {
            warn!(error = %e, "inport request rejected");
            false
        }
    }
}

/// `send`: deliver a base64 SysEx payload to an output port.
///
/// Reports `true` once the message was accepted and dispatched; a
/// driver-level send failure after that point is logged (and pushed as
/// `midierrorout` by the adapter) without flipping the reply — delivery
/// confirmation is the resend mechanism's concern, not this reply's.
async fn handle_send(session: &mut Session, port: &str, data: &str, resend: &str) -> bool {
    let index = match parse_port(port) {
        Ok(index) => index,
        Err(e) => {
            warn!(error = %e, "send request rejected");
            return false;
        }
    };

    session.adapter.ensure_port_opened(index);

    let payload = match BASE64.decode(data) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %GatewayError::DecodeFailure(e.to_string()), "send request rejected");
            return false;
        }
    };
    let resend = resend == "true";

    if session.debug {
        debug!(len = payload.len(), resend, "sending sysex message");
    }
    if let Err(e) = session.adapter.send_message(&payload, resend).await {
        warn!(error = %GatewayError::from(e), "sysex send failed");
    }
    true
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Parses the string-encoded, non-negative port index.
fn parse_port(raw: &str) -> Result<usize, GatewayError> {
    raw.parse::<usize>()
        .map_err(|_| GatewayError::InvalidPort(raw.to_string()))
}

fn bool_reply(ok: bool) -> String {
    if ok { "true" } else { "false" }.to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_accepts_plain_integers() {
        assert_eq!(parse_port("0").unwrap(), 0);
        assert_eq!(parse_port("12").unwrap(), 12);
    }

    #[test]
    fn test_parse_port_rejects_negative_and_garbage() {
        assert!(matches!(
            parse_port("-1"),
            Err(GatewayError::InvalidPort(_))
        ));
        assert!(matches!(
            parse_port("zero"),
            Err(GatewayError::InvalidPort(_))
        ));
        assert!(matches!(parse_port(""), Err(GatewayError::InvalidPort(_))));
    }

    #[test]
    fn test_bool_reply_strings() {
        assert_eq!(bool_reply(true), "true");
        assert_eq!(bool_reply(false), "false");
    }
}
