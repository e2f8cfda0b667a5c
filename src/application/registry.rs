//! Session registry: one live [`Session`] per WebSocket connection.
//!
//! The registry is the only cross-connection shared mutable state in the
//! gateway.  It is an arena keyed by an opaque connection identity: the
//! server inserts on connection-open, every inbound message handler looks
//! up, and connection-close removes.  Each entry is an
//! `Arc<tokio::sync::Mutex<Session>>`, so a slow operation in one session
//! (a resend wait) never blocks dispatch for another, and an in-flight
//! operation may finish even after its entry has been removed — the task
//! holds its own `Arc`.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::adapter::SysexAdapter;
use crate::application::driver::MidiDriver;
use crate::domain::config::ResendPolicy;
use crate::domain::messages::ServerMessage;

/// Opaque, comparable identity of one live connection.
///
/// Used only as a lookup key; invalidated on disconnect.
pub type ConnectionId = Uuid;

/// Server-side state for one live client connection.
pub struct Session {
    /// The connection this session belongs to.
    pub id: ConnectionId,
    /// The exclusively-owned hardware adapter.  Destroyed (closing all open
    /// ports) with the session.
    pub adapter: SysexAdapter,
    /// Debug verbosity for this session's request handling.
    pub debug: bool,
}

/// Shared handle to a session, independent of its registry entry.
pub type SessionHandle = std::sync::Arc<tokio::sync::Mutex<Session>>;

/// Tracks the set of live sessions keyed by connection identity.
///
/// Insert/remove/lookup are the only operations, so a plain `std::sync`
/// mutex suffices — nothing awaits while holding the map lock.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConnectionId, SessionHandle>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and stores a new session for `id`, constructing its adapter
    /// around `driver`.
    ///
    /// Hardware that cannot be acquired does not fail this call: the
    /// session exists regardless, and its adapter's operations fail
    /// gracefully afterwards.
    pub fn connect(
        &self,
        id: ConnectionId,
        driver: Box<dyn MidiDriver + Send>,
        policy: ResendPolicy,
        push: UnboundedSender<ServerMessage>,
        debug: bool,
    ) -> SessionHandle {
        let session = std::sync::Arc::new(tokio::sync::Mutex::new(Session {
            id,
            adapter: SysexAdapter::new(driver, policy, push, debug),
            debug,
        }));
        self.sessions
            .lock()
            .expect("session map lock poisoned")
            .insert(id, std::sync::Arc::clone(&session));
        info!(%id, sessions = self.len(), "session created");
        session
    }

    /// Removes and destroys the session for `id`, releasing its ports once
    /// the last outstanding handle drops.
    ///
    /// Returns `false` when no session was registered under `id`.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let removed = self
            .sessions
            .lock()
            .expect("session map lock poisoned")
            .remove(&id)
            .is_some();
        if removed {
            info!(%id, sessions = self.len(), "session destroyed");
        } else {
            debug!(%id, "disconnect for unknown session");
        }
        removed
    }

    /// Looks up the session for `id`.
    ///
    /// A miss is the "invalid connection" error condition; callers log and
    /// drop the request — never a panic.
    pub fn lookup(&self, id: ConnectionId) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .expect("session map lock poisoned")
            .get(&id)
            .cloned()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session map lock poisoned").len()
    }

    /// `true` when no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::midi::mock::MockMidiDriver;
    use tokio::sync::mpsc;

    fn connect_mock(registry: &SessionRegistry, id: ConnectionId) -> SessionHandle {
        let (push_tx, _push_rx) = mpsc::unbounded_channel();
        registry.connect(
            id,
            Box::new(MockMidiDriver::new(&["In"], &["Out"])),
            ResendPolicy::default(),
            push_tx,
            false,
        )
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_connect_registers_session_under_its_id() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();

        connect_mock(&registry, id);

        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(id).is_some());
    }

    #[test]
    fn test_lookup_of_unknown_id_returns_none() {
        let registry = SessionRegistry::new();
        connect_mock(&registry, Uuid::new_v4());

        assert!(registry.lookup(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_disconnect_removes_session() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        connect_mock(&registry, id);

        assert!(registry.disconnect(id));

        assert!(registry.is_empty());
        assert!(registry.lookup(id).is_none());
    }

    #[test]
    fn test_disconnect_of_unknown_id_is_not_an_error() {
        let registry = SessionRegistry::new();
        assert!(!registry.disconnect(Uuid::new_v4()));
    }

    #[test]
    fn test_sessions_are_isolated_per_connection() {
        // Two connections get two distinct adapters — exclusive ownership.
        let registry = SessionRegistry::new();
        let (id_a, id_b) = (Uuid::new_v4(), Uuid::new_v4());
        connect_mock(&registry, id_a);
        connect_mock(&registry, id_b);

        let a = registry.lookup(id_a).unwrap();
        let b = registry.lookup(id_b).unwrap();
        assert!(!std::sync::Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_handle_outlives_registry_removal() {
        // A task holding the Arc may finish its work after disconnect.
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let handle = connect_mock(&registry, id);

        registry.disconnect(id);

        let session = handle.lock().await;
        assert_eq!(session.id, id);
    }
}
