//! sysexd library crate.
//!
//! sysexd exposes a locally attached MIDI System-Exclusive (SysEx) device to
//! network clients over persistent WebSocket connections.  Clients
//! authenticate with a shared secret token, enumerate and select physical
//! MIDI ports, and exchange binary SysEx payloads as base64-encoded JSON
//! text frames.
//!
//! # Architecture
//!
//! ```text
//! Client (JSON over WebSocket)
//!         ↕
//! [sysexd]
//!   ├── domain/           Pure types: wire message enums, GatewayConfig
//!   ├── application/      Session registry, SysEx adapter, dispatcher,
//!   │                     resend controller, MidiDriver trait
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop (tokio-tungstenite)
//!         └── midi/       midir backend + mock backend
//!         ↕
//! MIDI hardware (SysEx over a physical in/out port pair)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies beyond serde (no I/O, no async).
//! - `application` depends on `domain` and the `MidiDriver` trait it defines.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tungstenite`, and `midir`.

/// Domain layer: pure business-logic types (no I/O).
pub mod domain;

/// Application layer: sessions, dispatch, and the hardware adapter.
pub mod application;

/// Infrastructure layer: WebSocket server and MIDI driver backends.
pub mod infrastructure;
