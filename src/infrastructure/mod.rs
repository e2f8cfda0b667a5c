//! Infrastructure layer: WebSocket transport and MIDI driver backends.

pub mod midi;
pub mod ws_server;

pub use ws_server::{run_server, DriverFactory};
