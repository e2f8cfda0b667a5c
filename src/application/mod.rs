//! Application layer: the session/hardware-bridge engine.
//!
//! This layer holds everything with real invariants — exclusive port
//! ownership, the pending-send state machine, retry timing, and the JSON
//! control-protocol dispatch.  Hardware access goes through the
//! [`driver::MidiDriver`] trait so the engine can be exercised against the
//! mock backend without physical MIDI hardware.

pub mod adapter;
pub mod dispatcher;
pub mod driver;
pub mod registry;
pub mod resend;

pub use adapter::SysexAdapter;
pub use dispatcher::{handle_inbound, GatewayError};
pub use driver::{DriverError, MidiDriver, ReceiveHandler};
pub use registry::{ConnectionId, Session, SessionRegistry};
pub use resend::{PendingSend, ResendController, SendState};
