//! MIDI driver backends implementing [`crate::application::MidiDriver`].
//!
//! `midir_backend` talks to real hardware through the cross-platform
//! `midir` library; `mock` records every call in memory for tests.

pub mod midir_backend;
pub mod mock;

pub use midir_backend::MidirBackend;
pub use mock::MockMidiDriver;
