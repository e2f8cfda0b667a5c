//! Domain layer: pure types shared by the application and infrastructure
//! layers.

pub mod config;
pub mod messages;

pub use config::{GatewayConfig, ResendPolicy};
pub use messages::{ClientRequest, PortDescriptor, PortList, ServerMessage};
