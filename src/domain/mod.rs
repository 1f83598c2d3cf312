//! Domain layer - Core types and port definitions
//!
//! Defines the appliance capability trait (port) implemented by the NEF
//! client and the identifier protocol shared with the orchestrator.

pub mod identity;
pub mod ports;

pub use identity::*;
pub use ports::*;
