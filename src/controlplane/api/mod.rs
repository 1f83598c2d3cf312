//! API Module
//!
//! REST facade over the orchestrator, plus health and metrics endpoints.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
