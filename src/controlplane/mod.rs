//! Control Plane Module
//!
//! Backend resolution and the volume lifecycle operations built on it,
//! exposed through a small REST API.

pub mod api;
pub mod backends;
pub mod orchestrator;
pub mod pagination;
pub mod resolver;

pub use api::*;
pub use backends::*;
pub use orchestrator::*;
pub use pagination::*;
pub use resolver::*;
