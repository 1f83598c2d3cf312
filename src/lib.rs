//! NexentaStor CSI Driver - Control Plane
//!
//! Provisions NexentaStor filesystems, snapshots and NFS/SMB shares for a
//! container orchestrator, across one or more appliances (single boxes or
//! RSF HA pairs).
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                  REST API (axum)  /healthz /metrics           │
//! ├───────────────────────────────────────────────────────────────┤
//! │                         Orchestrator                          │
//! │   create/delete/expand volume, snapshots, paged listing       │
//! ├───────────────────────────────────────────────────────────────┤
//! │          Backend Set (atomically published on reload)         │
//! │   ┌──────────────────┐  ┌──────────────────┐                  │
//! │   │ Resolver box1    │  │ Resolver box2    │   ...            │
//! │   │ [Provider, ...]  │  │ [Provider]       │                  │
//! │   └──────────────────┘  └──────────────────┘                  │
//! ├───────────────────────────────────────────────────────────────┤
//! │   Provider: session, 401 re-login, 202 async-job polling      │
//! │   Transport: HTTPS + JSON decoding                            │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Resolvers, orchestrator and REST API
//! - [`nef`]: NexentaStor REST client
//! - [`domain`]: Identifiers and the appliance capability trait
//! - [`config`]: Configuration file and reloading
//! - [`error`]: Error types and classification
//! - [`metrics`]: Prometheus counters

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod nef;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{BackendConfig, ConfigLoader, DriverConfig, MountFsType};

pub use controlplane::{
    ApiServer, ApiServerConfig, BackendRegistry, BackendSet, CreateVolumeRequest, Orchestrator,
    Page, Resolver, Volume, VolumeParameters, VolumeSnapshot, VolumeSource,
};

pub use domain::identity::Identifier;
pub use domain::ports::{NefProvider, NefProviderRef};

pub use error::{Error, NefError, Result, RpcCode};

pub use nef::{Provider, ProviderConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
