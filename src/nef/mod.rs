//! NexentaStor REST (NEF) client
//!
//! [`Transport`] moves requests over HTTPS and decodes bodies once at the
//! boundary; [`Provider`] adds the session and async-job protocol on top
//! and implements [`NefProvider`](crate::domain::ports::NefProvider).

pub mod provider;
pub mod transport;
pub mod types;

pub use provider::{
    Provider, ProviderConfig, AUTH_PATH, JOB_POLL_INTERVAL, JOB_STATUS_PREFIX, JOB_TIMEOUT,
};
pub use transport::{
    build_uri, encode_path, ApplianceResponse, HttpTransport, ResponseBody, Transport,
    IDLE_CONNECTION_TIMEOUT, REQUEST_TIMEOUT,
};
