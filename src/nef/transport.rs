//! JSON-over-HTTP transport for one appliance endpoint
//!
//! No business logic lives here: a request goes out, a status code and a
//! decoded body come back. Session handling and job polling belong to the
//! provider.

use crate::error::{Error, Result};
use crate::metrics::{metrics, status_class};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Timeout for a single request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle keep-alive connections are dropped after this long
pub const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Response
// =============================================================================

/// Body of an appliance response, decoded once
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// No content
    Empty,
    /// JSON document
    Json(Value),
    /// Body that is not JSON; kept verbatim for error reporting
    Raw(String),
}

/// Status code and body of one appliance response
#[derive(Debug, Clone, PartialEq)]
pub struct ApplianceResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl ApplianceResponse {
    pub fn new(status: u16, body: ResponseBody) -> Self {
        Self { status, body }
    }

    /// Response with a JSON body
    pub fn json(status: u16, body: Value) -> Self {
        Self::new(status, ResponseBody::Json(body))
    }

    /// JSON body, if any
    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Decode the JSON body into a typed struct
    pub fn decode<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        match &self.body {
            ResponseBody::Json(value) => Ok(T::deserialize(value)?),
            ResponseBody::Empty => Err(Error::MalformedResponse {
                endpoint: endpoint.to_string(),
                reason: "empty response body".into(),
            }),
            ResponseBody::Raw(raw) => Err(Error::MalformedResponse {
                endpoint: endpoint.to_string(),
                reason: format!("body is not JSON: {}", raw),
            }),
        }
    }

    /// Body rendered for error messages
    pub fn body_text(&self) -> String {
        match &self.body {
            ResponseBody::Empty => String::new(),
            ResponseBody::Json(value) => value.to_string(),
            ResponseBody::Raw(raw) => raw.clone(),
        }
    }
}

// =============================================================================
// Transport Port
// =============================================================================

/// Sends one request to a fixed endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// Endpoint URL requests are sent to
    fn endpoint(&self) -> &str;

    /// Send a request; `token` becomes a bearer `Authorization` header
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<ApplianceResponse>;
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// reqwest-backed transport
pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport bound to `endpoint`.
    ///
    /// With `insecure_skip_verify` the appliance certificate is not
    /// verified; appliances ship self-signed certificates.
    pub fn new(endpoint: &str, insecure_skip_verify: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(IDLE_CONNECTION_TIMEOUT)
            .danger_accept_invalid_certs(insecure_skip_verify)
            .build()?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<ApplianceResponse> {
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body.filter(|b| !is_empty_body(b)) {
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;

        metrics()
            .appliance_requests
            .with_label_values(&[method.as_str(), status_class(status)])
            .inc();

        let body = if bytes.is_empty() {
            ResponseBody::Empty
        } else {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => ResponseBody::Json(value),
                Err(_) => ResponseBody::Raw(String::from_utf8_lossy(&bytes).into_owned()),
            }
        };

        debug!("{} {} -> {}", method, url, status);
        Ok(ApplianceResponse { status, body })
    }
}

fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

// =============================================================================
// URI Builder
// =============================================================================

/// Append a query string to `path`.
///
/// Parameters are sorted by key and empty values are dropped; `path` is
/// returned unchanged when nothing remains.
pub fn build_uri(path: &str, params: &[(&str, &str)]) -> String {
    let sorted: BTreeMap<&str, &str> = params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .copied()
        .collect();

    if sorted.is_empty() {
        return path.to_string();
    }

    let query = sorted
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{}?{}", path, query)
}

/// Encode a dataset or snapshot path as a single URL segment
pub fn encode_path(path: &str) -> String {
    urlencoding::encode(path).into_owned()
}
