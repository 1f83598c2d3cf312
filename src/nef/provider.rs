//! NexentaStor REST provider
//!
//! Owns the session of one appliance endpoint. Every request goes through
//! [`Provider::do_auth_request`]:
//!
//! ```text
//! send ──► 401/EAUTH ──► log in (once, single-flight) ──► resend ──► 401/EAUTH ──► AuthenticationFailed
//!   │                                                       │
//!   └──────────────────────────┬────────────────────────────┘
//!                              ▼
//!          202 ──► poll jobStatus/<id> every 3s, give up after 60s
//!          >=300 ──► NefError (or UnexpectedResponse without a JSON error)
//!          2xx ──► body
//! ```

use crate::domain::ports::{
    AclRule, CloneSnapshotParams, CreateFilesystemParams, DestroyFilesystemParams, Filesystem,
    License, NefProvider, Pool, RsfCluster, Snapshot, UpdateFilesystemParams,
};
use crate::error::{Error, NefError, Result, CODE_EAUTH, CODE_ENOENT};
use crate::metrics::metrics;
use crate::nef::transport::{build_uri, encode_path, ApplianceResponse, HttpTransport, Transport};
use crate::nef::types::{
    AcceptedBody, CreateNfsShareRequest, CreateSmbShareRequest, DataList, LoginRequest,
    LoginResponse, SmbShare,
};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

// =============================================================================
// Constants
// =============================================================================

/// Authentication endpoint
pub const AUTH_PATH: &str = "auth/login";

/// Prefix of the monitor link returned with 202 Accepted
pub const JOB_STATUS_PREFIX: &str = "/jobStatus/";

/// Delay between two job status polls
pub const JOB_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Longest time to wait for an asynchronous job
pub const JOB_TIMEOUT: Duration = Duration::from_secs(60);

/// Page size used when listing filesystems
const PAGE_LIMIT: usize = 100;

const FILESYSTEM_FIELDS: &str =
    "path,mountPoint,sharedOverNfs,sharedOverSmb,bytesAvailable,bytesUsed,referencedQuotaSize";

const SNAPSHOT_FIELDS: &str = "name,path,parent,clones,creationTxg,creationTime";

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings of one appliance endpoint
#[derive(Clone)]
pub struct ProviderConfig {
    /// Endpoint URL, e.g. `https://10.3.199.252:8443`
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Skip TLS certificate verification
    pub insecure_skip_verify: bool,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"***")
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish()
    }
}

// =============================================================================
// Provider
// =============================================================================

/// Session token plus a counter bumped by every finished login attempt
#[derive(Debug, Default)]
struct Session {
    token: Option<String>,
    generation: u64,
}

/// Session-aware client of one appliance endpoint
pub struct Provider {
    transport: Arc<dyn Transport>,
    username: String,
    password: String,
    session: RwLock<Session>,
    /// Serializes logins so concurrent 401s renew the session once. Holds
    /// the failure of the last login attempt, if it failed.
    login_lock: Mutex<Option<String>>,
    job_poll_interval: Duration,
    job_timeout: Duration,
}

impl Provider {
    /// Create a provider talking HTTP(S) to `config.endpoint`
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.endpoint, config.insecure_skip_verify)?;
        Ok(Self::with_transport(
            Arc::new(transport),
            config.username,
            config.password,
        ))
    }

    /// Create a provider on top of an existing transport
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            username: username.into(),
            password: password.into(),
            session: RwLock::new(Session::default()),
            login_lock: Mutex::new(None),
            job_poll_interval: JOB_POLL_INTERVAL,
            job_timeout: JOB_TIMEOUT,
        }
    }

    /// Override the job polling interval and timeout
    pub fn with_job_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.job_poll_interval = poll_interval;
        self.job_timeout = timeout;
        self
    }

    async fn current_session(&self) -> (Option<String>, u64) {
        let session = self.session.read().await;
        (session.token.clone(), session.generation)
    }

    /// Log in again unless a login attempt finished after `seen` was read.
    /// In that case its outcome is shared instead of logging in once more.
    async fn renew_session(&self, seen: u64) -> Result<()> {
        let mut last_failure = self.login_lock.lock().await;

        if self.session.read().await.generation != seen {
            debug!("{}: session already renewed", self.endpoint());
            return match last_failure.as_ref() {
                Some(reason) => Err(Error::AuthenticationFailed {
                    endpoint: self.endpoint().to_string(),
                    reason: reason.clone(),
                }),
                None => Ok(()),
            };
        }

        metrics()
            .relogins
            .with_label_values(&[self.endpoint()])
            .inc();
        self.login_locked(&mut last_failure).await
    }

    /// Log in while holding `login_lock`, recording the outcome
    async fn login_locked(&self, last_failure: &mut Option<String>) -> Result<()> {
        let outcome = self.authenticate().await;
        *last_failure = outcome.as_ref().err().map(|e| e.to_string());
        if outcome.is_err() {
            self.session.write().await.generation += 1;
        }
        outcome
    }

    async fn authenticate(&self) -> Result<()> {
        debug!("{}: logging in as {}", self.endpoint(), self.username);

        let body = serde_json::to_value(LoginRequest {
            username: &self.username,
            password: &self.password,
        })?;
        let response = self
            .transport
            .send(Method::POST, AUTH_PATH, Some(&body), None)
            .await?;

        if !(200..300).contains(&response.status) {
            let error = self.classify(&Method::POST, AUTH_PATH, &response);
            if error.is_unauthenticated() {
                return Err(Error::AuthenticationFailed {
                    endpoint: self.endpoint().to_string(),
                    reason: error.to_string(),
                });
            }
            return Err(error);
        }

        let login: LoginResponse = response.decode(self.endpoint()).map_err(|_| {
            Error::MalformedResponse {
                endpoint: self.endpoint().to_string(),
                reason: "login response has no token".into(),
            }
        })?;
        {
            let mut session = self.session.write().await;
            session.token = Some(login.token);
            session.generation += 1;
        }

        info!("{}: logged in as {}", self.endpoint(), self.username);
        Ok(())
    }

    fn is_session_expired(&self, response: &ApplianceResponse) -> bool {
        response.status == 401
            && response
                .json_body()
                .and_then(|body| NefError::parse(body, ""))
                .map_or(false, |error| error.code == CODE_EAUTH)
    }

    /// Send with the session token, renewing the session at most once
    async fn send_authenticated(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApplianceResponse> {
        let (token, generation) = self.current_session().await;
        let response = self
            .transport
            .send(method.clone(), path, body, token.as_deref())
            .await?;

        if !self.is_session_expired(&response) {
            return Ok(response);
        }

        debug!("{}: {} {} needs a new session", self.endpoint(), method, path);
        self.renew_session(generation).await?;

        let (token, _) = self.current_session().await;
        let response = self
            .transport
            .send(method.clone(), path, body, token.as_deref())
            .await?;

        if self.is_session_expired(&response) {
            return Err(Error::AuthenticationFailed {
                endpoint: self.endpoint().to_string(),
                reason: format!(
                    "{} {} still unauthorized after login: {}",
                    method,
                    path,
                    response.body_text()
                ),
            });
        }

        Ok(response)
    }

    /// Send an authenticated request and wait for any job it started.
    ///
    /// Returns the response of a synchronous 2xx, or the 202 response once
    /// its job completed.
    pub async fn do_auth_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApplianceResponse> {
        let response = self.send_authenticated(&method, path, body).await?;

        match response.status {
            202 => {
                let job_id = self.job_id(&response)?;
                debug!("{}: {} {} started job {}", self.endpoint(), method, path, job_id);
                self.wait_for_async_job(&job_id).await?;
                Ok(response)
            }
            status if status >= 300 => Err(self.classify(&method, path, &response)),
            _ => Ok(response),
        }
    }

    fn job_id(&self, response: &ApplianceResponse) -> Result<String> {
        let malformed = |reason: String| Error::MalformedResponse {
            endpoint: self.endpoint().to_string(),
            reason,
        };

        let accepted: AcceptedBody = response
            .decode(self.endpoint())
            .map_err(|_| malformed("202 response without links".into()))?;
        let href = accepted
            .monitor_href()
            .ok_or_else(|| malformed("202 response without a monitor link".into()))?;

        href.strip_prefix(JOB_STATUS_PREFIX)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| malformed(format!("unexpected monitor link '{}'", href)))
    }

    /// Check once whether an asynchronous job finished
    pub async fn is_job_done(&self, job_id: &str) -> Result<bool> {
        let path = format!("jobStatus/{}", job_id);
        let response = self.send_authenticated(&Method::GET, &path, None).await?;

        match response.status {
            200 | 201 => Ok(true),
            202 => Ok(false),
            _ => Err(self.classify(&Method::GET, &path, &response)),
        }
    }

    /// Poll a job until it finishes, fails, or the job timeout elapses
    pub async fn wait_for_async_job(&self, job_id: &str) -> Result<()> {
        let poll = async {
            loop {
                tokio::time::sleep(self.job_poll_interval).await;
                if self.is_job_done(job_id).await? {
                    return Ok(());
                }
                debug!("{}: job {} still running", self.endpoint(), job_id);
            }
        };

        let outcome = match tokio::time::timeout(self.job_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(Error::JobTimeout {
                endpoint: self.endpoint().to_string(),
                job_id: job_id.to_string(),
                timeout: self.job_timeout,
            }),
        };

        let label = match &outcome {
            Ok(()) => "done",
            Err(Error::JobTimeout { .. }) => "timeout",
            Err(_) => "failed",
        };
        metrics().async_jobs.with_label_values(&[label]).inc();

        if let Err(e) = &outcome {
            warn!("{}: job {} did not complete: {}", self.endpoint(), job_id, e);
        }
        outcome
    }

    fn classify(&self, method: &Method, path: &str, response: &ApplianceResponse) -> Error {
        let context = format!("{} {} {}", method, self.endpoint(), path);
        response
            .json_body()
            .and_then(|body| NefError::parse(body, &context))
            .map(Error::Nef)
            .unwrap_or_else(|| Error::UnexpectedResponse {
                endpoint: context,
                status: response.status,
                body: response.body_text(),
            })
    }

    fn not_found(&self, kind: &str, path: &str) -> Error {
        Error::Nef(NefError {
            message: format!("{}: {} '{}' not found", self.endpoint(), kind, path),
            code: CODE_ENOENT.to_string(),
        })
    }

    // =========================================================================
    // Typed helpers
    // =========================================================================

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.do_auth_request(Method::GET, path, None)
            .await?
            .decode(self.endpoint())
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        Ok(self.get::<DataList<T>>(path).await?.data)
    }

    async fn send_json<B: Serialize>(&self, method: Method, path: &str, body: &B) -> Result<()> {
        let body = serde_json::to_value(body)?;
        self.do_auth_request(method, path, Some(&body)).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.do_auth_request(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// Promote the clone of the most recent snapshot that has clones
    async fn promote_most_recent_clone(&self, path: &str) -> Result<()> {
        let snapshots = self.get_snapshots(path, false).await?;
        let most_recent = snapshots
            .iter()
            .filter(|snapshot| !snapshot.clones.is_empty())
            .max_by_key(|snapshot| snapshot.creation_txg);

        if let Some(clone) = most_recent.and_then(|snapshot| snapshot.clones.first()) {
            info!("{}: promoting {} before destroying {}", self.endpoint(), clone, path);
            self.promote_filesystem(clone).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl NefProvider for Provider {
    fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    async fn log_in(&self) -> Result<()> {
        let mut last_failure = self.login_lock.lock().await;
        self.login_locked(&mut last_failure).await
    }

    async fn get_pools(&self) -> Result<Vec<Pool>> {
        let uri = build_uri("storage/pools", &[("fields", "poolName,health,status")]);
        self.get_list(&uri).await
    }

    async fn get_filesystem(&self, path: &str) -> Result<Filesystem> {
        let uri = build_uri(
            "storage/filesystems",
            &[("path", path), ("fields", FILESYSTEM_FIELDS)],
        );
        self.get_list::<Filesystem>(&uri)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| self.not_found("filesystem", path))
    }

    async fn get_filesystems(&self, parent: &str) -> Result<Vec<Filesystem>> {
        let limit = PAGE_LIMIT.to_string();
        let mut filesystems = Vec::new();
        let mut offset = 0;

        loop {
            let offset_param = offset.to_string();
            let uri = build_uri(
                "storage/filesystems",
                &[
                    ("parent", parent),
                    ("fields", FILESYSTEM_FIELDS),
                    ("limit", &limit),
                    ("offset", &offset_param),
                ],
            );

            let page = self.get_list::<Filesystem>(&uri).await?;
            let count = page.len();
            filesystems.extend(page.into_iter().filter(|fs| fs.path != parent));

            if count < PAGE_LIMIT {
                break;
            }
            offset += PAGE_LIMIT;
        }

        Ok(filesystems)
    }

    async fn create_filesystem(&self, params: CreateFilesystemParams) -> Result<()> {
        debug!("{}: creating filesystem {}", self.endpoint(), params.path);
        self.send_json(Method::POST, "storage/filesystems", &params).await
    }

    async fn update_filesystem(&self, path: &str, params: UpdateFilesystemParams) -> Result<()> {
        let uri = format!("storage/filesystems/{}", encode_path(path));
        self.send_json(Method::PUT, &uri, &params).await
    }

    async fn destroy_filesystem(&self, path: &str, params: DestroyFilesystemParams) -> Result<()> {
        if params.promote_most_recent_clone {
            self.promote_most_recent_clone(path).await?;
        }

        let snapshots = if params.destroy_snapshots { "true" } else { "false" };
        let uri = build_uri(
            &format!("storage/filesystems/{}", encode_path(path)),
            &[("force", "true"), ("snapshots", snapshots)],
        );
        debug!("{}: destroying filesystem {}", self.endpoint(), path);
        self.delete(&uri).await
    }

    async fn promote_filesystem(&self, path: &str) -> Result<()> {
        let uri = format!("storage/filesystems/{}/promote", encode_path(path));
        self.do_auth_request(Method::POST, &uri, None).await?;
        Ok(())
    }

    async fn get_filesystem_available_capacity(&self, path: &str) -> Result<u64> {
        Ok(self.get_filesystem(path).await?.bytes_available)
    }

    async fn set_filesystem_acl(&self, path: &str, rule: AclRule) -> Result<()> {
        let uri = format!("storage/filesystems/{}/acl", encode_path(path));
        self.send_json(Method::POST, &uri, &rule).await
    }

    async fn create_nfs_share(&self, path: &str) -> Result<()> {
        self.send_json(Method::POST, "nas/nfs", &CreateNfsShareRequest::open(path))
            .await
    }

    async fn delete_nfs_share(&self, path: &str) -> Result<()> {
        self.delete(&format!("nas/nfs/{}", encode_path(path))).await
    }

    async fn create_smb_share(&self, path: &str, share_name: Option<&str>) -> Result<()> {
        let request = CreateSmbShareRequest {
            filesystem: path,
            share_name: share_name.filter(|name| !name.is_empty()),
        };
        self.send_json(Method::POST, "nas/smb", &request).await
    }

    async fn get_smb_share_name(&self, path: &str) -> Result<String> {
        let share: SmbShare = self.get(&format!("nas/smb/{}", encode_path(path))).await?;
        if share.share_name.is_empty() {
            // Appliance default for unnamed shares
            return Ok(path.replace('/', "_"));
        }
        Ok(share.share_name)
    }

    async fn delete_smb_share(&self, path: &str) -> Result<()> {
        self.delete(&format!("nas/smb/{}", encode_path(path))).await
    }

    async fn create_snapshot(&self, path: &str) -> Result<()> {
        debug!("{}: creating snapshot {}", self.endpoint(), path);
        self.send_json(Method::POST, "storage/snapshots", &serde_json::json!({ "path": path }))
            .await
    }

    async fn get_snapshot(&self, path: &str) -> Result<Snapshot> {
        let uri = build_uri(
            "storage/snapshots",
            &[("path", path), ("fields", SNAPSHOT_FIELDS)],
        );
        self.get_list::<Snapshot>(&uri)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| self.not_found("snapshot", path))
    }

    async fn get_snapshots(&self, parent: &str, recursive: bool) -> Result<Vec<Snapshot>> {
        let recursive = if recursive { "true" } else { "false" };
        let uri = build_uri(
            "storage/snapshots",
            &[
                ("parent", parent),
                ("fields", SNAPSHOT_FIELDS),
                ("recursive", recursive),
            ],
        );
        self.get_list(&uri).await
    }

    async fn destroy_snapshot(&self, path: &str) -> Result<()> {
        debug!("{}: destroying snapshot {}", self.endpoint(), path);
        self.delete(&format!("storage/snapshots/{}", encode_path(path)))
            .await
    }

    async fn clone_snapshot(&self, snapshot_path: &str, params: CloneSnapshotParams) -> Result<()> {
        debug!(
            "{}: cloning {} into {}",
            self.endpoint(),
            snapshot_path,
            params.target_path
        );
        let uri = format!("storage/snapshots/{}/clone", encode_path(snapshot_path));
        self.send_json(Method::POST, &uri, &params).await
    }

    async fn get_license(&self) -> Result<License> {
        self.get(&build_uri("settings/license", &[("fields", "valid,expires")]))
            .await
    }

    async fn get_rsf_clusters(&self) -> Result<Vec<RsfCluster>> {
        self.get_list("rsf/clusters").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn eauth() -> ApplianceResponse {
        ApplianceResponse::json(
            401,
            json!({"name": "AuthError", "message": "token expired", "code": "EAUTH"}),
        )
    }

    fn token(value: &str) -> ApplianceResponse {
        ApplianceResponse::json(200, json!({ "token": value }))
    }

    fn accepted(job: &str) -> ApplianceResponse {
        ApplianceResponse::json(
            202,
            json!({"links": [{"rel": "monitor", "href": format!("/jobStatus/{}", job)}]}),
        )
    }

    fn provider(transport: &Arc<ScriptedTransport>) -> Provider {
        Provider::with_transport(transport.clone(), "admin", "secret")
    }

    #[tokio::test]
    async fn test_relogin_then_retry_succeeds() {
        let transport = ScriptedTransport::new(|call| match call.path.as_str() {
            AUTH_PATH => token("t1"),
            _ if call.attempt == 0 => eauth(),
            _ => ApplianceResponse::json(200, json!({"data": [{"poolName": "pool1"}]})),
        });
        let provider = provider(&transport);

        let pools = provider.get_pools().await.unwrap();

        assert_eq!(pools[0].pool_name, "pool1");
        assert_eq!(transport.count(AUTH_PATH), 1);
        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].token, None);
        assert_eq!(calls[2].token.as_deref(), Some("t1"));
        assert_eq!(
            calls[1].body,
            Some(json!({"username": "admin", "password": "secret"}))
        );
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_terminal() {
        let transport = ScriptedTransport::new(|call| match call.path.as_str() {
            AUTH_PATH => token("t1"),
            _ => eauth(),
        });
        let provider = provider(&transport);

        let result = provider.get_pools().await;

        assert_matches!(result, Err(Error::AuthenticationFailed { .. }));
        assert_eq!(transport.count(AUTH_PATH), 1);
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_login_failure_is_returned_immediately() {
        let transport = ScriptedTransport::new(|_| eauth());
        let provider = provider(&transport);

        let result = provider.get_license().await;

        assert_matches!(result, Err(Error::AuthenticationFailed { .. }));
        assert_eq!(transport.count(AUTH_PATH), 1);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_unauthorized_requests_login_once() {
        let transport = ScriptedTransport::new(|call| match call.path.as_str() {
            AUTH_PATH => token("t1"),
            _ if call.token.is_none() => eauth(),
            _ => ApplianceResponse::json(200, json!({"data": []})),
        })
        .yielding();
        let provider = provider(&transport);

        let (a, b) = tokio::join!(provider.get_pools(), provider.get_rsf_clusters());

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(transport.count(AUTH_PATH), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_failed_login() {
        let transport = ScriptedTransport::new(|_| eauth()).yielding();
        let provider = provider(&transport);

        let (a, b, c) = tokio::join!(
            provider.get_pools(),
            provider.get_license(),
            provider.get_rsf_clusters()
        );

        assert_matches!(a, Err(Error::AuthenticationFailed { .. }));
        assert_matches!(b, Err(Error::AuthenticationFailed { .. }));
        assert_matches!(c, Err(Error::AuthenticationFailed { .. }));
        assert_eq!(transport.count(AUTH_PATH), 1);
    }

    #[tokio::test]
    async fn test_login_is_retried_after_earlier_failure() {
        let transport = ScriptedTransport::new(|call| match call.path.as_str() {
            AUTH_PATH if call.attempt == 0 => eauth(),
            AUTH_PATH => token("t2"),
            _ if call.token.is_none() => eauth(),
            _ => ApplianceResponse::json(200, json!({"data": []})),
        });
        let provider = provider(&transport);

        assert!(provider.get_pools().await.is_err());
        assert!(provider.get_pools().await.is_ok());
        assert_eq!(transport.count(AUTH_PATH), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_job_is_polled_to_completion() {
        let transport = ScriptedTransport::new(|call| match call.path.as_str() {
            "storage/filesystems" => accepted("job-1"),
            "jobStatus/job-1" if call.attempt < 2 => ApplianceResponse::json(202, json!({})),
            "jobStatus/job-1" => ApplianceResponse::json(200, json!({"done": true})),
            _ => ApplianceResponse::json(500, json!({})),
        });
        let provider = provider(&transport);
        let start = tokio::time::Instant::now();

        provider
            .create_filesystem(CreateFilesystemParams {
                path: "pool/ds/pvc-1".into(),
                referenced_quota_size: Some(1024),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(transport.count("jobStatus/job-1"), 3);
        assert!(start.elapsed() >= JOB_POLL_INTERVAL * 3);
        assert_eq!(
            transport.calls()[0].body,
            Some(json!({"path": "pool/ds/pvc-1", "referencedQuotaSize": 1024}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_job_times_out() {
        let transport = ScriptedTransport::new(|call| match call.path.as_str() {
            "storage/snapshots" => accepted("slow"),
            _ => ApplianceResponse::json(202, json!({})),
        });
        let provider = provider(&transport);
        let start = tokio::time::Instant::now();

        let result = provider.create_snapshot("pool/fs@s1").await;

        assert_matches!(result, Err(Error::JobTimeout { ref job_id, .. }) if job_id == "slow");
        let elapsed = start.elapsed();
        assert!(elapsed >= JOB_TIMEOUT);
        assert!(elapsed < JOB_TIMEOUT + JOB_POLL_INTERVAL);

        let polls = transport.count("jobStatus/slow");
        assert!(polls >= 1);
        assert!(polls as u32 <= JOB_TIMEOUT.as_secs() as u32 / JOB_POLL_INTERVAL.as_secs() as u32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_is_classified() {
        let transport = ScriptedTransport::new(|call| match call.path.as_str() {
            "storage/snapshots" => accepted("j"),
            _ => ApplianceResponse::json(
                500,
                json!({"name": "JobError", "message": "dataset busy", "code": "EBUSY"}),
            ),
        });
        let provider = provider(&transport);

        let err = provider.create_snapshot("pool/fs@s1").await.unwrap_err();
        assert!(err.is_busy());
    }

    #[tokio::test]
    async fn test_accepted_without_monitor_link() {
        let transport = ScriptedTransport::new(|_| {
            ApplianceResponse::json(202, json!({"links": [{"rel": "self", "href": "/x"}]}))
        });
        let provider = provider(&transport);

        let result = provider.promote_filesystem("pool/fs").await;
        assert_matches!(result, Err(Error::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_error_classification() {
        let transport = ScriptedTransport::new(|call| {
            if call.path.starts_with("storage/filesystems/") {
                ApplianceResponse::json(
                    404,
                    json!({"name": "NotFound", "message": "no such dataset", "code": "ENOENT"}),
                )
            } else {
                ApplianceResponse::new(502, crate::nef::ResponseBody::Raw("bad gateway".into()))
            }
        });
        let provider = provider(&transport);

        let err = provider
            .update_filesystem("pool/fs", UpdateFilesystemParams::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("no such dataset"));

        let err = provider.get_pools().await.unwrap_err();
        assert_matches!(err, Error::UnexpectedResponse { status: 502, ref body, .. } if body == "bad gateway");
    }

    #[tokio::test]
    async fn test_get_filesystem_not_found_on_empty_list() {
        let transport = ScriptedTransport::new(|_| ApplianceResponse::json(200, json!({"data": []})));
        let provider = provider(&transport);

        let err = provider.get_filesystem("pool/missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            transport.calls()[0].path,
            "storage/filesystems?fields=path%2CmountPoint%2CsharedOverNfs%2CsharedOverSmb%2CbytesAvailable%2CbytesUsed%2CreferencedQuotaSize&path=pool%2Fmissing"
        );
    }

    #[tokio::test]
    async fn test_get_filesystems_pages_and_skips_parent() {
        let transport = ScriptedTransport::new(|call| {
            let data: Vec<Value> = if call.path.contains("offset=0") {
                std::iter::once(json!({"path": "pool/ds"}))
                    .chain((0..99).map(|i| json!({ "path": format!("pool/ds/fs-{:03}", i) })))
                    .collect()
            } else {
                vec![json!({"path": "pool/ds/fs-099"})]
            };
            ApplianceResponse::json(200, json!({ "data": data }))
        });
        let provider = provider(&transport);

        let filesystems = provider.get_filesystems("pool/ds").await.unwrap();

        assert_eq!(filesystems.len(), 100);
        assert!(filesystems.iter().all(|fs| fs.path != "pool/ds"));
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_destroy_promotes_most_recent_clone() {
        let transport = ScriptedTransport::new(|call| {
            if call.path.starts_with("storage/snapshots?") {
                ApplianceResponse::json(
                    200,
                    json!({"data": [
                        {"path": "pool/fs@old", "name": "old", "parent": "pool/fs",
                         "clones": ["pool/clone-old"], "creationTxg": "10",
                         "creationTime": "2024-01-01T00:00:00Z"},
                        {"path": "pool/fs@new", "name": "new", "parent": "pool/fs",
                         "clones": ["pool/clone-new"], "creationTxg": "20",
                         "creationTime": "2024-02-01T00:00:00Z"},
                        {"path": "pool/fs@none", "name": "none", "parent": "pool/fs",
                         "clones": [], "creationTxg": "30",
                         "creationTime": "2024-03-01T00:00:00Z"},
                    ]}),
                )
            } else {
                ApplianceResponse::new(200, crate::nef::ResponseBody::Empty)
            }
        });
        let provider = provider(&transport);

        provider
            .destroy_filesystem(
                "pool/fs",
                DestroyFilesystemParams {
                    destroy_snapshots: true,
                    promote_most_recent_clone: true,
                },
            )
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls[1].method, Method::POST);
        assert_eq!(calls[1].path, "storage/filesystems/pool%2Fclone-new/promote");
        assert_eq!(calls[2].method, Method::DELETE);
        assert_eq!(
            calls[2].path,
            "storage/filesystems/pool%2Ffs?force=true&snapshots=true"
        );
    }

    #[tokio::test]
    async fn test_smb_share_name_falls_back_to_path() {
        let transport = ScriptedTransport::new(|_| ApplianceResponse::json(200, json!({})));
        let provider = provider(&transport);

        let name = provider.get_smb_share_name("pool/ds/fs").await.unwrap();
        assert_eq!(name, "pool_ds_fs");
    }
}
