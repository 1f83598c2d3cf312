//! Test doubles for the transport and provider ports

use crate::config::BackendConfig;
use crate::domain::ports::{
    AclRule, CloneSnapshotParams, CreateFilesystemParams, DestroyFilesystemParams, Filesystem,
    License, NefProvider, Pool, RsfCluster, RsfNode, Snapshot, UpdateFilesystemParams,
};
use crate::error::{Error, NefError, Result, CODE_EBUSY, CODE_EEXIST, CODE_ENOENT};
use crate::nef::transport::{ApplianceResponse, Transport};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// Scripted Transport
// =============================================================================

/// Request seen by a [`ScriptedTransport`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub token: Option<String>,
    /// Number of earlier calls with the same method and path
    pub attempt: usize,
}

type Handler = Box<dyn Fn(&RecordedCall) -> ApplianceResponse + Send + Sync>;

/// Transport answering from a closure and recording every call
pub struct ScriptedTransport {
    handler: Handler,
    calls: Mutex<Vec<RecordedCall>>,
    yield_each_call: AtomicBool,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(&RecordedCall) -> ApplianceResponse + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            yield_each_call: AtomicBool::new(false),
        })
    }

    /// Yield to the scheduler before answering, so concurrent requests interleave
    pub fn yielding(self: Arc<Self>) -> Arc<Self> {
        self.yield_each_call.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls to exactly `path`
    pub fn count(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.path == path).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn endpoint(&self) -> &str {
        "https://appliance.test:8443"
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<ApplianceResponse> {
        if self.yield_each_call.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        let call = {
            let mut calls = self.calls.lock();
            let attempt = calls
                .iter()
                .filter(|c| c.method == method && c.path == path)
                .count();
            let call = RecordedCall {
                method,
                path: path.to_string(),
                body: body.cloned(),
                token: token.map(str::to_string),
                attempt,
            };
            calls.push(call.clone());
            call
        };

        Ok((self.handler)(&call))
    }
}

// =============================================================================
// Fake Provider
// =============================================================================

fn nef(code: &str, message: String) -> Error {
    Error::Nef(NefError {
        message,
        code: code.to_string(),
    })
}

#[derive(Default)]
struct FakeState {
    filesystems: BTreeMap<String, Filesystem>,
    snapshots: BTreeMap<String, Snapshot>,
    nfs_shares: BTreeSet<String>,
    smb_shares: BTreeMap<String, String>,
    acls: BTreeSet<String>,
    clusters: Vec<RsfCluster>,
    license_valid: bool,
    offline: bool,
    next_txg: u64,
    calls: Vec<String>,
}

/// In-memory appliance
pub struct FakeProvider {
    endpoint: String,
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new(endpoint: &str) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.to_string(),
            state: Mutex::new(FakeState {
                license_valid: true,
                ..Default::default()
            }),
        })
    }

    /// Add a filesystem with the given referenced quota
    pub fn with_filesystem(self: Arc<Self>, path: &str, size: u64) -> Arc<Self> {
        self.state.lock().filesystems.insert(
            path.to_string(),
            Filesystem {
                path: path.to_string(),
                mount_point: format!("/{}", path),
                referenced_quota_size: size,
                bytes_available: 10 * size.max(1),
                ..Default::default()
            },
        );
        self
    }

    pub fn with_cluster(self: Arc<Self>, name: &str) -> Arc<Self> {
        self.state.lock().clusters.push(RsfCluster {
            cluster_name: name.to_string(),
            nodes: vec![RsfNode {
                name: self.endpoint.clone(),
                machine_id: String::new(),
            }],
        });
        self
    }

    /// Every call fails as if the endpoint were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn set_license_valid(&self, valid: bool) {
        self.state.lock().license_valid = valid;
    }

    /// Calls received, as `operation:argument`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn has_filesystem(&self, path: &str) -> bool {
        self.state.lock().filesystems.contains_key(path)
    }

    pub fn filesystem(&self, path: &str) -> Option<Filesystem> {
        self.state.lock().filesystems.get(path).cloned()
    }

    pub fn has_snapshot(&self, path: &str) -> bool {
        self.state.lock().snapshots.contains_key(path)
    }

    pub fn has_nfs_share(&self, path: &str) -> bool {
        self.state.lock().nfs_shares.contains(path)
    }

    pub fn has_acl(&self, path: &str) -> bool {
        self.state.lock().acls.contains(path)
    }

    fn enter(&self, operation: &str, argument: &str) -> Result<parking_lot::MutexGuard<'_, FakeState>> {
        let mut state = self.state.lock();
        state.calls.push(format!("{}:{}", operation, argument));
        if state.offline {
            return Err(Error::Internal(format!("{} is unreachable", self.endpoint)));
        }
        Ok(state)
    }
}

#[async_trait]
impl NefProvider for FakeProvider {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn log_in(&self) -> Result<()> {
        self.enter("log_in", "")?;
        Ok(())
    }

    async fn get_pools(&self) -> Result<Vec<Pool>> {
        let state = self.enter("get_pools", "")?;
        let mut pools: Vec<String> = state
            .filesystems
            .keys()
            .filter_map(|path| path.split('/').next().map(str::to_string))
            .collect();
        pools.dedup();
        Ok(pools
            .into_iter()
            .map(|pool_name| Pool {
                pool_name,
                health: "ONLINE".into(),
                status: "ONLINE".into(),
            })
            .collect())
    }

    async fn get_filesystem(&self, path: &str) -> Result<Filesystem> {
        let state = self.enter("get_filesystem", path)?;
        state
            .filesystems
            .get(path)
            .cloned()
            .ok_or_else(|| nef(CODE_ENOENT, format!("filesystem '{}' not found", path)))
    }

    async fn get_filesystems(&self, parent: &str) -> Result<Vec<Filesystem>> {
        let state = self.enter("get_filesystems", parent)?;
        let prefix = format!("{}/", parent);
        Ok(state
            .filesystems
            .values()
            .filter(|fs| fs.path.starts_with(&prefix) && !fs.path[prefix.len()..].contains('/'))
            .cloned()
            .collect())
    }

    async fn create_filesystem(&self, params: CreateFilesystemParams) -> Result<()> {
        let mut state = self.enter("create_filesystem", &params.path)?;
        if state.filesystems.contains_key(&params.path) {
            return Err(nef(CODE_EEXIST, format!("filesystem '{}' exists", params.path)));
        }
        let size = params.referenced_quota_size.unwrap_or(0);
        state.filesystems.insert(
            params.path.clone(),
            Filesystem {
                path: params.path.clone(),
                mount_point: format!("/{}", params.path),
                referenced_quota_size: size,
                bytes_available: size,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn update_filesystem(&self, path: &str, params: UpdateFilesystemParams) -> Result<()> {
        let mut state = self.enter("update_filesystem", path)?;
        let fs = state
            .filesystems
            .get_mut(path)
            .ok_or_else(|| nef(CODE_ENOENT, format!("filesystem '{}' not found", path)))?;
        if let Some(size) = params.referenced_quota_size {
            fs.referenced_quota_size = size;
        }
        Ok(())
    }

    async fn destroy_filesystem(&self, path: &str, params: DestroyFilesystemParams) -> Result<()> {
        let mut state = self.enter("destroy_filesystem", path)?;
        if !state.filesystems.contains_key(path) {
            return Err(nef(CODE_ENOENT, format!("filesystem '{}' not found", path)));
        }
        let prefix = format!("{}@", path);
        let snapshots: Vec<String> = state
            .snapshots
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .cloned()
            .collect();
        if !snapshots.is_empty() && !params.destroy_snapshots {
            return Err(nef(CODE_EBUSY, format!("filesystem '{}' has snapshots", path)));
        }
        for snapshot in snapshots {
            state.snapshots.remove(&snapshot);
        }
        state.filesystems.remove(path);
        state.nfs_shares.remove(path);
        state.smb_shares.remove(path);
        Ok(())
    }

    async fn promote_filesystem(&self, path: &str) -> Result<()> {
        self.enter("promote_filesystem", path)?;
        Ok(())
    }

    async fn get_filesystem_available_capacity(&self, path: &str) -> Result<u64> {
        let state = self.enter("get_filesystem_available_capacity", path)?;
        state
            .filesystems
            .get(path)
            .map(|fs| fs.bytes_available)
            .ok_or_else(|| nef(CODE_ENOENT, format!("filesystem '{}' not found", path)))
    }

    async fn set_filesystem_acl(&self, path: &str, _rule: AclRule) -> Result<()> {
        let mut state = self.enter("set_filesystem_acl", path)?;
        state.acls.insert(path.to_string());
        Ok(())
    }

    async fn create_nfs_share(&self, path: &str) -> Result<()> {
        let mut state = self.enter("create_nfs_share", path)?;
        state.nfs_shares.insert(path.to_string());
        if let Some(fs) = state.filesystems.get_mut(path) {
            fs.shared_over_nfs = true;
        }
        Ok(())
    }

    async fn delete_nfs_share(&self, path: &str) -> Result<()> {
        let mut state = self.enter("delete_nfs_share", path)?;
        state.nfs_shares.remove(path);
        Ok(())
    }

    async fn create_smb_share(&self, path: &str, share_name: Option<&str>) -> Result<()> {
        let mut state = self.enter("create_smb_share", path)?;
        let name = share_name
            .map(str::to_string)
            .unwrap_or_else(|| path.replace('/', "_"));
        state.smb_shares.insert(path.to_string(), name);
        if let Some(fs) = state.filesystems.get_mut(path) {
            fs.shared_over_smb = true;
        }
        Ok(())
    }

    async fn get_smb_share_name(&self, path: &str) -> Result<String> {
        let state = self.enter("get_smb_share_name", path)?;
        state
            .smb_shares
            .get(path)
            .cloned()
            .ok_or_else(|| nef(CODE_ENOENT, format!("share '{}' not found", path)))
    }

    async fn delete_smb_share(&self, path: &str) -> Result<()> {
        let mut state = self.enter("delete_smb_share", path)?;
        state.smb_shares.remove(path);
        Ok(())
    }

    async fn create_snapshot(&self, path: &str) -> Result<()> {
        let mut state = self.enter("create_snapshot", path)?;
        let (parent, name) = path
            .split_once('@')
            .ok_or_else(|| nef("EINVAL", format!("bad snapshot path '{}'", path)))?;
        if !state.filesystems.contains_key(parent) {
            return Err(nef(CODE_ENOENT, format!("filesystem '{}' not found", parent)));
        }
        if state.snapshots.contains_key(path) {
            return Err(nef(CODE_EEXIST, format!("snapshot '{}' exists", path)));
        }
        state.next_txg += 1;
        let txg = state.next_txg;
        state.snapshots.insert(
            path.to_string(),
            Snapshot {
                path: path.to_string(),
                name: name.to_string(),
                parent: parent.to_string(),
                clones: Vec::new(),
                creation_txg: txg,
                creation_time: Utc.timestamp_opt(1_700_000_000 + txg as i64, 0).unwrap(),
            },
        );
        Ok(())
    }

    async fn get_snapshot(&self, path: &str) -> Result<Snapshot> {
        let state = self.enter("get_snapshot", path)?;
        state
            .snapshots
            .get(path)
            .cloned()
            .ok_or_else(|| nef(CODE_ENOENT, format!("snapshot '{}' not found", path)))
    }

    async fn get_snapshots(&self, parent: &str, recursive: bool) -> Result<Vec<Snapshot>> {
        let state = self.enter("get_snapshots", parent)?;
        let prefix = format!("{}/", parent);
        Ok(state
            .snapshots
            .values()
            .filter(|s| s.parent == parent || (recursive && s.parent.starts_with(&prefix)))
            .cloned()
            .collect())
    }

    async fn destroy_snapshot(&self, path: &str) -> Result<()> {
        let mut state = self.enter("destroy_snapshot", path)?;
        let snapshot = state
            .snapshots
            .get(path)
            .ok_or_else(|| nef(CODE_ENOENT, format!("snapshot '{}' not found", path)))?;
        if !snapshot.clones.is_empty() {
            return Err(nef(CODE_EBUSY, format!("snapshot '{}' has clones", path)));
        }
        state.snapshots.remove(path);
        Ok(())
    }

    async fn clone_snapshot(&self, snapshot_path: &str, params: CloneSnapshotParams) -> Result<()> {
        let mut state = self.enter("clone_snapshot", snapshot_path)?;
        if !state.snapshots.contains_key(snapshot_path) {
            return Err(nef(CODE_ENOENT, format!("snapshot '{}' not found", snapshot_path)));
        }
        if state.filesystems.contains_key(&params.target_path) {
            return Err(nef(CODE_EEXIST, format!("filesystem '{}' exists", params.target_path)));
        }
        let size = params.referenced_quota_size.unwrap_or(0);
        state.filesystems.insert(
            params.target_path.clone(),
            Filesystem {
                path: params.target_path.clone(),
                mount_point: format!("/{}", params.target_path),
                referenced_quota_size: size,
                bytes_available: size,
                ..Default::default()
            },
        );
        if let Some(snapshot) = state.snapshots.get_mut(snapshot_path) {
            snapshot.clones.push(params.target_path);
        }
        Ok(())
    }

    async fn get_license(&self) -> Result<License> {
        let state = self.enter("get_license", "")?;
        Ok(License {
            valid: state.license_valid,
            expires: None,
        })
    }

    async fn get_rsf_clusters(&self) -> Result<Vec<RsfCluster>> {
        let state = self.enter("get_rsf_clusters", "")?;
        Ok(state.clusters.clone())
    }
}

/// Backend settings for tests
pub fn backend_config(dataset: Option<&str>, zone: Option<&str>) -> BackendConfig {
    let mut config = BackendConfig::new("https://appliance.test:8443", "admin", "secret");
    config.default_dataset = dataset.map(str::to_string);
    config.default_data_ip = Some("10.0.0.10".into());
    config.zone = zone.map(str::to_string);
    config
}
