//! Domain Ports - Core trait definitions for the driver
//!
//! `NefProvider` is the capability surface of one appliance endpoint. The
//! resolver and the orchestrator depend on this trait only, never on the
//! concrete REST client.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

// =============================================================================
// Appliance Resources
// =============================================================================

/// Storage pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pool {
    pub pool_name: String,
    pub health: String,
    pub status: String,
}

/// Filesystem (dataset) on the appliance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filesystem {
    /// Dataset path, e.g. `pool/dataset/pvc-1`
    pub path: String,
    /// Mount point on the appliance
    pub mount_point: String,
    pub shared_over_nfs: bool,
    pub shared_over_smb: bool,
    pub bytes_available: u64,
    pub bytes_used: u64,
    /// Quota on referenced data; this is the volume size
    pub referenced_quota_size: u64,
}

impl Filesystem {
    /// Size reported to the orchestrator
    pub fn capacity_bytes(&self) -> u64 {
        self.referenced_quota_size
    }
}

/// Snapshot of a filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Full path, `pool/fs@name`
    pub path: String,
    /// Short name
    pub name: String,
    /// Parent filesystem path
    pub parent: String,
    /// Filesystems cloned from this snapshot
    #[serde(default)]
    pub clones: Vec<String>,
    /// Transaction group the snapshot was taken in
    #[serde(default, deserialize_with = "u64_from_string_or_number")]
    pub creation_txg: u64,
    pub creation_time: DateTime<Utc>,
}

/// Appliance license state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct License {
    pub valid: bool,
    pub expires: Option<String>,
}

/// Member of an RSF high-availability cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RsfNode {
    pub name: String,
    pub machine_id: String,
}

/// RSF high-availability cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RsfCluster {
    pub cluster_name: String,
    pub nodes: Vec<RsfNode>,
}

// =============================================================================
// Operation Parameters
// =============================================================================

/// Parameters for creating a filesystem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFilesystemParams {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_quota_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_reservation_size: Option<u64>,
}

/// Parameters for updating a filesystem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFilesystemParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_quota_size: Option<u64>,
}

/// Parameters for destroying a filesystem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyFilesystemParams {
    /// Destroy the filesystem's snapshots too
    pub destroy_snapshots: bool,
    /// Promote the most recent clone first so the filesystem can go away
    pub promote_most_recent_clone: bool,
}

/// Parameters for cloning a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneSnapshotParams {
    pub target_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_quota_size: Option<u64>,
}

/// ACL entry applied to a shared filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AclRule {
    #[serde(rename = "type")]
    pub kind: String,
    pub principal: String,
    pub flags: Vec<String>,
    pub permissions: Vec<String>,
}

impl AclRule {
    /// `everyone@` gets full access, inherited by files and directories
    pub fn everyone_full_access() -> Self {
        Self {
            kind: "allow".into(),
            principal: "everyone@".into(),
            flags: vec!["file_inherit".into(), "dir_inherit".into()],
            permissions: vec!["full_set".into()],
        }
    }
}

// =============================================================================
// NEF Provider Port
// =============================================================================

/// Capability interface of one appliance endpoint
#[async_trait]
pub trait NefProvider: Send + Sync {
    /// Endpoint URL this provider talks to
    fn endpoint(&self) -> &str;

    /// Obtain a fresh session token
    async fn log_in(&self) -> Result<()>;

    async fn get_pools(&self) -> Result<Vec<Pool>>;

    /// Get a filesystem by path; `ENOENT` if it does not exist
    async fn get_filesystem(&self, path: &str) -> Result<Filesystem>;

    /// List the children of `parent` (the parent itself is excluded)
    async fn get_filesystems(&self, parent: &str) -> Result<Vec<Filesystem>>;

    async fn create_filesystem(&self, params: CreateFilesystemParams) -> Result<()>;

    async fn update_filesystem(&self, path: &str, params: UpdateFilesystemParams) -> Result<()>;

    async fn destroy_filesystem(&self, path: &str, params: DestroyFilesystemParams) -> Result<()>;

    async fn promote_filesystem(&self, path: &str) -> Result<()>;

    /// Bytes available to `path`
    async fn get_filesystem_available_capacity(&self, path: &str) -> Result<u64>;

    async fn set_filesystem_acl(&self, path: &str, rule: AclRule) -> Result<()>;

    async fn create_nfs_share(&self, path: &str) -> Result<()>;

    async fn delete_nfs_share(&self, path: &str) -> Result<()>;

    async fn create_smb_share(&self, path: &str, share_name: Option<&str>) -> Result<()>;

    async fn get_smb_share_name(&self, path: &str) -> Result<String>;

    async fn delete_smb_share(&self, path: &str) -> Result<()>;

    /// Create `pool/fs@name`
    async fn create_snapshot(&self, path: &str) -> Result<()>;

    async fn get_snapshot(&self, path: &str) -> Result<Snapshot>;

    async fn get_snapshots(&self, parent: &str, recursive: bool) -> Result<Vec<Snapshot>>;

    async fn destroy_snapshot(&self, path: &str) -> Result<()>;

    async fn clone_snapshot(&self, snapshot_path: &str, params: CloneSnapshotParams) -> Result<()>;

    async fn get_license(&self) -> Result<License>;

    async fn get_rsf_clusters(&self) -> Result<Vec<RsfCluster>>;
}

pub type NefProviderRef = Arc<dyn NefProvider>;

fn u64_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
