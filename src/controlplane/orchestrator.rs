//! Volume Orchestrator
//!
//! Lifecycle operations behind the driver's RPC boundary:
//! - Volume create (empty, from snapshot, from volume), delete, expand
//! - Snapshot create and delete
//! - Paged volume and snapshot listing
//! - Capacity, share preparation and backend health
//!
//! Every operation runs against the backend set current when it starts and
//! stops at the first await point after its cancellation token fires.

use crate::config::{DriverConfig, MountFsType};
use crate::controlplane::backends::{check_clusters, BackendRegistry, BackendSet, Resolution};
use crate::controlplane::pagination::{paginate, Page};
use crate::controlplane::resolver::Resolver;
use crate::domain::identity::Identifier;
use crate::domain::ports::{
    AclRule, CloneSnapshotParams, CreateFilesystemParams, DestroyFilesystemParams, Filesystem,
    Snapshot, UpdateFilesystemParams,
};
use crate::error::{Error, Result, RpcCode};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Prefix of the transient snapshot taken when cloning a volume
pub const CLONE_SNAPSHOT_PREFIX: &str = "k8s-clone-snapshot-";

// Volume context keys handed to the node plugin
pub const CONTEXT_DATA_IP: &str = "dataIp";
pub const CONTEXT_MOUNT_FS_TYPE: &str = "mountFsType";
pub const CONTEXT_MOUNT_OPTIONS: &str = "mountOptions";
pub const CONTEXT_MOUNT_POINT_PERMISSIONS: &str = "mountPointPermissions";
pub const CONTEXT_CONFIG_NAME: &str = "configName";

// =============================================================================
// Request/Response Types
// =============================================================================

/// Storage class parameters of a volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeParameters {
    /// Backend to create the volume on
    pub config_name: Option<String>,
    /// Parent dataset, `pool/dataset`
    pub dataset: Option<String>,
    pub mount_fs_type: Option<MountFsType>,
    pub data_ip: Option<String>,
    pub mount_options: Option<String>,
}

impl VolumeParameters {
    /// Read parameters from an untyped key/value map
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let get = |key: &str| map.get(key).filter(|v| !v.is_empty()).cloned();
        Ok(Self {
            config_name: get("configName"),
            dataset: get("dataset"),
            mount_fs_type: get("mountFsType").map(|v| v.parse()).transpose()?,
            data_ip: get("dataIp"),
            mount_options: get("mountOptions"),
        })
    }
}

/// Content a new volume starts from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VolumeSource {
    /// Snapshot identifier
    Snapshot(String),
    /// Volume identifier
    Volume(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeRequest {
    pub name: String,
    /// Requested size; `None` or 0 leaves the volume without a quota
    #[serde(default)]
    pub capacity_bytes: Option<u64>,
    #[serde(default)]
    pub parameters: VolumeParameters,
    #[serde(default)]
    pub source: Option<VolumeSource>,
    /// Topology zone the volume must be accessible from
    #[serde(default)]
    pub zone: Option<String>,
}

/// Provisioned volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub id: String,
    pub capacity_bytes: u64,
    pub context: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

/// Snapshot of a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshot {
    pub id: String,
    pub source_volume_id: String,
    pub creation_time: DateTime<Utc>,
    pub ready_to_use: bool,
}

/// Share a worker mounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareInfo {
    pub volume_id: String,
    pub mount_fs_type: MountFsType,
    /// `ip:/mount/point` for NFS, `//ip/share` for CIFS
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_options: Option<String>,
}

/// License state of one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub license_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs lifecycle operations across the configured backends
#[derive(Default)]
pub struct Orchestrator {
    backends: BackendRegistry,
}

impl Orchestrator {
    /// Create an orchestrator with no backends; call [`Orchestrator::reload`]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create an orchestrator over an already built backend set
    pub fn with_backends(backends: BackendSet) -> Arc<Self> {
        Arc::new(Self {
            backends: BackendRegistry::new(backends),
        })
    }

    /// Backend set new operations run against
    pub fn backends(&self) -> Arc<BackendSet> {
        self.backends.current()
    }

    /// Build resolvers for `config` and publish them as one set
    pub async fn reload(&self, config: &DriverConfig, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, "reload", async {
            let backends = BackendSet::from_config(config)?;
            check_clusters(&backends).await;
            self.backends.publish(backends);
            Ok(())
        })
        .await
    }

    // =========================================================================
    // Volumes
    // =========================================================================

    pub async fn create_volume(
        &self,
        request: CreateVolumeRequest,
        cancel: &CancellationToken,
    ) -> Result<Volume> {
        cancellable(cancel, "create_volume", self.do_create_volume(request)).await
    }

    async fn do_create_volume(&self, request: CreateVolumeRequest) -> Result<Volume> {
        if request.name.is_empty() {
            return Err(Error::InvalidArgument("volume name is required".into()));
        }
        let backends = self.backends();
        let params = &request.parameters;
        let zone = request.zone.as_deref();
        let capacity = request.capacity_bytes.filter(|size| *size > 0);

        info!(
            "Creating volume {} ({} bytes)",
            request.name,
            capacity.unwrap_or(0)
        );

        let (resolution, path, result) = match &request.source {
            None => {
                let resolution = backends
                    .resolve_ns(params.config_name.as_deref(), zone, params.dataset.as_deref())
                    .await?;
                let path = format!("{}/{}", resolution.path, request.name);
                let result = resolution
                    .provider
                    .create_filesystem(CreateFilesystemParams {
                        path: path.clone(),
                        referenced_quota_size: capacity,
                        referenced_reservation_size: None,
                    })
                    .await;
                (resolution, path, result)
            }
            Some(VolumeSource::Snapshot(id)) => {
                let source = Identifier::parse_snapshot(id)?;
                let resolution = backends
                    .resolve_ns(source.backend.as_deref(), zone, Some(&source.path))
                    .await?;
                let path = clone_target(&resolution.resolver, params, &request.name)?;
                debug!("Cloning snapshot {} into {}", source.full_path(), path);
                let result = resolution
                    .provider
                    .clone_snapshot(
                        &source.full_path(),
                        CloneSnapshotParams {
                            target_path: path.clone(),
                            referenced_quota_size: capacity,
                        },
                    )
                    .await;
                (resolution, path, result)
            }
            Some(VolumeSource::Volume(id)) => {
                let source = Identifier::parse_volume(id)?;
                let resolution = backends
                    .resolve_ns(source.backend.as_deref(), zone, Some(&source.path))
                    .await?;
                let path = clone_target(&resolution.resolver, params, &request.name)?;
                let snapshot_path = format!(
                    "{}@{}{}",
                    resolution.path, CLONE_SNAPSHOT_PREFIX, request.name
                );

                match resolution.provider.create_snapshot(&snapshot_path).await {
                    Ok(()) => debug!("Created clone snapshot {}", snapshot_path),
                    Err(e) if e.is_already_exists() => {
                        debug!("Reusing clone snapshot {}", snapshot_path)
                    }
                    Err(e) => return Err(e),
                }

                let result = resolution
                    .provider
                    .clone_snapshot(
                        &snapshot_path,
                        CloneSnapshotParams {
                            target_path: path.clone(),
                            referenced_quota_size: capacity,
                        },
                    )
                    .await;
                (resolution, path, result)
            }
        };

        let capacity_bytes = match result {
            Ok(()) => {
                info!("Created volume {} on {}", path, resolution.resolver.name());
                capacity.unwrap_or(0)
            }
            Err(e) if e.is_already_exists() => {
                let existing = resolution.provider.get_filesystem(&path).await?;
                if let Some(requested) = capacity {
                    if existing.capacity_bytes() != requested {
                        return Err(Error::SizeMismatch {
                            name: request.name.clone(),
                            existing: existing.capacity_bytes(),
                            requested,
                        });
                    }
                }
                info!("Volume {} already exists, reusing it", path);
                existing.capacity_bytes()
            }
            Err(e) => return Err(e),
        };

        Ok(volume(&resolution.resolver, &path, capacity_bytes, params))
    }

    /// Destroy a volume. Unknown and malformed identifiers succeed.
    pub async fn delete_volume(&self, volume_id: &str, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, "delete_volume", self.do_delete_volume(volume_id)).await
    }

    async fn do_delete_volume(&self, volume_id: &str) -> Result<()> {
        let id = match Identifier::parse_volume(volume_id) {
            Ok(id) => id,
            Err(e) => {
                warn!("Delete of malformed volume id treated as done: {}", e);
                return Ok(());
            }
        };
        let Some(resolution) = self.resolve_existing(&id).await? else {
            warn!("Volume {} not found, nothing to delete", volume_id);
            return Ok(());
        };

        info!("Deleting volume {}", volume_id);
        let params = DestroyFilesystemParams {
            destroy_snapshots: true,
            promote_most_recent_clone: true,
        };
        match resolution
            .provider
            .destroy_filesystem(&resolution.path, params)
            .await
        {
            Ok(()) => {
                info!("Deleted volume {}", volume_id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!("Volume {} disappeared before delete: {}", volume_id, e);
                Ok(())
            }
            Err(e) if e.is_busy() => Err(Error::FailedPrecondition(format!(
                "volume {} has dependent filesystems or snapshots: {}",
                volume_id, e
            ))),
            Err(e) => Err(e),
        }
    }

    /// Set a new size; returns the size now in effect
    pub async fn expand_volume(
        &self,
        volume_id: &str,
        capacity_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        cancellable(cancel, "expand_volume", async {
            if capacity_bytes == 0 {
                return Err(Error::InvalidArgument(
                    "expand requires a capacity greater than 0".into(),
                ));
            }
            let id = Identifier::parse_volume(volume_id)?;
            let resolution = self.resolve(&id).await?;

            info!("Expanding volume {} to {} bytes", volume_id, capacity_bytes);
            resolution
                .provider
                .update_filesystem(
                    &resolution.path,
                    UpdateFilesystemParams {
                        referenced_quota_size: Some(capacity_bytes),
                    },
                )
                .await?;
            Ok(capacity_bytes)
        })
        .await
    }

    /// Check that a volume exists
    pub async fn validate_volume(&self, volume_id: &str, cancel: &CancellationToken) -> Result<Volume> {
        cancellable(cancel, "validate_volume", async {
            let id = Identifier::parse_volume(volume_id)?;
            let resolution = self.resolve(&id).await?;
            let filesystem = resolution.provider.get_filesystem(&resolution.path).await?;
            Ok(volume(
                &resolution.resolver,
                &resolution.path,
                filesystem.capacity_bytes(),
                &VolumeParameters::default(),
            ))
        })
        .await
    }

    pub async fn list_volumes(
        &self,
        max_entries: usize,
        starting_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Page<Volume>> {
        cancellable(cancel, "list_volumes", async {
            let backends = self.backends();
            let listings = join_all(default_datasets(&backends).into_iter().map(
                |(resolver, dataset)| async move {
                    let provider = resolver.resolve(&dataset).await?;
                    let filesystems = provider.get_filesystems(&dataset).await?;
                    Ok::<_, Error>((resolver, filesystems))
                },
            ))
            .await;

            let mut volumes = Vec::new();
            for listing in listings {
                let (resolver, filesystems): (Arc<Resolver>, Vec<Filesystem>) = listing?;
                volumes.extend(filesystems.iter().map(|fs| {
                    volume(
                        &resolver,
                        &fs.path,
                        fs.capacity_bytes(),
                        &VolumeParameters::default(),
                    )
                }));
            }

            debug!("Listing {} volumes", volumes.len());
            paginate(volumes, |v| v.id.as_str(), starting_token, max_entries)
        })
        .await
    }

    /// Bytes available for new volumes
    pub async fn get_capacity(
        &self,
        config_name: Option<&str>,
        dataset: Option<&str>,
        zone: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        cancellable(cancel, "get_capacity", async {
            let resolution = self.backends().resolve_ns(config_name, zone, dataset).await?;
            resolution
                .provider
                .get_filesystem_available_capacity(&resolution.path)
                .await
        })
        .await
    }

    /// Make sure the volume is shared and writable before a worker mounts it
    pub async fn prepare_share(
        &self,
        volume_id: &str,
        mount_fs_type: Option<MountFsType>,
        data_ip: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ShareInfo> {
        cancellable(cancel, "prepare_share", async {
            let id = Identifier::parse_volume(volume_id)?;
            let resolution = self.resolve(&id).await?;
            let provider = &resolution.provider;
            let path = resolution.path.as_str();
            let config = resolution.resolver.config();

            let fs_type = mount_fs_type.unwrap_or(config.default_mount_fs_type);
            let data_ip = data_ip
                .filter(|ip| !ip.is_empty())
                .or(config.default_data_ip.as_deref())
                .ok_or_else(|| {
                    Error::FailedPrecondition(format!(
                        "backend '{}' has no defaultDataIp and none was given",
                        resolution.resolver.name()
                    ))
                })?;

            let filesystem = provider.get_filesystem(path).await?;
            let source = match fs_type {
                MountFsType::Nfs => {
                    if !filesystem.shared_over_nfs {
                        info!("Sharing {} over NFS", path);
                        tolerate_exists(provider.create_nfs_share(path).await)?;
                    }
                    format!("{}:{}", data_ip, filesystem.mount_point)
                }
                MountFsType::Cifs => {
                    if !filesystem.shared_over_smb {
                        info!("Sharing {} over SMB", path);
                        tolerate_exists(provider.create_smb_share(path, None).await)?;
                    }
                    let share_name = provider.get_smb_share_name(path).await?;
                    format!("//{}/{}", data_ip, share_name)
                }
            };
            provider
                .set_filesystem_acl(path, AclRule::everyone_full_access())
                .await?;

            Ok(ShareInfo {
                volume_id: volume_id.to_string(),
                mount_fs_type: fs_type,
                source,
                mount_options: config.default_mount_options.clone(),
            })
        })
        .await
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Snapshot a volume. An existing snapshot of the same name is reused.
    pub async fn create_snapshot(
        &self,
        source_volume_id: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<VolumeSnapshot> {
        cancellable(cancel, "create_snapshot", async {
            if name.is_empty() {
                return Err(Error::InvalidArgument("snapshot name is required".into()));
            }
            let id = Identifier::parse_volume(source_volume_id)?;
            let resolution = self.resolve(&id).await?;
            let snapshot_path = format!("{}@{}", resolution.path, name);

            info!("Creating snapshot {}", snapshot_path);
            match resolution.provider.create_snapshot(&snapshot_path).await {
                Ok(()) => {}
                Err(e) if e.is_already_exists() => {
                    info!("Snapshot {} already exists, reusing it", snapshot_path)
                }
                Err(e) => return Err(e),
            }

            let snapshot = resolution.provider.get_snapshot(&snapshot_path).await?;
            Ok(volume_snapshot(&resolution.resolver, &snapshot))
        })
        .await
    }

    /// Destroy a snapshot. Unknown and malformed identifiers succeed.
    pub async fn delete_snapshot(&self, snapshot_id: &str, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, "delete_snapshot", async {
            let id = match Identifier::parse_snapshot(snapshot_id) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Delete of malformed snapshot id treated as done: {}", e);
                    return Ok(());
                }
            };
            let Some(resolution) = self.resolve_existing(&id.parent_volume()).await? else {
                warn!("Snapshot {} not found, nothing to delete", snapshot_id);
                return Ok(());
            };

            let snapshot_path = format!("{}@{}", resolution.path, id.snapshot.unwrap_or_default());
            info!("Deleting snapshot {}", snapshot_path);
            match resolution.provider.destroy_snapshot(&snapshot_path).await {
                Ok(()) => Ok(()),
                Err(e) if e.is_not_found() => {
                    warn!("Snapshot {} not found, nothing to delete", snapshot_id);
                    Ok(())
                }
                Err(e) if e.is_busy() || e.is_already_exists() => Err(Error::FailedPrecondition(
                    format!("snapshot {} has dependent filesystems: {}", snapshot_path, e),
                )),
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// List snapshots by snapshot id, by source volume, or all of them
    pub async fn list_snapshots(
        &self,
        snapshot_id: Option<&str>,
        source_volume_id: Option<&str>,
        max_entries: usize,
        starting_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Page<VolumeSnapshot>> {
        cancellable(cancel, "list_snapshots", async {
            let snapshots = match (
                snapshot_id.filter(|s| !s.is_empty()),
                source_volume_id.filter(|s| !s.is_empty()),
            ) {
                (Some(snapshot_id), _) => self.find_snapshot(snapshot_id).await?,
                (None, Some(volume_id)) => self.snapshots_of_volume(volume_id).await?,
                (None, None) => self.all_snapshots().await?,
            };
            paginate(snapshots, |s| s.id.as_str(), starting_token, max_entries)
        })
        .await
    }

    async fn find_snapshot(&self, snapshot_id: &str) -> Result<Vec<VolumeSnapshot>> {
        let Ok(id) = Identifier::parse_snapshot(snapshot_id) else {
            return Ok(Vec::new());
        };
        let Some(resolution) = self.resolve_existing(&id.parent_volume()).await? else {
            return Ok(Vec::new());
        };
        match resolution.provider.get_snapshot(&id.full_path()).await {
            Ok(snapshot) => Ok(vec![volume_snapshot(&resolution.resolver, &snapshot)]),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn snapshots_of_volume(&self, volume_id: &str) -> Result<Vec<VolumeSnapshot>> {
        let Ok(id) = Identifier::parse_volume(volume_id) else {
            return Ok(Vec::new());
        };
        let Some(resolution) = self.resolve_existing(&id).await? else {
            return Ok(Vec::new());
        };
        let snapshots = resolution
            .provider
            .get_snapshots(&resolution.path, false)
            .await?;
        Ok(snapshots
            .iter()
            .map(|s| volume_snapshot(&resolution.resolver, s))
            .collect())
    }

    async fn all_snapshots(&self) -> Result<Vec<VolumeSnapshot>> {
        let backends = self.backends();
        let listings = join_all(default_datasets(&backends).into_iter().map(
            |(resolver, dataset)| async move {
                let provider = resolver.resolve(&dataset).await?;
                let prefix = format!("{}/", dataset);
                let snapshots: Vec<Snapshot> = provider
                    .get_snapshots(&dataset, true)
                    .await?
                    .into_iter()
                    .filter(|s| s.parent.starts_with(&prefix))
                    .collect();
                Ok::<_, Error>((resolver, snapshots))
            },
        ))
        .await;

        let mut result = Vec::new();
        for listing in listings {
            let (resolver, snapshots): (Arc<Resolver>, Vec<Snapshot>) = listing?;
            result.extend(snapshots.iter().map(|s| volume_snapshot(&resolver, s)));
        }
        Ok(result)
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// License state of every backend
    pub async fn check_backends(&self, cancel: &CancellationToken) -> Result<Vec<BackendStatus>> {
        cancellable(cancel, "check_backends", async {
            let backends = self.backends();
            let checks = backends.resolvers().iter().map(|resolver| async move {
                match resolver.license().await {
                    Ok((endpoint, license)) => {
                        if !license.valid {
                            warn!("Backend {}: license on {} is not valid", resolver.name(), endpoint);
                        }
                        BackendStatus {
                            name: resolver.name().to_string(),
                            endpoint: Some(endpoint),
                            license_valid: license.valid,
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!("Backend {}: license check failed: {}", resolver.name(), e);
                        BackendStatus {
                            name: resolver.name().to_string(),
                            endpoint: None,
                            license_valid: false,
                            error: Some(e.to_string()),
                        }
                    }
                }
            });
            Ok(join_all(checks).await)
        })
        .await
    }

    // =========================================================================
    // Resolution Helpers
    // =========================================================================

    async fn resolve(&self, id: &Identifier) -> Result<Resolution> {
        self.backends()
            .resolve_ns(id.backend.as_deref(), None, Some(&id.path))
            .await
    }

    /// Like `resolve`, but a path nobody owns is `None`
    async fn resolve_existing(&self, id: &Identifier) -> Result<Option<Resolution>> {
        match self.resolve(id).await {
            Ok(resolution) => Ok(Some(resolution)),
            Err(e) if e.status_code() == RpcCode::NotFound => {
                debug!("{} not resolved: {}", id, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Run `operation` until it finishes or `cancel` fires
pub async fn cancellable<T, F>(cancel: &CancellationToken, operation: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!("{} cancelled", operation);
            Err(Error::Cancelled(operation.to_string()))
        }
        result = future => result,
    }
}

fn tolerate_exists(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_already_exists() => Ok(()),
        other => other,
    }
}

/// Path of a clone: the requested dataset or the backend default, plus name
fn clone_target(resolver: &Resolver, params: &VolumeParameters, name: &str) -> Result<String> {
    let dataset = resolver.dataset_or_default(params.dataset.as_deref())?;
    Ok(format!("{}/{}", dataset, name))
}

fn default_datasets(backends: &BackendSet) -> Vec<(Arc<Resolver>, String)> {
    backends
        .resolvers()
        .iter()
        .filter_map(|r| r.default_dataset().map(|d| (r.clone(), d.to_string())))
        .collect()
}

fn volume(resolver: &Resolver, path: &str, capacity_bytes: u64, params: &VolumeParameters) -> Volume {
    let config = resolver.config();
    let mut context = BTreeMap::new();

    if let Some(ip) = params.data_ip.as_ref().or(config.default_data_ip.as_ref()) {
        context.insert(CONTEXT_DATA_IP.to_string(), ip.clone());
    }
    let fs_type = params.mount_fs_type.unwrap_or(config.default_mount_fs_type);
    context.insert(CONTEXT_MOUNT_FS_TYPE.to_string(), fs_type.to_string());
    if let Some(options) = params
        .mount_options
        .as_ref()
        .or(config.default_mount_options.as_ref())
    {
        context.insert(CONTEXT_MOUNT_OPTIONS.to_string(), options.clone());
    }
    if let Some(permissions) = &config.mount_point_permissions {
        context.insert(CONTEXT_MOUNT_POINT_PERMISSIONS.to_string(), permissions.clone());
    }
    context.insert(CONTEXT_CONFIG_NAME.to_string(), resolver.name().to_string());

    Volume {
        id: Identifier::volume(resolver.name(), path).encode(),
        capacity_bytes,
        context,
        zone: resolver.zone().map(str::to_string),
    }
}

fn volume_snapshot(resolver: &Resolver, snapshot: &Snapshot) -> VolumeSnapshot {
    VolumeSnapshot {
        id: Identifier::snapshot(resolver.name(), &snapshot.parent, &snapshot.name).encode(),
        source_volume_id: Identifier::volume(resolver.name(), &snapshot.parent).encode(),
        creation_time: snapshot.creation_time,
        ready_to_use: true,
    }
}
