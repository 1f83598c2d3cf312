//! Driver configuration
//!
//! The configuration file maps backend names to appliance connection
//! settings:
//!
//! ```yaml
//! nexentastor_map:
//!   nstor-box1:
//!     restIp: https://10.3.199.252:8443,https://10.3.199.253:8443
//!     username: admin
//!     password: secret
//!     defaultDataset: csiDriverPool/csiDriverDataset
//!     defaultDataIp: 10.3.199.252
//!     defaultMountFsType: nfs
//!     zone: zone-1
//! ```
//!
//! Backend order is preserved; it is the order in which backends are tried.

use crate::domain::identity::validate_backend_name;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// =============================================================================
// Mount Filesystem Type
// =============================================================================

/// Protocol used to mount a share on worker hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountFsType {
    #[default]
    Nfs,
    Cifs,
}

impl fmt::Display for MountFsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountFsType::Nfs => write!(f, "nfs"),
            MountFsType::Cifs => write!(f, "cifs"),
        }
    }
}

impl std::str::FromStr for MountFsType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "nfs" => Ok(MountFsType::Nfs),
            "cifs" => Ok(MountFsType::Cifs),
            other => Err(Error::InvalidArgument(format!(
                "unsupported mount filesystem type '{}', use 'nfs' or 'cifs'",
                other
            ))),
        }
    }
}

// =============================================================================
// Backend Configuration
// =============================================================================

/// One named backend: a single appliance or an HA pair
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Comma-separated appliance endpoint URLs
    pub rest_ip: String,
    pub username: String,
    pub password: String,
    /// Parent dataset of new volumes, `pool/dataset`
    #[serde(default)]
    pub default_dataset: Option<String>,
    /// Address worker hosts mount shares from
    #[serde(default)]
    pub default_data_ip: Option<String>,
    #[serde(default)]
    pub default_mount_fs_type: MountFsType,
    #[serde(default)]
    pub default_mount_options: Option<String>,
    /// Octal permissions of the mount point, e.g. `0750`
    #[serde(default)]
    pub mount_point_permissions: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    /// Appliances ship self-signed certificates
    #[serde(default = "default_insecure_skip_verify")]
    pub insecure_skip_verify: bool,
}

fn default_insecure_skip_verify() -> bool {
    true
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("rest_ip", &self.rest_ip)
            .field("username", &self.username)
            .field("password", &"***")
            .field("default_dataset", &self.default_dataset)
            .field("default_data_ip", &self.default_data_ip)
            .field("default_mount_fs_type", &self.default_mount_fs_type)
            .field("zone", &self.zone)
            .finish()
    }
}

impl BackendConfig {
    /// Minimal configuration for one endpoint
    pub fn new(rest_ip: &str, username: &str, password: &str) -> Self {
        Self {
            rest_ip: rest_ip.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            default_dataset: None,
            default_data_ip: None,
            default_mount_fs_type: MountFsType::Nfs,
            default_mount_options: None,
            mount_point_permissions: None,
            zone: None,
            insecure_skip_verify: true,
        }
    }

    /// Endpoint URLs in configured order
    pub fn endpoints(&self) -> Vec<String> {
        self.rest_ip
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Check one backend entry
    pub fn validate(&self, name: &str) -> Result<()> {
        validate_backend_name(name)?;

        if self.endpoints().is_empty() {
            return Err(Error::Configuration(format!(
                "backend '{}': restIp must list at least one endpoint",
                name
            )));
        }
        if self.username.is_empty() || self.password.is_empty() {
            return Err(Error::Configuration(format!(
                "backend '{}': username and password are required",
                name
            )));
        }
        if let Some(dataset) = &self.default_dataset {
            let parts: Vec<&str> = dataset.split('/').collect();
            if parts.len() < 2 || parts.iter().any(|part| part.is_empty()) {
                return Err(Error::Configuration(format!(
                    "backend '{}': defaultDataset '{}' must be 'pool/dataset'",
                    name, dataset
                )));
            }
        }
        if let Some(permissions) = &self.mount_point_permissions {
            u32::from_str_radix(permissions, 8).map_err(|_| {
                Error::Configuration(format!(
                    "backend '{}': mountPointPermissions '{}' is not octal",
                    name, permissions
                ))
            })?;
        }
        Ok(())
    }
}

// =============================================================================
// Driver Configuration
// =============================================================================

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Backends by name, in configured order
    #[serde(rename = "nexentastor_map")]
    pub backends: IndexMap<String, BackendConfig>,
    /// Verbose logging
    #[serde(default)]
    pub debug: bool,
}

impl DriverConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: DriverConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(Error::Configuration(
                "nexentastor_map must define at least one backend".into(),
            ));
        }
        for (name, backend) in &self.backends {
            backend.validate(name)?;
        }
        Ok(())
    }
}

// =============================================================================
// Config Loader
// =============================================================================

/// Reads the configuration file and detects changes
pub struct ConfigLoader {
    path: PathBuf,
    /// Contents of the last successfully loaded file
    last_contents: Mutex<Option<String>>,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_contents: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file.
    ///
    /// Returns `true` together with the configuration when the contents
    /// differ from the last successful load. An invalid file is an error
    /// and does not replace the last good contents.
    pub async fn refresh(&self) -> Result<(bool, DriverConfig)> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let config = DriverConfig::from_yaml(&contents)?;

        let mut last = self.last_contents.lock();
        let changed = last.as_deref() != Some(contents.as_str());
        if changed {
            info!(
                "Loaded configuration from {} ({} backends)",
                self.path.display(),
                config.backends.len()
            );
            *last = Some(contents);
        } else {
            debug!("Configuration {} unchanged", self.path.display());
        }

        Ok((changed, config))
    }

    /// Forget the last loaded contents so the next refresh reports a change.
    /// Used when a loaded configuration could not be applied.
    pub fn invalidate(&self) {
        *self.last_contents.lock() = None;
    }
}
