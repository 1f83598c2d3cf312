//! Backend Resolver
//!
//! A resolver is one configured backend: an ordered list of appliance
//! endpoints sharing a namespace (a single appliance or an RSF HA pair).
//! Resolution is sequential and first-success-wins; endpoints are never
//! load-balanced or queried in parallel.

use crate::config::BackendConfig;
use crate::domain::ports::{License, NefProvider, NefProviderRef};
use crate::error::{Error, Result};
use crate::nef::{Provider, ProviderConfig};
use std::sync::Arc;
use tracing::{debug, info};

/// Ordered providers of one backend
pub struct Resolver {
    name: String,
    config: BackendConfig,
    providers: Vec<NefProviderRef>,
}

impl Resolver {
    /// Create a resolver over existing providers
    pub fn new(
        name: impl Into<String>,
        config: BackendConfig,
        providers: Vec<NefProviderRef>,
    ) -> Result<Self> {
        let name = name.into();
        if providers.is_empty() {
            return Err(Error::Configuration(format!(
                "backend '{}' has no appliance endpoints",
                name
            )));
        }
        Ok(Self {
            name,
            config,
            providers,
        })
    }

    /// Create a resolver with one REST provider per configured endpoint
    pub fn from_config(name: &str, config: &BackendConfig) -> Result<Self> {
        let providers = config
            .endpoints()
            .into_iter()
            .map(|endpoint| {
                let provider = Provider::new(ProviderConfig {
                    endpoint,
                    username: config.username.clone(),
                    password: config.password.clone(),
                    insecure_skip_verify: config.insecure_skip_verify,
                })?;
                Ok(Arc::new(provider) as NefProviderRef)
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Backend {}: {} endpoint(s)", name, providers.len());
        Self::new(name, config.clone(), providers)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn zone(&self) -> Option<&str> {
        self.config.zone.as_deref()
    }

    pub fn default_dataset(&self) -> Option<&str> {
        self.config.default_dataset.as_deref()
    }

    pub fn providers(&self) -> &[NefProviderRef] {
        &self.providers
    }

    /// `path` if non-empty, otherwise the configured default dataset
    pub fn dataset_or_default(&self, path: Option<&str>) -> Result<String> {
        path.filter(|p| !p.is_empty())
            .or_else(|| self.default_dataset())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "backend '{}': no dataset given and no defaultDataset configured",
                    self.name
                ))
            })
    }

    /// Find the provider that hosts `path`.
    ///
    /// Providers are probed in configured order; the first one that has the
    /// filesystem wins. When none has it, the error wraps the last
    /// provider's failure only.
    pub async fn resolve(&self, path: &str) -> Result<NefProviderRef> {
        if path.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "backend '{}': cannot resolve an empty path",
                self.name
            )));
        }

        let mut last_error = None;
        for provider in &self.providers {
            match provider.get_filesystem(path).await {
                Ok(_) => {
                    debug!("{}: {} resolved to {}", self.name, path, provider.endpoint());
                    return Ok(provider.clone());
                }
                Err(e) => {
                    debug!("{}: {} not on {}: {}", self.name, path, provider.endpoint(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(Error::NotFoundOnAnyBackend {
            path: format!("{}:{}", self.name, path),
            source: Box::new(last_error.unwrap_or_else(|| {
                Error::Internal(format!("backend '{}' has no providers", self.name))
            })),
        })
    }

    /// Whether the endpoints form one RSF cluster.
    ///
    /// Always `false` for a single endpoint.
    pub async fn is_cluster(&self) -> Result<bool> {
        if self.providers.len() < 2 {
            return Ok(false);
        }

        let mut cluster_name: Option<String> = None;
        for provider in &self.providers {
            let clusters = provider.get_rsf_clusters().await?;
            let Some(cluster) = clusters.first() else {
                return Ok(false);
            };
            match &cluster_name {
                None => cluster_name = Some(cluster.cluster_name.clone()),
                Some(name) if *name != cluster.cluster_name => return Ok(false),
                Some(_) => {}
            }
        }
        Ok(true)
    }

    /// License of the first endpoint that answers
    pub async fn license(&self) -> Result<(String, License)> {
        let mut last_error = None;
        for provider in &self.providers {
            match provider.get_license().await {
                Ok(license) => return Ok((provider.endpoint().to_string(), license)),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            Error::Internal(format!("backend '{}' has no providers", self.name))
        }))
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let endpoints: Vec<&str> = self.providers.iter().map(|p| p.endpoint()).collect();
        f.debug_struct("Resolver")
            .field("name", &self.name)
            .field("zone", &self.config.zone)
            .field("endpoints", &endpoints)
            .finish()
    }
}
