//! Backend Set
//!
//! Holds every configured resolver and picks the one serving a request.
//! A configuration change builds a whole new [`BackendSet`] and publishes
//! it in one swap; requests already running keep the set they started
//! with.

use crate::config::DriverConfig;
use crate::controlplane::resolver::Resolver;
use crate::domain::ports::NefProviderRef;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Resolution
// =============================================================================

/// Outcome of backend selection
#[derive(Clone)]
pub struct Resolution {
    /// Backend that owns the path
    pub resolver: Arc<Resolver>,
    /// Endpoint of that backend that hosts the path
    pub provider: NefProviderRef,
    /// Resolved dataset path
    pub path: String,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("backend", &self.resolver.name())
            .field("endpoint", &self.provider.endpoint())
            .field("path", &self.path)
            .finish()
    }
}

// =============================================================================
// Backend Set
// =============================================================================

/// Immutable set of resolvers in configured order
#[derive(Debug, Default)]
pub struct BackendSet {
    resolvers: Vec<Arc<Resolver>>,
}

impl BackendSet {
    pub fn new(resolvers: Vec<Arc<Resolver>>) -> Self {
        Self { resolvers }
    }

    /// Build one resolver per configured backend
    pub fn from_config(config: &DriverConfig) -> Result<Self> {
        let resolvers = config
            .backends
            .iter()
            .map(|(name, backend)| Resolver::from_config(name, backend).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(resolvers))
    }

    pub fn resolvers(&self) -> &[Arc<Resolver>] {
        &self.resolvers
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Resolver>> {
        self.resolvers.iter().find(|r| r.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Select the backend and endpoint serving `path`.
    ///
    /// With `backend` set only that backend is used, and a `zone` that does
    /// not match its configured zone is a precondition failure. Without it,
    /// backends (filtered by `zone`) are tried in configured order and the
    /// first that resolves wins. An empty `path` means each backend's
    /// default dataset.
    pub async fn resolve_ns(
        &self,
        backend: Option<&str>,
        zone: Option<&str>,
        path: Option<&str>,
    ) -> Result<Resolution> {
        let zone = zone.filter(|z| !z.is_empty());

        if let Some(name) = backend.filter(|n| !n.is_empty()) {
            let resolver = self.get(name).ok_or_else(|| Error::BackendNotFound {
                name: name.to_string(),
            })?;

            if let Some(zone) = zone {
                if resolver.zone() != Some(zone) {
                    return Err(Error::ZoneMismatch {
                        backend: name.to_string(),
                        requested: zone.to_string(),
                        configured: resolver.zone().unwrap_or_default().to_string(),
                    });
                }
            }

            let path = resolver.dataset_or_default(path)?;
            let provider = resolver.resolve(&path).await?;
            return Ok(Resolution {
                resolver: resolver.clone(),
                provider,
                path,
            });
        }

        let mut last_error = None;
        let mut skipped = Vec::new();
        for resolver in &self.resolvers {
            if zone.is_some() && resolver.zone() != zone {
                continue;
            }

            let path = match resolver.dataset_or_default(path) {
                Ok(path) => path,
                Err(e) => {
                    skipped.push(e.to_string());
                    continue;
                }
            };

            match resolver.resolve(&path).await {
                Ok(provider) => {
                    debug!("{} resolved on backend {}", path, resolver.name());
                    return Ok(Resolution {
                        resolver: resolver.clone(),
                        provider,
                        path,
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) => Err(e),
            None if skipped.is_empty() => Err(Error::NoBackendAvailable(match zone {
                Some(zone) => format!("no backend configured in zone '{}'", zone),
                None => "no backend configured".to_string(),
            })),
            None => Err(Error::NoBackendAvailable(skipped.join("; "))),
        }
    }
}

// =============================================================================
// Backend Registry
// =============================================================================

/// Publishes the current backend set
#[derive(Default)]
pub struct BackendRegistry {
    current: RwLock<Arc<BackendSet>>,
}

impl BackendRegistry {
    pub fn new(backends: BackendSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(backends)),
        }
    }

    /// Set to use for one request
    pub fn current(&self) -> Arc<BackendSet> {
        self.current.read().clone()
    }

    /// Replace the whole set
    pub fn publish(&self, backends: BackendSet) {
        let names: Vec<&str> = backends.resolvers().iter().map(|r| r.name()).collect();
        info!("Publishing backends: {}", names.join(", "));
        *self.current.write() = Arc::new(backends);
    }
}

/// Warn about multi-endpoint backends that are not one RSF cluster
pub async fn check_clusters(backends: &BackendSet) {
    for resolver in backends.resolvers() {
        if resolver.providers().len() < 2 {
            continue;
        }
        match resolver.is_cluster().await {
            Ok(true) => info!("Backend {} is an RSF cluster", resolver.name()),
            Ok(false) => warn!(
                "Backend {} lists {} endpoints that are not one RSF cluster",
                resolver.name(),
                resolver.providers().len()
            ),
            Err(e) => warn!(
                "Backend {}: cannot query RSF cluster membership: {}",
                resolver.name(),
                e
            ),
        }
    }
}
