//! Volume and snapshot identifiers
//!
//! Identifiers handed to the orchestrator encode which backend owns a
//! dataset:
//!
//! ```text
//! volume:    <backend>:<pool/dataset/fs>
//! snapshot:  <backend>:<pool/dataset/fs>@<snapshot>
//! legacy:    <pool/dataset/fs>            (no backend, search all)
//! ```
//!
//! Decoding splits on the first `:` and then on the first `@`, so a dataset
//! path may itself contain further `:` characters.

use crate::error::{Error, Result};
use std::fmt;

/// Separates the backend name from the dataset path
pub const BACKEND_SEPARATOR: char = ':';

/// Separates a dataset path from a snapshot name
pub const SNAPSHOT_SEPARATOR: char = '@';

/// Decoded identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    /// Backend name; `None` for legacy identifiers
    pub backend: Option<String>,
    /// Dataset path on the appliance (parent path for snapshots)
    pub path: String,
    /// Snapshot short name
    pub snapshot: Option<String>,
}

impl Identifier {
    /// Identifier of a volume on a named backend
    pub fn volume(backend: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            backend: Some(backend.into()),
            path: path.into(),
            snapshot: None,
        }
    }

    /// Identifier of a snapshot on a named backend
    pub fn snapshot(
        backend: impl Into<String>,
        path: impl Into<String>,
        snapshot: impl Into<String>,
    ) -> Self {
        Self {
            backend: Some(backend.into()),
            path: path.into(),
            snapshot: Some(snapshot.into()),
        }
    }

    /// Decode any identifier
    pub fn decode(id: &str) -> Result<Self> {
        let (backend, rest) = match id.split_once(BACKEND_SEPARATOR) {
            Some((backend, rest)) => {
                if backend.is_empty() {
                    return Err(invalid(id, "empty backend name"));
                }
                (Some(backend.to_string()), rest)
            }
            None => (None, id),
        };

        let (path, snapshot) = match rest.split_once(SNAPSHOT_SEPARATOR) {
            Some((path, snapshot)) => {
                if snapshot.is_empty() {
                    return Err(invalid(id, "empty snapshot name"));
                }
                (path, Some(snapshot.to_string()))
            }
            None => (rest, None),
        };

        if path.is_empty() {
            return Err(invalid(id, "empty dataset path"));
        }

        Ok(Self {
            backend,
            path: path.to_string(),
            snapshot,
        })
    }

    /// Decode an identifier that must name a volume
    pub fn parse_volume(id: &str) -> Result<Self> {
        let decoded = Self::decode(id)?;
        if decoded.snapshot.is_some() {
            return Err(invalid(id, "expected a volume, got a snapshot"));
        }
        Ok(decoded)
    }

    /// Decode an identifier that must name a snapshot
    pub fn parse_snapshot(id: &str) -> Result<Self> {
        let decoded = Self::decode(id)?;
        if decoded.snapshot.is_none() {
            return Err(invalid(id, "expected <backend>:<path>@<snapshot>"));
        }
        Ok(decoded)
    }

    /// Full appliance path: `pool/fs` or `pool/fs@snapshot`
    pub fn full_path(&self) -> String {
        match &self.snapshot {
            Some(snapshot) => format!("{}{}{}", self.path, SNAPSHOT_SEPARATOR, snapshot),
            None => self.path.clone(),
        }
    }

    /// Identifier of the parent volume of a snapshot (or of self)
    pub fn parent_volume(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            path: self.path.clone(),
            snapshot: None,
        }
    }

    /// Encoded form
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(backend) = &self.backend {
            write!(f, "{}{}", backend, BACKEND_SEPARATOR)?;
        }
        f.write_str(&self.full_path())
    }
}

impl std::str::FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

/// Check that a backend name can be embedded in an identifier
pub fn validate_backend_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Configuration("backend name must not be empty".into()));
    }
    if name.contains(BACKEND_SEPARATOR) || name.contains(SNAPSHOT_SEPARATOR) {
        return Err(Error::Configuration(format!(
            "backend name '{}' must not contain '{}' or '{}'",
            name, BACKEND_SEPARATOR, SNAPSHOT_SEPARATOR
        )));
    }
    Ok(())
}

fn invalid(id: &str, reason: &str) -> Error {
    Error::InvalidIdentifier {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}
