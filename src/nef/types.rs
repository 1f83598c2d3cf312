//! NEF wire envelopes
//!
//! Resource bodies decode straight into the domain structs in
//! `domain::ports`; this module holds the envelopes around them.

use serde::{Deserialize, Serialize};

/// Envelope of list endpoints: `{"data": [...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct DataList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// `POST auth/login` request
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// `POST auth/login` response
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Link of a 202 Accepted response
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub rel: String,
    #[serde(default)]
    pub href: String,
}

/// Body of a 202 Accepted response
#[derive(Debug, Clone, Deserialize)]
pub struct AcceptedBody {
    pub links: Vec<Link>,
}

impl AcceptedBody {
    /// Href of the first `monitor` link
    pub fn monitor_href(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == "monitor")
            .map(|link| link.href.as_str())
    }
}

/// `GET nas/smb/<path>` response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmbShare {
    pub share_name: String,
}

/// `POST nas/smb` request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSmbShareRequest<'a> {
    pub filesystem: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_name: Option<&'a str>,
}

/// Host entry of an NFS access list
#[derive(Debug, Clone, Serialize)]
pub struct NfsAccessEntry {
    pub etype: &'static str,
    pub entity: &'static str,
}

/// Security context of an NFS share
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NfsSecurityContext {
    pub security_modes: Vec<&'static str>,
    pub read_write_list: Vec<NfsAccessEntry>,
    pub root_list: Vec<NfsAccessEntry>,
}

/// `POST nas/nfs` request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNfsShareRequest<'a> {
    pub filesystem: &'a str,
    pub anon: &'static str,
    pub security_contexts: Vec<NfsSecurityContext>,
}

impl<'a> CreateNfsShareRequest<'a> {
    /// Read-write share for every host, root squashed to root
    pub fn open(filesystem: &'a str) -> Self {
        let everyone = || NfsAccessEntry {
            etype: "fqdn",
            entity: "*",
        };
        Self {
            filesystem,
            anon: "root",
            security_contexts: vec![NfsSecurityContext {
                security_modes: vec!["sys"],
                read_write_list: vec![everyone()],
                root_list: vec![everyone()],
            }],
        }
    }
}
