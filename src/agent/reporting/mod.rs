//! Communication with the remote collection service. [RemoteService] abstracts the two calls the
//! agent makes, [http::HttpRemoteService] is the real implementation.

use anyhow::Result;
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::platform::MachineIdentity;

pub mod http;
pub mod payload;
#[cfg(test)]
mod test_server;

use payload::MetricsPayload;

/// What the remote side knows about this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The machine is registered to the employee with this id.
    Known { emp_id: i64 },
    /// Any non-200 response. The machine is unknown or was revoked.
    Unknown { status: u16 },
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn verify_uuid(&self, identity: &MachineIdentity) -> Result<Verification>;

    async fn push_metrics(&self, payload: &MetricsPayload) -> Result<()>;
}

/// Accepts either a bare `host[:port]` or a full url.
pub fn base_url(host: &str) -> String {
    let host = host.trim();
    let base = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("http://{host}")
    };
    base.trim_end_matches('/').to_owned()
}
