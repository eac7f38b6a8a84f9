use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::platform::MachineIdentity;

use super::{base_url, payload::MetricsPayload, RemoteService, Verification};

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    emp_id: i64,
}

pub struct HttpRemoteService {
    client: Client,
    base: String,
}

impl HttpRemoteService {
    pub fn new(host: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base: base_url(host),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    #[instrument(skip(self))]
    async fn verify_uuid(&self, identity: &MachineIdentity) -> Result<Verification> {
        let url = format!("{}/verify-uuid", self.base);
        let response = self
            .client
            .get(&url)
            .query(&[("uuid", identity.as_str())])
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?;

        let status = response.status();
        if status != StatusCode::OK {
            debug!("Identity check returned {status}");
            return Ok(Verification::Unknown {
                status: status.as_u16(),
            });
        }

        let body = response
            .json::<VerifyResponse>()
            .await
            .context("Identity check returned an unexpected body")?;
        Ok(Verification::Known {
            emp_id: body.emp_id,
        })
    }

    #[instrument(skip_all, fields(date = %payload.date))]
    async fn push_metrics(&self, payload: &MetricsPayload) -> Result<()> {
        let url = format!("{}/metrics", self.base);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        info!("Response persisting in server {status}: {body}");
        if !status.is_success() {
            return Err(anyhow!("Metrics were rejected with {status}"));
        }
        Ok(())
    }
}
