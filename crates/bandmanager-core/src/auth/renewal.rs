//! The `/auth/refresh` exchange.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::credentials::CredentialPair;
use super::error::RenewalError;
use crate::api::{endpoint, truncate_body, REFRESH_PATH};

/// Exchanges a refresh token for a new credential pair.
///
/// One call is one network exchange. Retrying is the caller's decision.
#[async_trait]
pub trait RenewalClient: Send + Sync {
    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, RenewalError>;
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

/// Renewal over HTTP on a bare client, outside the authenticated middleware.
#[derive(Clone)]
pub struct HttpRenewalClient {
    client: Client,
    refresh_url: Url,
}

impl HttpRenewalClient {
    pub fn new(client: Client, base_url: &Url) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            refresh_url: endpoint(base_url, REFRESH_PATH)?,
        })
    }
}

#[async_trait]
impl RenewalClient for HttpRenewalClient {
    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, RenewalError> {
        debug!(url = %self.refresh_url, "Requesting token renewal");

        let response = self
            .client
            .post(self.refresh_url.clone())
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RenewalError::NetworkUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenewalError::Rejected {
                status: status.as_u16(),
                message: truncate_body(&body),
            });
        }

        response
            .json::<CredentialPair>()
            .await
            .map_err(|e| RenewalError::InvalidResponse(e.to_string()))
    }
}
