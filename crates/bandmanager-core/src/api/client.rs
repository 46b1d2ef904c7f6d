//! API client for the music-band catalog REST backend.
//!
//! This module provides the `ApiClient` struct: typed calls for the auth and
//! music-band endpoints, all sent through the [`AuthMiddleware`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::middleware::AuthMiddleware;
use super::{
    endpoint, parse_base_url, ApiError, CURRENT_USER_PATH, LOGIN_PATH, LOGOUT_PATH,
    MUSIC_BANDS_PATH, PERMISSIONS_PATH, REGISTER_PATH, VALIDATE_PATH,
};
use crate::auth::{CredentialStore, HttpRenewalClient, Navigator, RefreshCoordinator};
use crate::models::{
    AuthResponse, LoginRequest, MusicBand, MusicBandFilter, Page, PageRequest, RegisterRequest,
    TokenValidation, User,
};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the catalog backend.
/// Clone is cheap - the connection pool and refresh coordinator are shared.
#[derive(Clone)]
pub struct ApiClient {
    http: AuthMiddleware,
    base_url: Url,
}

impl ApiClient {
    /// Create a client that renews credentials against the same backend.
    pub fn new(
        base_url: &str,
        store: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        Self::with_timeout(
            base_url,
            store,
            navigator,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        base_url: &str,
        store: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = parse_base_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let renewer = Arc::new(HttpRenewalClient::new(client.clone(), &base_url)?);
        let coordinator = Arc::new(RefreshCoordinator::new(store, renewer, navigator));

        Ok(Self::with_coordinator(client, base_url, coordinator))
    }

    /// Build on an existing coordinator, e.g. one shared with other clients.
    pub fn with_coordinator(
        client: Client,
        base_url: Url,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            http: AuthMiddleware::new(client, coordinator),
            base_url,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        self.http.coordinator().store()
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        self.http.coordinator()
    }

    fn url(&self, path: &str) -> Result<Url> {
        endpoint(&self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Send through the middleware, backing off on 429.
    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build().context("Failed to build request")?;
        let url = request.url().clone();
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let attempt = request
                .try_clone()
                .ok_or_else(|| anyhow::anyhow!("Request to {} cannot be retried", url))?;
            let response = self.http.send(attempt).await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.send(builder).await?;
        let url = response.url().clone();
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    // ===== Authentication =====

    /// Log in and return the user with a fresh credential pair.
    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        let builder = self.http.client().post(self.url(LOGIN_PATH)?).json(request);
        self.send_json(builder).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        let builder = self.http.client().post(self.url(REGISTER_PATH)?).json(request);
        self.send_json(builder).await
    }

    /// Invalidate the current token server-side.
    pub async fn logout(&self) -> Result<()> {
        let builder = self
            .http
            .client()
            .post(self.url(LOGOUT_PATH)?)
            .json(&serde_json::json!({}));
        self.send(builder).await?;
        Ok(())
    }

    pub async fn validate_token(&self, token: &str) -> Result<TokenValidation> {
        let builder = self
            .http
            .client()
            .post(self.url(VALIDATE_PATH)?)
            .json(&serde_json::json!({ "token": token }));
        self.send_json(builder).await
    }

    pub async fn current_user(&self) -> Result<User> {
        let builder = self.http.client().get(self.url(CURRENT_USER_PATH)?);
        self.send_json(builder).await
    }

    /// Permission names granted by the server.
    pub async fn permissions(&self) -> Result<Vec<String>> {
        let builder = self.http.client().get(self.url(PERMISSIONS_PATH)?);
        self.send_json(builder).await
    }

    // ===== Music Bands =====

    pub async fn list_music_bands(
        &self,
        filter: &MusicBandFilter,
        page: &PageRequest,
    ) -> Result<Page<MusicBand>> {
        let builder = self
            .http
            .client()
            .get(self.url(MUSIC_BANDS_PATH)?)
            .query(filter)
            .query(&page.query_pairs());
        let page: Page<MusicBand> = self.send_json(builder).await?;
        debug!(
            count = page.content.len(),
            total = page.total_elements,
            "Fetched music bands"
        );
        Ok(page)
    }

    pub async fn get_music_band(&self, id: i64) -> Result<MusicBand> {
        let url = self.url(&format!("{}/{}", MUSIC_BANDS_PATH, id))?;
        self.send_json(self.http.client().get(url)).await
    }

    pub async fn delete_music_band(&self, id: i64) -> Result<()> {
        let url = self.url(&format!("{}/{}", MUSIC_BANDS_PATH, id))?;
        self.send(self.http.client().delete(url)).await?;
        Ok(())
    }
}
