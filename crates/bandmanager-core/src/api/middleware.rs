//! Bearer-token middleware around `reqwest::Client`.

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Request, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::{truncate_body, ApiError};
use crate::auth::coordinator::authorize;
use crate::auth::{PendingRequest, RefreshCoordinator};

/// Endpoints that must never carry a bearer token nor trigger renewal.
const UNAUTHENTICATED_PATHS: [&str; 3] = ["/auth/login", "/auth/register", "/auth/refresh"];

/// Whether a URL targets one of the login/register/refresh endpoints.
pub fn is_unauthenticated(url: &Url) -> bool {
    let path = url.path().trim_end_matches('/');
    UNAUTHENTICATED_PATHS.iter().any(|p| path.ends_with(p))
}

/// Sends requests with the current access token and recovers from 401s.
///
/// Clone is cheap: the client and the coordinator are both shared.
#[derive(Clone)]
pub struct AuthMiddleware {
    client: Client,
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthMiddleware {
    pub fn new(client: Client, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            client,
            coordinator,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Send a request through the authenticated pipeline.
    ///
    /// A 401 on a protected endpoint is handed to the coordinator and the
    /// request is re-sent once with the renewed token. If that retry is
    /// rejected too the result is [`ApiError::RetryExhausted`]; any other
    /// response is returned unchanged.
    pub async fn send(&self, mut request: Request) -> Result<Response> {
        if is_unauthenticated(request.url()) {
            request.headers_mut().remove(AUTHORIZATION);
            return self.execute(request).await;
        }

        let access_token = self.coordinator.store().access_token();
        if let Some(ref token) = access_token {
            request = authorize(request, token).map_err(ApiError::from)?;
        }

        let retry = request.try_clone();
        let response = self.execute(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(retry) = retry else {
            warn!(url = %response.url(), "Unauthorized request has a streaming body, not retrying");
            return Ok(response);
        };
        drop(response);

        debug!(url = %retry.url(), "Request unauthorized, waiting for credential renewal");
        let retry = self
            .coordinator
            .handle_auth_failure(PendingRequest::new(retry, access_token))
            .await
            .map_err(ApiError::from)?;

        let url = retry.url().clone();
        let response = self.execute(retry).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %url, "Request rejected again after renewal");
            return Err(ApiError::RetryExhausted(truncate_body(&body)).into());
        }

        Ok(response)
    }

    async fn execute(&self, request: Request) -> Result<Response> {
        let method = request.method().clone();
        let url = request.url().clone();
        self.client
            .execute(request)
            .await
            .map_err(ApiError::NetworkError)
            .with_context(|| format!("Failed to send {} request to {}", method, url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_unauthenticated() {
        let url = |s: &str| Url::parse(s).unwrap();

        assert!(is_unauthenticated(&url("http://h/auth/login")));
        assert!(is_unauthenticated(&url("http://h/api/auth/register")));
        assert!(is_unauthenticated(&url("http://h/api/auth/refresh/")));

        assert!(!is_unauthenticated(&url("http://h/auth/logout")));
        assert!(!is_unauthenticated(&url("http://h/auth/validate")));
        assert!(!is_unauthenticated(&url("http://h/music-bands")));
        assert!(!is_unauthenticated(&url("http://h/auth/login-history")));
    }
}
