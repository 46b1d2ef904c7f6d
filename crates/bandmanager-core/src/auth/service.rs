//! Login, registration, logout and the startup session check.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, User};

/// Outcome of checking a persisted session at startup.
#[derive(Debug, Clone)]
pub enum SessionStatus {
    SignedOut,
    SignedIn(User),
}

impl SessionStatus {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionStatus::SignedIn(user) => Some(user),
            SessionStatus::SignedOut => None,
        }
    }
}

/// Session lifecycle on top of an [`ApiClient`] and its credential store.
#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.store().is_authenticated()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        let response = self
            .api
            .login(&LoginRequest::new(username, password))
            .await?;
        self.start_session(response)
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User> {
        let response = self
            .api
            .register(&RegisterRequest::new(username, password))
            .await?;
        self.start_session(response)
    }

    fn start_session(&self, response: AuthResponse) -> Result<User> {
        self.api.store().set(&response.tokens)?;
        info!(username = %response.user.username, "Session started");
        Ok(response.user)
    }

    /// End the session. The server call is best-effort; local credentials
    /// are always cleared.
    pub async fn logout(&self) -> Result<()> {
        if self.is_authenticated() {
            if let Err(e) = self.api.logout().await {
                warn!(error = %e, "Server-side logout failed, clearing local session anyway");
            }
        }
        self.api.store().clear()?;
        info!("Logged out");
        Ok(())
    }

    /// Permission names for `user`: the role table merged with whatever the
    /// server reports. Falls back to the role table if the server call fails.
    pub async fn permissions(&self, user: &User) -> BTreeSet<String> {
        let mut permissions: BTreeSet<String> = user
            .role_permissions()
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();

        match self.api.permissions().await {
            Ok(server) => permissions.extend(server),
            Err(e) => {
                warn!(error = %e, "Failed to load permissions from server, using role-based permissions")
            }
        }
        permissions
    }

    /// Work out whether the persisted credentials still describe a session.
    ///
    /// A rejected access token is not final while a refresh token is held:
    /// fetching the current user goes through the middleware, which renews
    /// the token on 401. Transport and server errors are returned as errors
    /// and leave the stored credentials alone.
    pub async fn check_auth_status(&self) -> Result<SessionStatus> {
        let store = self.api.store();
        let Some(access_token) = store.access_token() else {
            store.clear()?;
            return Ok(SessionStatus::SignedOut);
        };

        let validation = self.api.validate_token(&access_token).await?;
        if !validation.valid && store.refresh_token().is_none() {
            debug!("Stored access token invalid and no refresh token held");
            store.clear()?;
            return Ok(SessionStatus::SignedOut);
        }

        match self.api.current_user().await {
            Ok(user) => Ok(SessionStatus::SignedIn(user)),
            Err(e) => match e.downcast_ref::<ApiError>() {
                Some(api_err) if api_err.is_session_ended() => {
                    debug!(error = %api_err, "Stored session no longer accepted");
                    store.clear()?;
                    Ok(SessionStatus::SignedOut)
                }
                _ => Err(e),
            },
        }
    }
}
