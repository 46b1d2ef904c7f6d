//! REST API client module for the music-band catalog backend.
//!
//! Every call goes through [`AuthMiddleware`], which attaches the bearer
//! token and recovers from expired access tokens via the shared
//! [`RefreshCoordinator`](crate::auth::RefreshCoordinator).

pub mod client;
pub mod error;
pub mod middleware;

pub use client::ApiClient;
pub use error::{truncate_body, ApiError};
pub use middleware::AuthMiddleware;

use anyhow::{Context, Result};
use url::Url;

pub const LOGIN_PATH: &str = "auth/login";
pub const REGISTER_PATH: &str = "auth/register";
pub const REFRESH_PATH: &str = "auth/refresh";
pub const LOGOUT_PATH: &str = "auth/logout";
pub const VALIDATE_PATH: &str = "auth/validate";
pub const CURRENT_USER_PATH: &str = "users/me";
pub const PERMISSIONS_PATH: &str = "users/permissions";
pub const MUSIC_BANDS_PATH: &str = "music-bands";

/// Parse a base URL, making sure relative endpoints resolve beneath it.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("Invalid API URL: {}", raw))?;
    Ok(with_trailing_slash(url))
}

/// Resolve an endpoint path against the API base URL.
pub fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let base = with_trailing_slash(base.clone());
    base.join(path.trim_start_matches('/'))
        .with_context(|| format!("Invalid endpoint path: {}", path))
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
