use std::fmt;

use serde::{Deserialize, Serialize};

use super::user::User;
use crate::auth::CredentialPair;

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Registration takes the same fields as login.
pub type RegisterRequest = LoginRequest;

/// Body of a successful login or registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: CredentialPair,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(default)]
    pub username: String,
}
