use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::storage::KeyValueStore;

/// Storage key for the access token
const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the refresh token
const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// An access/refresh token pair. Both values are opaque to the client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    #[serde(rename = "accessToken", alias = "access_token")]
    pub access_token: String,
    #[serde(rename = "refreshToken", alias = "refresh_token")]
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens stay out of logs
impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Default)]
struct Tokens {
    access: Option<String>,
    refresh: Option<String>,
}

/// The current session's tokens, mirrored to durable storage.
///
/// Reads are served from memory. `set` swaps both tokens under one write
/// lock before persisting, so no reader ever sees a mixed pair.
pub struct CredentialStore {
    storage: Arc<dyn KeyValueStore>,
    tokens: RwLock<Tokens>,
}

impl CredentialStore {
    /// Open the store, loading whatever the backend has persisted.
    pub fn open(storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let access = storage
            .get(ACCESS_TOKEN_KEY)
            .context("Failed to load access token")?;
        let refresh = storage
            .get(REFRESH_TOKEN_KEY)
            .context("Failed to load refresh token")?;
        debug!(
            has_access = access.is_some(),
            has_refresh = refresh.is_some(),
            "Credential store opened"
        );

        Ok(Self {
            storage,
            tokens: RwLock::new(Tokens { access, refresh }),
        })
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens.read().access.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.tokens.read().refresh.clone()
    }

    /// Both tokens, if a complete pair is held.
    pub fn pair(&self) -> Option<CredentialPair> {
        let tokens = self.tokens.read();
        match (&tokens.access, &tokens.refresh) {
            (Some(access), Some(refresh)) => Some(CredentialPair::new(access, refresh)),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.read().access.is_some()
    }

    /// Replace both tokens.
    ///
    /// The in-memory pair is updated even when persisting fails; the error
    /// only means the session will not survive a restart.
    pub fn set(&self, pair: &CredentialPair) -> Result<()> {
        {
            let mut tokens = self.tokens.write();
            tokens.access = Some(pair.access_token.clone());
            tokens.refresh = Some(pair.refresh_token.clone());
        }
        self.storage
            .set(ACCESS_TOKEN_KEY, &pair.access_token)
            .context("Failed to persist access token")?;
        self.storage
            .set(REFRESH_TOKEN_KEY, &pair.refresh_token)
            .context("Failed to persist refresh token")?;
        Ok(())
    }

    /// Forget both tokens, in memory and in storage.
    pub fn clear(&self) -> Result<()> {
        *self.tokens.write() = Tokens::default();
        self.storage
            .remove(ACCESS_TOKEN_KEY)
            .context("Failed to remove access token")?;
        self.storage
            .remove(REFRESH_TOKEN_KEY)
            .context("Failed to remove refresh token")?;
        Ok(())
    }
}
