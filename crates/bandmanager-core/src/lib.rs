//! Core library for the music-band catalog client.
//!
//! The interesting part lives in [`auth`] and [`api::middleware`]: every
//! outgoing call gets the current bearer token attached, and when the backend
//! answers 401 a single credential renewal is shared by all the requests that
//! failed, which are then retried once with the fresh token.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, AuthService, CredentialPair, CredentialStore, RefreshCoordinator};
pub use config::Config;
