//! Authentication module for managing credentials and their renewal.
//!
//! This module provides:
//! - `KeyValueStore`: durable storage backends (OS keychain, JSON file, memory)
//! - `CredentialStore`: the current access/refresh token pair
//! - `RenewalClient`: the `/auth/refresh` exchange
//! - `RefreshCoordinator`: single-flight renewal shared by concurrent requests
//! - `AuthService`: login, register, logout and session checks

pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod navigation;
pub mod renewal;
pub mod service;
pub mod storage;

pub use coordinator::{PendingRequest, RefreshCoordinator};
pub use credentials::{CredentialPair, CredentialStore};
pub use error::{AuthError, RenewalError, TerminalCause};
pub use navigation::Navigator;
pub use renewal::{HttpRenewalClient, RenewalClient};
pub use service::{AuthService, SessionStatus};
pub use storage::{FileStorage, KeyValueStore, KeyringStorage, MemoryStorage};
