//! Data models for the music-band catalog backend.
//!
//! - `User`, `Role`, `Permission`: accounts and what they may do
//! - Auth payloads: `LoginRequest`, `RegisterRequest`, `AuthResponse`
//! - `MusicBand` and its nested entities, plus paging and filtering

pub mod auth;
pub mod music_band;
pub mod user;

pub use auth::{AuthResponse, LoginRequest, RegisterRequest, TokenValidation};
pub use music_band::{
    Album, Coordinates, MusicBand, MusicBandFilter, MusicGenre, Page, PageRequest, Person,
    SortDirection,
};
pub use user::{Permission, Role, User};
