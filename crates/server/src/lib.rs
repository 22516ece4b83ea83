//! OAuth 2.1 / OpenID Connect identity provider for the campus platform.
//!
//! Issues and verifies JWT access and ID tokens, rotates refresh tokens with
//! reuse detection and family revocation, and serves introspection,
//! revocation and discovery endpoints.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::keys::KeyManager;

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod keys;
pub mod oauth2;

#[derive(Clone)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    /// Read-only after startup; shared across all requests without locking.
    pub keys: Arc<KeyManager>,
}
