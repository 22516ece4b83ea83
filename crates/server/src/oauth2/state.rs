//! Shared state for the OAuth2 endpoints.

use crate::config::AppConfig;
use crate::keys::KeyManager;
use crate::oauth2::tokens::TokenCodec;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// State threaded through every OAuth2 handler. The key manager is read-only
/// after startup; the database connection is the only mutable shared resource.
#[derive(Clone)]
pub struct OAuth2State {
    pub db: Arc<DatabaseConnection>,
    pub keys: Arc<KeyManager>,
    /// Base URL used as the `iss` claim and in discovery metadata
    pub issuer_url: String,
    /// Access token lifetime in seconds
    pub access_token_lifetime: i64,
    /// Refresh token lifetime in seconds
    pub refresh_token_lifetime: i64,
    /// Authorization code lifetime in seconds
    pub authorization_code_lifetime: i64,
}

impl OAuth2State {
    pub fn new(db: Arc<DatabaseConnection>, keys: Arc<KeyManager>, config: &AppConfig) -> Self {
        Self {
            db,
            keys,
            issuer_url: config.issuer_url.clone(),
            access_token_lifetime: config.oauth2.access_token_lifetime,
            refresh_token_lifetime: config.oauth2.refresh_token_lifetime,
            authorization_code_lifetime: config.oauth2.authorization_code_lifetime,
        }
    }

    pub fn codec(&self) -> TokenCodec<'_> {
        TokenCodec::new(&self.keys, &self.issuer_url, self.access_token_lifetime)
    }
}
