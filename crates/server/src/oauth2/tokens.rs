//! Token codec: stateless JWT access and ID tokens.
//!
//! Access and ID tokens are RS256 JWTs signed by the [`KeyManager`]; nothing
//! is persisted for them. Verification accepts exactly one algorithm and
//! enforces expiry.

use crate::entity::oauth2_user;
use crate::error::OAuthError;
use crate::keys::KeyManager;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub sub: String,
    pub client_id: String,
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.split_whitespace().any(|s| s == scope)
    }
}

/// Claims carried by an OpenID Connect ID token. Profile and email claims
/// are only present when the corresponding scope was granted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub auth_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

/// Mints and verifies the stateless tokens for one issuer.
pub struct TokenCodec<'a> {
    keys: &'a KeyManager,
    issuer: &'a str,
    access_token_lifetime: i64,
}

impl<'a> TokenCodec<'a> {
    pub fn new(keys: &'a KeyManager, issuer: &'a str, access_token_lifetime: i64) -> Self {
        Self {
            keys,
            issuer,
            access_token_lifetime,
        }
    }

    pub fn issue_access_token(
        &self,
        user_id: &str,
        client_id: &str,
        scope: &str,
    ) -> Result<String, OAuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AccessClaims {
            iss: self.issuer.to_string(),
            sub: user_id.to_string(),
            client_id: client_id.to_string(),
            scope: scope.to_string(),
            iat: now,
            exp: now + self.access_token_lifetime,
        };
        Ok(self.keys.sign(&claims)?)
    }

    pub fn issue_id_token(
        &self,
        user: &oauth2_user::Model,
        client_id: &str,
        scope: &str,
        nonce: Option<&str>,
        auth_time: OffsetDateTime,
    ) -> Result<String, OAuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let scopes: Vec<&str> = scope.split_whitespace().collect();
        let has = |s: &str| scopes.iter().any(|x| *x == s);

        let claims = IdClaims {
            iss: self.issuer.to_string(),
            sub: user.id.clone(),
            aud: client_id.to_string(),
            iat: now,
            exp: now + self.access_token_lifetime,
            auth_time: auth_time.unix_timestamp(),
            nonce: nonce.map(String::from),
            name: if has("profile") {
                user.name.clone()
            } else {
                None
            },
            email: if has("email") {
                Some(user.email.clone())
            } else {
                None
            },
            email_verified: if has("email") {
                Some(user.email_verified)
            } else {
                None
            },
        };
        Ok(self.keys.sign(&claims)?)
    }

    /// Verify an access token's signature and expiry.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, OAuthError> {
        self.keys
            .verify::<AccessClaims>(token, &self.keys.validation())
            .map_err(|_| OAuthError::InvalidToken("access token is invalid or expired".into()))
    }
}
