//! OAuth2 error taxonomy.
//!
//! Every validation failure is represented as an explicit error kind so the
//! endpoints can map it deterministically to an HTTP status and RFC 6749
//! error code. Store failures are logged and surfaced as 503 without detail.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// RFC-shaped error body returned by all OAuth2 endpoints.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// OAuth2 error code (e.g. "invalid_grant", "invalid_client")
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("invalid_request: {0}")]
    InvalidRequest(String),
    /// Unknown client or bad secret. Deliberately undifferentiated so the
    /// response never reveals whether the client id exists.
    #[error("invalid_client")]
    InvalidClient,
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),
    #[error("invalid_scope: {0}")]
    InvalidScope(String),
    #[error("unsupported_grant_type")]
    UnsupportedGrantType,
    /// Bearer token rejected at a resource endpoint (userinfo).
    #[error("invalid_token: {0}")]
    InvalidToken(String),
    #[error("insufficient_scope: token requires '{0}' scope")]
    InsufficientScope(&'static str),
    #[error("store unavailable: {0}")]
    Store(#[from] sea_orm::DbErr),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<crate::keys::KeyError> for OAuthError {
    fn from(e: crate::keys::KeyError) -> Self {
        OAuthError::Internal(e.to_string())
    }
}

impl OAuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::InvalidToken(_) => "invalid_token",
            OAuthError::InsufficientScope(_) => "insufficient_scope",
            OAuthError::Store(_) => "temporarily_unavailable",
            OAuthError::Internal(_) => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OAuthError::InvalidRequest(_)
            | OAuthError::InvalidGrant(_)
            | OAuthError::InvalidScope(_)
            | OAuthError::UnsupportedGrantType => StatusCode::BAD_REQUEST,
            OAuthError::InvalidClient | OAuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            OAuthError::InsufficientScope(_) => StatusCode::FORBIDDEN,
            OAuthError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            OAuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn description(&self) -> Option<String> {
        match self {
            // Undifferentiated: no hint whether the id or the secret was wrong.
            OAuthError::InvalidClient => None,
            // Internal detail is logged, never returned.
            OAuthError::Store(_) | OAuthError::Internal(_) => None,
            OAuthError::InvalidRequest(d) | OAuthError::InvalidGrant(d) => Some(d.clone()),
            OAuthError::InvalidScope(d) => Some(d.clone()),
            OAuthError::UnsupportedGrantType => None,
            OAuthError::InvalidToken(d) => Some(d.clone()),
            OAuthError::InsufficientScope(scope) => {
                Some(format!("Token requires '{scope}' scope"))
            }
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        match &self {
            OAuthError::Store(e) => {
                tracing::error!("Store error surfaced to client as 503: {e}");
            }
            OAuthError::Internal(e) => {
                tracing::error!("Internal error surfaced to client as 500: {e}");
            }
            _ => {}
        }
        let body = ErrorBody {
            error: self.error_code().to_string(),
            error_description: self.description(),
        };
        let mut response = (self.status_code(), Json(body)).into_response();
        match &self {
            OAuthError::InvalidClient => {
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Basic realm=\"oauth\""),
                );
            }
            OAuthError::InvalidToken(_) | OAuthError::InsufficientScope(_) => {
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer"),
                );
            }
            _ => {}
        }
        response
    }
}
