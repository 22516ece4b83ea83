//! OAuth2 HTTP endpoints.
//!
//! Implements the token endpoint (authorization_code and refresh_token
//! grants), token introspection (RFC 7662), token revocation (RFC 7009) and
//! the OpenID Connect UserInfo endpoint. Each handler is a composition of
//! the client registry, code store, rotation engine and token codec; every
//! failure maps deterministically onto an RFC error body via `OAuthError`.

use crate::entity::oauth2_user;
use crate::error::OAuthError;
use crate::oauth2::{OAUTH2_TAG, clients, codes, refresh, state::OAuth2State, tokens};
use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the OAuth2 router.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(token))
        .routes(routes!(introspect))
        .routes(routes!(revoke))
        .routes(routes!(userinfo))
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IntrospectRequest {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// RFC 7662 introspection response. Inactive tokens serialize to exactly
/// `{"active": false}`: not-found, expired and revoked are indistinguishable.
#[derive(Debug, Serialize, ToSchema)]
pub struct IntrospectResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl IntrospectResponse {
    fn inactive() -> Self {
        Self {
            active: false,
            scope: None,
            client_id: None,
            sub: None,
            token_type: None,
            exp: None,
            iat: None,
            iss: None,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserInfoResponse {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// =============================================================================
// Endpoints
// =============================================================================

/// OAuth2 Token endpoint.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange an authorization code or refresh token for tokens",
    description = "Exchanges an authorization code for tokens, or rotates a refresh token.\n\n\
                   **Supported grant types:**\n\
                   - `authorization_code`: requires `code`, `redirect_uri` and the PKCE `code_verifier`\n\
                   - `refresh_token`: requires `refresh_token`; the presented token is superseded and a \
                     new one is returned\n\n\
                   **Client authentication:** HTTP Basic auth or `client_id`/`client_secret` in the \
                   form body, identically.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued successfully", body = TokenResponse),
        (status = 400, description = "Invalid request, grant, or scope", body = crate::error::ErrorBody),
        (status = 401, description = "Client authentication failed", body = crate::error::ErrorBody),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Form(params): Form<TokenRequest>,
) -> Result<Response, OAuthError> {
    let (client_id, client_secret) = extract_client_credentials(&headers, &params.client_id, &params.client_secret);
    let client_id = client_id
        .ok_or_else(|| OAuthError::InvalidRequest("client_id is required".into()))?;
    let client = clients::authenticate(&state.db, &client_id, client_secret.as_deref()).await?;

    let response = match params.grant_type.as_str() {
        "authorization_code" => handle_authorization_code_grant(&state, &client, params).await?,
        "refresh_token" => handle_refresh_token_grant(&state, &client, params).await?,
        _ => return Err(OAuthError::UnsupportedGrantType),
    };

    Ok(no_store(Json(response)))
}

async fn handle_authorization_code_grant(
    state: &OAuth2State,
    client: &crate::entity::oauth2_client::Model,
    params: TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    let code = params
        .code
        .ok_or_else(|| OAuthError::InvalidRequest("code is required".into()))?;
    let redirect_uri = params
        .redirect_uri
        .ok_or_else(|| OAuthError::InvalidRequest("redirect_uri is required".into()))?;
    let code_verifier = params
        .code_verifier
        .ok_or_else(|| OAuthError::InvalidRequest("code_verifier is required".into()))?;

    let auth = codes::consume(&state.db, &code, &client.id, &redirect_uri, &code_verifier).await?;

    let user = oauth2_user::Entity::find_by_id(&auth.user_id)
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| OAuthError::InvalidGrant("authorization code is invalid".into()))?;

    let codec = state.codec();
    let access_token = codec.issue_access_token(&user.id, &client.id, &auth.scope)?;
    let id_token = if auth.has_scope("openid") {
        Some(codec.issue_id_token(
            &user,
            &client.id,
            &auth.scope,
            auth.nonce.as_deref(),
            auth.created_at,
        )?)
    } else {
        None
    };
    let refresh = refresh::issue(
        &state.db,
        &client.id,
        &user.id,
        &auth.scope,
        state.refresh_token_lifetime,
    )
    .await?;

    Ok(TokenResponse {
        access_token,
        token_type: tokens::TOKEN_TYPE_BEARER.to_string(),
        expires_in: state.access_token_lifetime,
        refresh_token: Some(refresh.token),
        id_token,
        scope: auth.scope,
    })
}

async fn handle_refresh_token_grant(
    state: &OAuth2State,
    client: &crate::entity::oauth2_client::Model,
    params: TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    let presented = params
        .refresh_token
        .ok_or_else(|| OAuthError::InvalidRequest("refresh_token is required".into()))?;

    let rotated = refresh::rotate(
        &state.db,
        &presented,
        &client.id,
        params.scope.as_deref(),
        state.refresh_token_lifetime,
    )
    .await?;

    let codec = state.codec();
    let access_token =
        codec.issue_access_token(&rotated.record.user_id, &client.id, &rotated.record.scope)?;

    // An ID token travels with the refresh response only when the grant
    // originally asked for openid. auth_time stays pinned to the family's
    // original authentication.
    let id_token = if rotated.record.has_scope("openid") {
        let user = oauth2_user::Entity::find_by_id(&rotated.record.user_id)
            .one(state.db.as_ref())
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("refresh token is invalid".into()))?;
        let auth_time = refresh::family_root(&state.db, &rotated.record.family_id)
            .await?
            .map(|root| root.created_at)
            .unwrap_or(rotated.record.created_at);
        Some(codec.issue_id_token(&user, &client.id, &rotated.record.scope, None, auth_time)?)
    } else {
        None
    };

    Ok(TokenResponse {
        access_token,
        token_type: tokens::TOKEN_TYPE_BEARER.to_string(),
        expires_in: state.access_token_lifetime,
        refresh_token: Some(rotated.token),
        id_token,
        scope: rotated.record.scope,
    })
}

/// Token introspection endpoint (RFC 7662).
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/introspect",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Introspect Token",
    summary = "Query whether a token is active",
    description = "Returns metadata for an active access or refresh token, or `{\"active\": false}` \
                   otherwise. Expired, revoked and unknown tokens are indistinguishable in the \
                   response.\n\n\
                   `token_type_hint` (`access_token` or `refresh_token`) optimizes the lookup order; \
                   unknown hints are ignored per RFC 7662.",
    request_body(
        content = IntrospectRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Introspection request"
    ),
    responses(
        (status = 200, description = "Introspection result", body = IntrospectResponse),
        (status = 400, description = "Missing token parameter", body = crate::error::ErrorBody),
        (status = 401, description = "Client authentication failed", body = crate::error::ErrorBody),
    )
)]
pub async fn introspect(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Form(params): Form<IntrospectRequest>,
) -> Result<Response, OAuthError> {
    let (client_id, client_secret) =
        extract_client_credentials(&headers, &params.client_id, &params.client_secret);
    let client_id =
        client_id.ok_or_else(|| OAuthError::InvalidRequest("client_id is required".into()))?;
    clients::authenticate(&state.db, &client_id, client_secret.as_deref()).await?;

    let token = params
        .token
        .ok_or_else(|| OAuthError::InvalidRequest("token is required".into()))?;

    let response = match params.token_type_hint.as_deref() {
        Some("refresh_token") => match introspect_refresh(&state, &token).await? {
            Some(active) => active,
            None => introspect_access(&state, &token).unwrap_or_else(IntrospectResponse::inactive),
        },
        // access_token is the default; unrecognized hints are ignored.
        _ => match introspect_access(&state, &token) {
            Some(active) => active,
            None => introspect_refresh(&state, &token)
                .await?
                .unwrap_or_else(IntrospectResponse::inactive),
        },
    };

    Ok(no_store(Json(response)))
}

fn introspect_access(state: &OAuth2State, token: &str) -> Option<IntrospectResponse> {
    let claims = state.codec().verify_access_token(token).ok()?;
    Some(IntrospectResponse {
        active: true,
        scope: Some(claims.scope),
        client_id: Some(claims.client_id),
        sub: Some(claims.sub),
        token_type: Some(tokens::TOKEN_TYPE_BEARER.to_string()),
        exp: Some(claims.exp),
        iat: Some(claims.iat),
        iss: Some(claims.iss),
    })
}

async fn introspect_refresh(
    state: &OAuth2State,
    token: &str,
) -> Result<Option<IntrospectResponse>, OAuthError> {
    Ok(refresh::find_active(&state.db, token)
        .await?
        .map(|record| IntrospectResponse {
            active: true,
            scope: Some(record.scope),
            client_id: Some(record.client_id),
            sub: Some(record.user_id),
            token_type: Some("refresh_token".to_string()),
            exp: Some(record.expires_at.unix_timestamp()),
            iat: Some(record.created_at.unix_timestamp()),
            iss: None,
        }))
}

/// Token revocation endpoint (RFC 7009).
///
/// Deviates from the RFC's always-200 rule in one case: revoking a token
/// that belongs to a different client fails with 400 `invalid_grant`
/// instead of silently succeeding, to block cross-client token probing.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/revoke",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Revoke Token",
    summary = "Revoke a refresh or access token",
    description = "Revokes a refresh token and its whole rotation family. Access tokens are \
                   stateless JWTs and cannot be individually withdrawn; revoking one succeeds \
                   without persisted effect.\n\n\
                   **Behavior:**\n\
                   - Unknown or already-revoked tokens return 200 (per RFC 7009)\n\
                   - Tokens owned by a different client return 400 `invalid_grant`\n\
                   - Unknown `token_type_hint` values are ignored",
    request_body(
        content = RevokeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token revocation request"
    ),
    responses(
        (status = 200, description = "Token revoked (or was already invalid)"),
        (status = 400, description = "Missing token or cross-client revocation attempt", body = crate::error::ErrorBody),
        (status = 401, description = "Client authentication failed", body = crate::error::ErrorBody),
    )
)]
pub async fn revoke(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Form(params): Form<RevokeRequest>,
) -> Result<Response, OAuthError> {
    let (client_id, client_secret) =
        extract_client_credentials(&headers, &params.client_id, &params.client_secret);
    let client_id =
        client_id.ok_or_else(|| OAuthError::InvalidRequest("client_id is required".into()))?;
    let client = clients::authenticate(&state.db, &client_id, client_secret.as_deref()).await?;

    let token = params
        .token
        .ok_or_else(|| OAuthError::InvalidRequest("token is required".into()))?;

    if let Some(record) = refresh::find_by_secret(&state.db, &token).await? {
        if record.client_id != client.id {
            return Err(OAuthError::InvalidGrant(
                "token was issued to another client".into(),
            ));
        }
        let revoked = refresh::revoke_family(&state.db, &record.family_id).await?;
        tracing::info!(
            family_id = %record.family_id,
            client_id = %client.id,
            revoked,
            "Refresh token family revoked"
        );
        return Ok((StatusCode::OK, Json(serde_json::json!({}))).into_response());
    }

    // Not a stored refresh token. If it is one of our access tokens, honor
    // ownership but there is nothing to persist: stateless JWTs expire on
    // their own.
    if let Ok(claims) = state.codec().verify_access_token(&token)
        && claims.client_id != client.id
    {
        return Err(OAuthError::InvalidGrant(
            "token was issued to another client".into(),
        ));
    }

    // Unknown or already-dead tokens succeed uniformly per RFC 7009.
    Ok((StatusCode::OK, Json(serde_json::json!({}))).into_response())
}

/// OpenID Connect UserInfo endpoint.
#[tracing::instrument(skip(state, headers))]
#[utoipa::path(
    method(get, post),
    path = "/userinfo",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect UserInfo",
    summary = "Get the authenticated user's claims",
    description = "Returns claims about the user the presented Bearer access token was issued for.\n\n\
                   **Returned claims depend on granted scopes:**\n\
                   - `openid`: `sub`\n\
                   - `email`: `email`, `email_verified`\n\
                   - `profile`: `name`",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "User claims", body = UserInfoResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::error::ErrorBody),
        (status = 403, description = "Token lacks the `openid` scope", body = crate::error::ErrorBody),
    )
)]
pub async fn userinfo(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
) -> Result<Response, OAuthError> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| OAuthError::InvalidToken("missing Bearer token".into()))?;

    let claims = state.codec().verify_access_token(bearer)?;
    if !claims.has_scope("openid") {
        return Err(OAuthError::InsufficientScope("openid"));
    }

    let user = oauth2_user::Entity::find_by_id(&claims.sub)
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| OAuthError::InvalidToken("unknown subject".into()))?;

    let mut response = UserInfoResponse {
        sub: user.id,
        email: None,
        email_verified: None,
        name: None,
    };
    if claims.has_scope("email") {
        response.email = Some(user.email);
        response.email_verified = Some(user.email_verified);
    }
    if claims.has_scope("profile") {
        response.name = user.name;
    }

    Ok(no_store(Json(response)))
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Extract client credentials from HTTP Basic auth or the form body. Both
/// mechanisms are supported identically; Basic wins when present.
fn extract_client_credentials(
    headers: &HeaderMap,
    body_client_id: &Option<String>,
    body_client_secret: &Option<String>,
) -> (Option<String>, Option<String>) {
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        && let Ok(decoded) =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, auth)
        && let Ok(creds) = String::from_utf8(decoded)
        && let Some((id, secret)) = creds.split_once(':')
    {
        return (Some(id.to_string()), Some(secret.to_string()));
    }

    (body_client_id.clone(), body_client_secret.clone())
}

/// Token and userinfo responses must never be cached by intermediaries.
fn no_store(body: impl IntoResponse) -> Response {
    (
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn basic_auth_wins_over_body_credentials() {
        let mut headers = HeaderMap::new();
        // "web-client:s3cret"
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic d2ViLWNsaWVudDpzM2NyZXQ="),
        );
        let (id, secret) = extract_client_credentials(
            &headers,
            &Some("body-client".into()),
            &Some("body-secret".into()),
        );
        assert_eq!(id.as_deref(), Some("web-client"));
        assert_eq!(secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn body_credentials_used_without_basic_header() {
        let headers = HeaderMap::new();
        let (id, secret) = extract_client_credentials(
            &headers,
            &Some("body-client".into()),
            &Some("body-secret".into()),
        );
        assert_eq!(id.as_deref(), Some("body-client"));
        assert_eq!(secret.as_deref(), Some("body-secret"));
    }

    #[test]
    fn malformed_basic_header_falls_back_to_body() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic not!base64"),
        );
        let (id, _) = extract_client_credentials(&headers, &Some("body-client".into()), &None);
        assert_eq!(id.as_deref(), Some("body-client"));
    }

    #[test]
    fn inactive_introspection_serializes_to_active_false_only() {
        let body = serde_json::to_value(IntrospectResponse::inactive()).expect("serialize");
        assert_eq!(body, serde_json::json!({"active": false}));
    }
}
