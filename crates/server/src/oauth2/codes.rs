//! Authorization code store.
//!
//! Codes are opaque 43-character random strings bound to a client, user,
//! redirect URI, scope, nonce and PKCE challenge. Consumption is
//! at-most-once: the final mark-used step is a conditional update on the
//! `used` flag, so two concurrent exchanges of the same code cannot both
//! succeed.

use crate::entity::{authorization_code, oauth2_client};
use crate::error::OAuthError;
use crate::oauth2::{pkce, secrets};
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use time::{Duration, OffsetDateTime};

/// Issue a new authorization code for a completed authorization request.
///
/// The challenge method must be S256 and the requested scope must be within
/// the client's allow-list. The returned model's `code` field is the opaque
/// string handed back to the client via the redirect.
#[allow(clippy::too_many_arguments)]
pub async fn issue(
    db: &DatabaseConnection,
    client: &oauth2_client::Model,
    user_id: &str,
    redirect_uri: &str,
    scope: &str,
    code_challenge: &str,
    code_challenge_method: &str,
    nonce: Option<String>,
    lifetime_seconds: i64,
) -> Result<authorization_code::Model, OAuthError> {
    pkce::ensure_supported_method(code_challenge_method)?;
    if code_challenge.is_empty() {
        return Err(OAuthError::InvalidRequest(
            "code_challenge is required".into(),
        ));
    }
    if !client.is_redirect_uri_allowed(redirect_uri) {
        return Err(OAuthError::InvalidRequest(
            "redirect_uri is not registered for this client".into(),
        ));
    }
    if !client.allows_scopes(scope) {
        return Err(OAuthError::InvalidScope(
            "requested scope exceeds the client's allowed scopes".into(),
        ));
    }

    let now = OffsetDateTime::now_utc();
    let model = authorization_code::ActiveModel {
        code: Set(secrets::generate_token()),
        client_id: Set(client.id.clone()),
        user_id: Set(user_id.to_string()),
        redirect_uri: Set(redirect_uri.to_string()),
        scope: Set(scope.to_string()),
        code_challenge: Set(code_challenge.to_string()),
        nonce: Set(nonce),
        used: Set(false),
        expires_at: Set(now + Duration::seconds(lifetime_seconds)),
        created_at: Set(now),
    };
    Ok(model.insert(db).await?)
}

/// Consume an authorization code: validate every binding, verify PKCE, then
/// atomically mark it used. Every second consumption attempt fails with
/// `invalid_grant`, regardless of concurrency.
pub async fn consume(
    db: &DatabaseConnection,
    code: &str,
    client_id: &str,
    redirect_uri: &str,
    code_verifier: &str,
) -> Result<authorization_code::Model, OAuthError> {
    let auth = authorization_code::Entity::find_by_id(code)
        .one(db)
        .await?
        .ok_or_else(|| OAuthError::InvalidGrant("authorization code is invalid".into()))?;

    if auth.is_expired() {
        // Expired codes are dead either way; drop the row on observation.
        let _ = authorization_code::Entity::delete_by_id(code).exec(db).await;
        return Err(OAuthError::InvalidGrant(
            "authorization code has expired".into(),
        ));
    }
    if auth.used {
        return Err(OAuthError::InvalidGrant(
            "authorization code has already been used".into(),
        ));
    }
    if auth.client_id != client_id {
        return Err(OAuthError::InvalidGrant(
            "authorization code was issued to another client".into(),
        ));
    }
    if auth.redirect_uri != redirect_uri {
        return Err(OAuthError::InvalidGrant("redirect_uri mismatch".into()));
    }
    pkce::verify(code_verifier, &auth.code_challenge)?;

    // Conditional mark-used: of any number of concurrent exchanges, exactly
    // one observes used=false here.
    let result = authorization_code::Entity::update_many()
        .col_expr(authorization_code::Column::Used, Expr::value(true))
        .filter(authorization_code::Column::Code.eq(code))
        .filter(authorization_code::Column::Used.eq(false))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(OAuthError::InvalidGrant(
            "authorization code has already been used".into(),
        ));
    }

    Ok(auth)
}
