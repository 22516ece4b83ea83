//! Refresh token store and rotation engine.
//!
//! Tokens move through three states: `active` (the current head of a
//! family), `rotated` (superseded by a child) and `revoked`. Rotation marks
//! the presented token `rotated` via a conditional update and inserts the
//! next generation, so two concurrent rotations of the same token yield
//! exactly one success. Presenting a token that is already `rotated` is
//! treated as theft: the whole family is revoked before the caller sees
//! `invalid_grant`, unconditionally.

use crate::entity::refresh_token::{self, STATUS_ACTIVE, STATUS_REVOKED, STATUS_ROTATED};
use crate::error::OAuthError;
use crate::oauth2::secrets;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use time::{Duration, OffsetDateTime};

/// A freshly minted refresh token. `token` is the opaque secret shown to the
/// client exactly once; only its digest is persisted.
pub struct IssuedRefreshToken {
    pub token: String,
    pub record: refresh_token::Model,
}

/// Issue the first refresh token of a new family (generation 1).
pub async fn issue(
    db: &DatabaseConnection,
    client_id: &str,
    user_id: &str,
    scope: &str,
    lifetime_seconds: i64,
) -> Result<IssuedRefreshToken, OAuthError> {
    insert_generation(
        db,
        client_id,
        user_id,
        scope,
        &uuid::Uuid::new_v4().to_string(),
        1,
        lifetime_seconds,
    )
    .await
}

async fn insert_generation(
    db: &DatabaseConnection,
    client_id: &str,
    user_id: &str,
    scope: &str,
    family_id: &str,
    generation: i32,
    lifetime_seconds: i64,
) -> Result<IssuedRefreshToken, OAuthError> {
    let token = secrets::generate_token();
    let now = OffsetDateTime::now_utc();
    let model = refresh_token::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        token_hash: Set(secrets::token_digest(&token)),
        client_id: Set(client_id.to_string()),
        user_id: Set(user_id.to_string()),
        scope: Set(scope.to_string()),
        family_id: Set(family_id.to_string()),
        generation: Set(generation),
        status: Set(STATUS_ACTIVE.to_string()),
        expires_at: Set(now + Duration::seconds(lifetime_seconds)),
        created_at: Set(now),
    };
    let record = model.insert(db).await?;
    Ok(IssuedRefreshToken { token, record })
}

/// Rotate a presented refresh token: supersede it and mint the next
/// generation of its family.
///
/// The requested scope, when given, must be a subset of the stored scope;
/// scope never widens across rotations. A presented token that has already
/// been rotated revokes its entire family.
pub async fn rotate(
    db: &DatabaseConnection,
    presented: &str,
    client_id: &str,
    requested_scope: Option<&str>,
    lifetime_seconds: i64,
) -> Result<IssuedRefreshToken, OAuthError> {
    let digest = secrets::token_digest(presented);
    let current = refresh_token::Entity::find()
        .filter(refresh_token::Column::TokenHash.eq(&digest))
        .one(db)
        .await?
        .ok_or_else(|| OAuthError::InvalidGrant("refresh token is invalid".into()))?;

    if current.status == STATUS_REVOKED || current.is_expired() {
        return Err(OAuthError::InvalidGrant("refresh token is invalid".into()));
    }
    if current.status == STATUS_ROTATED {
        // A superseded token came back: someone is replaying an old secret.
        // Kill the whole lineage before answering.
        tracing::warn!(
            family_id = %current.family_id,
            client_id = %current.client_id,
            generation = current.generation,
            "Refresh token reuse detected, revoking token family"
        );
        revoke_family(db, &current.family_id).await?;
        return Err(OAuthError::InvalidGrant("refresh token is invalid".into()));
    }
    if current.client_id != client_id {
        return Err(OAuthError::InvalidGrant(
            "refresh token was issued to another client".into(),
        ));
    }

    let scope = match requested_scope {
        Some(requested) if !requested.is_empty() => {
            let granted = current.scopes_list();
            let narrower = requested
                .split_whitespace()
                .all(|s| granted.iter().any(|g| g == s));
            if !narrower {
                return Err(OAuthError::InvalidScope(
                    "requested scope exceeds the originally granted scope".into(),
                ));
            }
            requested.to_string()
        }
        _ => current.scope.clone(),
    };

    // Conditional supersede: of two concurrent rotations, exactly one flips
    // active -> rotated. The loser gets invalid_grant.
    let result = refresh_token::Entity::update_many()
        .col_expr(refresh_token::Column::Status, Expr::value(STATUS_ROTATED))
        .filter(refresh_token::Column::TokenHash.eq(&digest))
        .filter(refresh_token::Column::Status.eq(STATUS_ACTIVE))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(OAuthError::InvalidGrant("refresh token is invalid".into()));
    }

    insert_generation(
        db,
        &current.client_id,
        &current.user_id,
        &scope,
        &current.family_id,
        current.generation + 1,
        lifetime_seconds,
    )
    .await
}

/// Revoke every member of a family. Idempotent: the `revoked` status is a
/// monotonic flag and re-revocation succeeds silently.
pub async fn revoke_family(db: &DatabaseConnection, family_id: &str) -> Result<u64, OAuthError> {
    let result = refresh_token::Entity::update_many()
        .col_expr(refresh_token::Column::Status, Expr::value(STATUS_REVOKED))
        .filter(refresh_token::Column::FamilyId.eq(family_id))
        .filter(refresh_token::Column::Status.ne(STATUS_REVOKED))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Look up a presented token for the revocation endpoint.
///
/// Returns the stored record regardless of state so the caller can enforce
/// client ownership; unknown tokens come back as `None`.
pub async fn find_by_secret(
    db: &DatabaseConnection,
    presented: &str,
) -> Result<Option<refresh_token::Model>, OAuthError> {
    let digest = secrets::token_digest(presented);
    Ok(refresh_token::Entity::find()
        .filter(refresh_token::Column::TokenHash.eq(digest))
        .one(db)
        .await?)
}

/// Look up a presented token for introspection. Not-found, expired, rotated
/// and revoked are all collapsed to `None`; nothing distinguishes them.
pub async fn find_active(
    db: &DatabaseConnection,
    presented: &str,
) -> Result<Option<refresh_token::Model>, OAuthError> {
    Ok(find_by_secret(db, presented)
        .await?
        .filter(refresh_token::Model::is_active))
}

/// Find the generation-1 record of a family, used to recover the original
/// authentication time when re-minting ID tokens on refresh.
pub async fn family_root(
    db: &DatabaseConnection,
    family_id: &str,
) -> Result<Option<refresh_token::Model>, OAuthError> {
    Ok(refresh_token::Entity::find()
        .filter(refresh_token::Column::FamilyId.eq(family_id))
        .filter(refresh_token::Column::Generation.eq(1))
        .one(db)
        .await?)
}
