//! Client registry: authentication and redirect URI validation.

use crate::entity::oauth2_client;
use crate::error::OAuthError;
use crate::oauth2::secrets;
use sea_orm::{DatabaseConnection, EntityTrait};

/// Authenticate a client by id and optional secret.
///
/// Public clients pass without a secret. Confidential clients must present
/// the secret matching their stored Argon2 hash. Every failure mode returns
/// the same undifferentiated `invalid_client` so callers cannot probe which
/// client ids exist.
pub async fn authenticate(
    db: &DatabaseConnection,
    client_id: &str,
    client_secret: Option<&str>,
) -> Result<oauth2_client::Model, OAuthError> {
    let client = oauth2_client::Entity::find_by_id(client_id)
        .one(db)
        .await?
        .ok_or(OAuthError::InvalidClient)?;

    if client.is_public {
        return Ok(client);
    }

    match (&client.secret_hash, client_secret) {
        (Some(hash), Some(secret)) if secrets::verify_secret(secret, hash) => Ok(client),
        _ => Err(OAuthError::InvalidClient),
    }
}
