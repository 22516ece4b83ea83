//! Refresh token entity.
//!
//! One row per generation. The opaque secret handed to the client is never
//! persisted; rows are keyed by its SHA-256 hash. Rows sharing a `family_id`
//! form one rotation lineage descending from a single authorization grant,
//! and at most one row per family is ever in the `active` state.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Rotation states. `rotated` and `revoked` are terminal.
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_ROTATED: &str = "rotated";
pub const STATUS_REVOKED: &str = "revoked";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "refresh_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// SHA-256 of the opaque token secret, base64url-encoded
    #[sea_orm(unique)]
    pub token_hash: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    /// Shared across all rotations descending from one grant
    pub family_id: String,
    /// 1 for the original grant, +1 per rotation
    pub generation: i32,
    /// `active`, `rotated` or `revoked`
    pub status: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired(&self) -> bool {
        self.expires_at < OffsetDateTime::now_utc()
    }

    /// Usable for rotation or introspection: the current head of its family.
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE && !self.is_expired()
    }

    pub fn scopes_list(&self) -> Vec<String> {
        self.scope.split_whitespace().map(String::from).collect()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes_list().iter().any(|s| s == scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(status: &str, expires_in: i64) -> Model {
        let now = OffsetDateTime::now_utc();
        Model {
            id: "id-1".into(),
            token_hash: "hash".into(),
            client_id: "client".into(),
            user_id: "user".into(),
            scope: "openid profile".into(),
            family_id: "family".into(),
            generation: 1,
            status: status.into(),
            expires_at: now + time::Duration::seconds(expires_in),
            created_at: now,
        }
    }

    #[test]
    fn only_unexpired_active_tokens_are_active() {
        assert!(token(STATUS_ACTIVE, 60).is_active());
        assert!(!token(STATUS_ACTIVE, -60).is_active());
        assert!(!token(STATUS_ROTATED, 60).is_active());
        assert!(!token(STATUS_REVOKED, 60).is_active());
    }

    #[test]
    fn scope_helpers() {
        let t = token(STATUS_ACTIVE, 60);
        assert!(t.has_scope("openid"));
        assert!(!t.has_scope("email"));
        assert_eq!(t.scopes_list().len(), 2);
    }
}
