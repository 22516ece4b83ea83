//! SeaORM entities for the identity provider tables.

pub mod authorization_code;
pub mod oauth2_client;
pub mod oauth2_user;
pub mod refresh_token;
