//! Migration to add the identity provider tables.
//!
//! Creates tables for:
//! - oauth2_client: Registered OAuth2 clients
//! - oauth2_user: User accounts consumed by the token claims
//! - authorization_code: Single-use authorization codes (temporary)
//! - refresh_token: Per-generation refresh token records

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. OAuth2 Clients table
        manager
            .create_table(
                Table::create()
                    .table(OAuth2Client::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Client::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuth2Client::SecretHash).string().null())
                    .col(ColumnDef::new(OAuth2Client::Name).string().not_null())
                    .col(
                        ColumnDef::new(OAuth2Client::RedirectUris)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::Scopes)
                            .text()
                            .not_null()
                            .default("openid profile email"),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::ApplicationType)
                            .string()
                            .not_null()
                            .default("web"),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::IsPublic)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 2. OAuth2 Users table
        manager
            .create_table(
                Table::create()
                    .table(OAuth2User::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2User::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2User::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2User::EmailVerified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(OAuth2User::Name).string().null())
                    .col(
                        ColumnDef::new(OAuth2User::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2User::LastLoginAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 3. Authorization codes table
        manager
            .create_table(
                Table::create()
                    .table(AuthorizationCode::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthorizationCode::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AuthorizationCode::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AuthorizationCode::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AuthorizationCode::RedirectUri)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AuthorizationCode::Scope).text().not_null())
                    .col(
                        ColumnDef::new(AuthorizationCode::CodeChallenge)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AuthorizationCode::Nonce).string().null())
                    .col(
                        ColumnDef::new(AuthorizationCode::Used)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AuthorizationCode::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AuthorizationCode::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 4. Refresh tokens table
        manager
            .create_table(
                Table::create()
                    .table(RefreshToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RefreshToken::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RefreshToken::TokenHash)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(RefreshToken::ClientId).string().not_null())
                    .col(ColumnDef::new(RefreshToken::UserId).string().not_null())
                    .col(ColumnDef::new(RefreshToken::Scope).text().not_null())
                    .col(ColumnDef::new(RefreshToken::FamilyId).string().not_null())
                    .col(
                        ColumnDef::new(RefreshToken::Generation)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RefreshToken::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(RefreshToken::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RefreshToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Family revocation scans by family_id; reuse detection looks up the
        // hash index created by the unique constraint.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_refresh_token_family_id")
                    .table(RefreshToken::Table)
                    .col(RefreshToken::FamilyId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RefreshToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuthorizationCode::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2User::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Client::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum OAuth2Client {
    Table,
    Id,
    SecretHash,
    Name,
    RedirectUris,
    Scopes,
    ApplicationType,
    IsPublic,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OAuth2User {
    Table,
    Id,
    Email,
    EmailVerified,
    Name,
    CreatedAt,
    LastLoginAt,
}

#[derive(DeriveIden)]
enum AuthorizationCode {
    Table,
    Code,
    ClientId,
    UserId,
    RedirectUri,
    Scope,
    CodeChallenge,
    Nonce,
    Used,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum RefreshToken {
    Table,
    Id,
    TokenHash,
    ClientId,
    UserId,
    Scope,
    FamilyId,
    Generation,
    Status,
    ExpiresAt,
    CreatedAt,
}
