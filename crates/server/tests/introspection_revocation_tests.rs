//! Introspection (RFC 7662) and revocation (RFC 7009) endpoint tests.
//!
//! Pins two deliberate behaviors: inactive tokens are uniformly
//! indistinguishable in introspection responses, and revoking a token owned
//! by a different client returns 400 `invalid_grant` instead of the RFC
//! 7009 always-200 - a hardening choice to block cross-client token
//! probing.

use axum::{
    Router,
    routing::{get, post},
};
use axum_test::TestServer;
use campus_idp::config::{AppConfig, OAuth2Config};
use campus_idp::entity::oauth2_client;
use campus_idp::keys::KeyManager;
use campus_idp::oauth2::endpoints::{introspect, revoke, token, userinfo};
use campus_idp::oauth2::tokens::TokenCodec;
use campus_idp::oauth2::{OAuth2State, codes, pkce, refresh, secrets};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use std::sync::{Arc, OnceLock};
use time::OffsetDateTime;

const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

fn test_keys() -> Arc<KeyManager> {
    static KEYS: OnceLock<Arc<KeyManager>> = OnceLock::new();
    KEYS.get_or_init(|| Arc::new(KeyManager::generate().expect("generate key pair")))
        .clone()
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        issuer_url: "https://id.campus.example".into(),
        signing_key_path: "unused-in-tests.pem".into(),
        oauth2: OAuth2Config::default(),
    }
}

async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.expect("connect");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE oauth2_client (
            id TEXT PRIMARY KEY,
            secret_hash TEXT NULL,
            name TEXT NOT NULL,
            redirect_uris TEXT NOT NULL,
            scopes TEXT NOT NULL DEFAULT 'openid profile email',
            application_type TEXT NOT NULL DEFAULT 'web',
            is_public INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create oauth2_client table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE oauth2_user (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            email_verified INTEGER NOT NULL DEFAULT 0,
            name TEXT NULL,
            created_at TEXT NOT NULL,
            last_login_at TEXT NULL
        );"#,
    ))
    .await
    .expect("create oauth2_user table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE authorization_code (
            code TEXT PRIMARY KEY,
            client_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            redirect_uri TEXT NOT NULL,
            scope TEXT NOT NULL,
            code_challenge TEXT NOT NULL,
            nonce TEXT NULL,
            used INTEGER NOT NULL DEFAULT 0,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create authorization_code table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE refresh_token (
            id TEXT PRIMARY KEY,
            token_hash TEXT NOT NULL UNIQUE,
            client_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            scope TEXT NOT NULL,
            family_id TEXT NOT NULL,
            generation INTEGER NOT NULL,
            status TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create refresh_token table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"INSERT INTO oauth2_client (id, secret_hash, name, redirect_uris, scopes, application_type, is_public, created_at, updated_at)
           VALUES ('spa-client', NULL, 'Campus SPA', '["https://app.campus.example/callback"]', 'openid profile email', 'spa', 1, datetime('now'), datetime('now'));"#,
    ))
    .await
    .expect("insert spa client");

    let secret_hash = secrets::hash_secret("s3cret").expect("hash secret");
    db.execute(Statement::from_sql_and_values(
        DbBackend::Sqlite,
        r#"INSERT INTO oauth2_client (id, secret_hash, name, redirect_uris, scopes, application_type, is_public, created_at, updated_at)
           VALUES ('web-client', ?, 'Campus Portal', '["https://portal.campus.example/callback"]', 'openid profile email', 'web', 0, datetime('now'), datetime('now'));"#,
        [secret_hash.into()],
    ))
    .await
    .expect("insert web client");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"INSERT INTO oauth2_user (id, email, email_verified, name, created_at)
           VALUES ('user-123', 'student@campus.example', 1, 'Test Student', datetime('now'));"#,
    ))
    .await
    .expect("insert test user");

    db
}

async fn create_test_state() -> (OAuth2State, TestServer) {
    let db = Arc::new(create_test_db().await);
    let state = OAuth2State::new(db, test_keys(), &test_config());
    let app: Router = Router::new()
        .route("/oauth/token", post(token))
        .route("/oauth/introspect", post(introspect))
        .route("/oauth/revoke", post(revoke))
        .route("/oauth/userinfo", get(userinfo).post(userinfo))
        .with_state(state.clone());
    let server = TestServer::new(app).expect("create test server");
    (state, server)
}

/// Run a full code exchange for the SPA client; returns (access, refresh).
async fn obtain_tokens(state: &OAuth2State, server: &TestServer) -> (String, String) {
    let now = OffsetDateTime::now_utc();
    let client = oauth2_client::Model {
        id: "spa-client".into(),
        secret_hash: None,
        name: "Campus SPA".into(),
        redirect_uris: r#"["https://app.campus.example/callback"]"#.into(),
        scopes: "openid profile email".into(),
        application_type: "spa".into(),
        is_public: true,
        created_at: now,
        updated_at: now,
    };
    let code = codes::issue(
        &state.db,
        &client,
        "user-123",
        "https://app.campus.example/callback",
        "openid profile email",
        &pkce::compute_challenge(VERIFIER),
        "S256",
        None,
        120,
    )
    .await
    .expect("issue code")
    .code;

    let response = server
        .post("/oauth/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", "https://app.campus.example/callback"),
            ("code_verifier", VERIFIER),
            ("client_id", "spa-client"),
        ])
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}

async fn introspect_token(
    server: &TestServer,
    token_value: &str,
    hint: Option<&str>,
) -> serde_json::Value {
    let mut form = vec![("token", token_value), ("client_id", "spa-client")];
    if let Some(hint) = hint {
        form.push(("token_type_hint", hint));
    }
    let response = server.post("/oauth/introspect").form(&form).await;
    response.assert_status_ok();
    response.json()
}

async fn revoke_token(server: &TestServer, token_value: &str) -> axum_test::TestResponse {
    server
        .post("/oauth/revoke")
        .form(&[("token", token_value), ("client_id", "spa-client")])
        .await
}

// =============================================================================
// Introspection
// =============================================================================

#[tokio::test]
async fn introspect_active_access_token() {
    let (state, server) = create_test_state().await;
    let (access, _) = obtain_tokens(&state, &server).await;

    let body = introspect_token(&server, &access, None).await;
    assert_eq!(body["active"], true);
    assert_eq!(body["client_id"], "spa-client");
    assert_eq!(body["sub"], "user-123");
    assert_eq!(body["scope"], "openid profile email");
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["iss"], "https://id.campus.example");
    assert!(body["exp"].is_i64());
}

#[tokio::test]
async fn introspect_active_refresh_token_with_hint() {
    let (state, server) = create_test_state().await;
    let (_, refresh_token) = obtain_tokens(&state, &server).await;

    let body = introspect_token(&server, &refresh_token, Some("refresh_token")).await;
    assert_eq!(body["active"], true);
    assert_eq!(body["token_type"], "refresh_token");
    assert_eq!(body["sub"], "user-123");

    // The hint only orders the lookup; a refresh token is still found
    // without it.
    let body = introspect_token(&server, &refresh_token, None).await;
    assert_eq!(body["active"], true);
}

#[tokio::test]
async fn inactive_tokens_are_indistinguishable() {
    let (state, server) = create_test_state().await;

    // Expired access token, valid signature.
    let keys = test_keys();
    let expired_codec = TokenCodec::new(&keys, "https://id.campus.example", -120);
    let expired_access = expired_codec
        .issue_access_token("user-123", "spa-client", "openid")
        .expect("issue expired token");

    // Revoked refresh token.
    let issued = refresh::issue(&state.db, "spa-client", "user-123", "openid", 3600)
        .await
        .expect("issue refresh token");
    refresh::revoke_family(&state.db, &issued.record.family_id)
        .await
        .expect("revoke family");

    let expired_body = introspect_token(&server, &expired_access, None).await;
    let revoked_body = introspect_token(&server, &issued.token, Some("refresh_token")).await;
    let garbage_body = introspect_token(&server, "complete-garbage", None).await;

    let inactive = serde_json::json!({"active": false});
    assert_eq!(expired_body, inactive);
    assert_eq!(revoked_body, inactive);
    assert_eq!(garbage_body, inactive);
}

#[tokio::test]
async fn introspection_requires_client_authentication() {
    let (_state, server) = create_test_state().await;

    let response = server
        .post("/oauth/introspect")
        .form(&[
            ("token", "anything"),
            ("client_id", "web-client"),
            ("client_secret", "wrong"),
        ])
        .await;
    response.assert_status_unauthorized();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_client");
}

#[tokio::test]
async fn introspection_without_token_is_malformed() {
    let (_state, server) = create_test_state().await;

    let response = server
        .post("/oauth/introspect")
        .form(&[("client_id", "spa-client")])
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

// =============================================================================
// Revocation
// =============================================================================

#[tokio::test]
async fn revoking_a_refresh_token_kills_its_family() {
    let (state, server) = create_test_state().await;
    let (_, refresh_token) = obtain_tokens(&state, &server).await;

    let response = revoke_token(&server, &refresh_token).await;
    response.assert_status_ok();

    // Introspection turns inactive and the refresh grant fails.
    let body = introspect_token(&server, &refresh_token, Some("refresh_token")).await;
    assert_eq!(body, serde_json::json!({"active": false}));

    let grant = server
        .post("/oauth/token")
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", "spa-client"),
        ])
        .await;
    grant.assert_status_bad_request();
}

#[tokio::test]
async fn revocation_is_idempotent_and_hides_unknown_tokens() {
    let (state, server) = create_test_state().await;
    let (_, refresh_token) = obtain_tokens(&state, &server).await;

    let first = revoke_token(&server, &refresh_token).await;
    first.assert_status_ok();
    let second = revoke_token(&server, &refresh_token).await;
    second.assert_status_ok();
    let unknown = revoke_token(&server, "never-issued-token").await;
    unknown.assert_status_ok();

    // Same status, same body: nothing distinguishes "was revoked just now"
    // from "was already revoked" from "never existed".
    let a: serde_json::Value = first.json();
    let b: serde_json::Value = second.json();
    let c: serde_json::Value = unknown.json();
    assert_eq!(a, b);
    assert_eq!(b, c);
}

#[tokio::test]
async fn cross_client_revocation_is_rejected() {
    // Deliberate deviation from RFC 7009's always-200: a client revoking a
    // token it does not own gets 400 invalid_grant, so tokens cannot be
    // probed (or destroyed) across client boundaries.
    let (state, server) = create_test_state().await;
    let (_, refresh_token) = obtain_tokens(&state, &server).await;

    let response = server
        .post("/oauth/revoke")
        .form(&[
            ("token", refresh_token.as_str()),
            ("client_id", "web-client"),
            ("client_secret", "s3cret"),
        ])
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_grant");

    // The family is untouched; the owner can still rotate.
    let grant = server
        .post("/oauth/token")
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", "spa-client"),
        ])
        .await;
    grant.assert_status_ok();
}

#[tokio::test]
async fn revoking_an_access_token_succeeds_without_stored_effect() {
    let (state, server) = create_test_state().await;
    let (access, _) = obtain_tokens(&state, &server).await;

    let response = revoke_token(&server, &access).await;
    response.assert_status_ok();

    // Stateless JWTs cannot be individually withdrawn; the token stays
    // valid until it expires.
    let body = introspect_token(&server, &access, None).await;
    assert_eq!(body["active"], true);
}

#[tokio::test]
async fn cross_client_access_token_revocation_is_rejected() {
    let (state, server) = create_test_state().await;
    let (access, _) = obtain_tokens(&state, &server).await;

    let response = server
        .post("/oauth/revoke")
        .form(&[
            ("token", access.as_str()),
            ("client_id", "web-client"),
            ("client_secret", "s3cret"),
        ])
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn revocation_requires_token_param_and_client_auth() {
    let (_state, server) = create_test_state().await;

    let missing_token = server
        .post("/oauth/revoke")
        .form(&[("client_id", "spa-client")])
        .await;
    missing_token.assert_status_bad_request();
    let body: serde_json::Value = missing_token.json();
    assert_eq!(body["error"], "invalid_request");

    let bad_client = server
        .post("/oauth/revoke")
        .form(&[
            ("token", "anything"),
            ("client_id", "web-client"),
            ("client_secret", "wrong"),
        ])
        .await;
    bad_client.assert_status_unauthorized();
}
