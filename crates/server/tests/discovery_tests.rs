//! Discovery document and JWKS endpoint tests.

use axum::{Router, routing::get};
use axum_test::TestServer;
use campus_idp::config::{AppConfig, OAuth2Config};
use campus_idp::keys::KeyManager;
use campus_idp::oauth2::OAuth2State;
use campus_idp::oauth2::discovery::{jwks, openid_configuration};
use sea_orm::Database;
use std::sync::{Arc, OnceLock};

fn test_keys() -> Arc<KeyManager> {
    static KEYS: OnceLock<Arc<KeyManager>> = OnceLock::new();
    KEYS.get_or_init(|| Arc::new(KeyManager::generate().expect("generate key pair")))
        .clone()
}

async fn create_test_server() -> TestServer {
    let db = Arc::new(
        Database::connect("sqlite::memory:")
            .await
            .expect("connect"),
    );
    let config = AppConfig {
        database_url: "sqlite::memory:".into(),
        issuer_url: "https://id.campus.example".into(),
        signing_key_path: "unused-in-tests.pem".into(),
        oauth2: OAuth2Config::default(),
    };
    let state = OAuth2State::new(db, test_keys(), &config);
    let app: Router = Router::new()
        .route("/.well-known/openid-configuration", get(openid_configuration))
        .route("/.well-known/jwks.json", get(jwks))
        .with_state(state);
    TestServer::new(app).expect("create test server")
}

#[tokio::test]
async fn discovery_document_pins_the_supported_protocol_surface() {
    let server = create_test_server().await;

    let response = server.get("/.well-known/openid-configuration").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    assert_eq!(body["issuer"], "https://id.campus.example");
    assert_eq!(
        body["token_endpoint"],
        "https://id.campus.example/oauth/token"
    );
    assert_eq!(
        body["jwks_uri"],
        "https://id.campus.example/.well-known/jwks.json"
    );
    assert_eq!(
        body["userinfo_endpoint"],
        "https://id.campus.example/oauth/userinfo"
    );

    // Exactly the two supported grants, code flow only, S256 only, RS256 only.
    assert_eq!(
        body["grant_types_supported"],
        serde_json::json!(["authorization_code", "refresh_token"])
    );
    assert_eq!(body["response_types_supported"], serde_json::json!(["code"]));
    assert_eq!(
        body["code_challenge_methods_supported"],
        serde_json::json!(["S256"])
    );
    assert_eq!(
        body["id_token_signing_alg_values_supported"],
        serde_json::json!(["RS256"])
    );

    // Metadata is low-churn and cacheable, unlike token responses.
    let cache_control = response
        .headers()
        .get("cache-control")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cache_control.contains("public"));
}

#[tokio::test]
async fn jwks_exposes_only_public_components() {
    let server = create_test_server().await;

    let response = server.get("/.well-known/jwks.json").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    let keys = body["keys"].as_array().expect("keys array");
    assert_eq!(keys.len(), 1);
    let jwk = &keys[0];

    assert_eq!(jwk["kty"], "RSA");
    assert_eq!(jwk["use"], "sig");
    assert_eq!(jwk["alg"], "RS256");
    assert!(jwk["n"].is_string());
    assert!(jwk["e"].is_string());

    // Private key material must never leak through the JWKS.
    for private_field in ["d", "p", "q", "dp", "dq", "qi"] {
        assert!(jwk.get(private_field).is_none(), "leaked {private_field}");
    }

    let cache_control = response
        .headers()
        .get("cache-control")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cache_control.contains("public"));
}

#[tokio::test]
async fn kid_is_stable_across_repeated_calls() {
    let server = create_test_server().await;

    let first: serde_json::Value = server.get("/.well-known/jwks.json").await.json();
    let second: serde_json::Value = server.get("/.well-known/jwks.json").await.json();

    let kid1 = first["keys"][0]["kid"].as_str().expect("kid");
    let kid2 = second["keys"][0]["kid"].as_str().expect("kid");
    assert_eq!(kid1, kid2);
    assert!(!kid1.is_empty());
}
