//! API module wiring the HTTP surface together.
//!
//! - `/oauth/*` - token, introspection, revocation, userinfo
//! - `/.well-known/*` - discovery metadata and JWKS
//! - `/healthz` - health check
//! - `/api-docs` - OpenAPI documentation

pub mod health;
pub mod openapi;

use crate::AppResources;
use crate::oauth2::{self, OAuth2State};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(resources))]
pub async fn start_webserver(resources: AppResources) -> color_eyre::Result<()> {
    let oauth2_state = OAuth2State::new(
        resources.db.clone(),
        resources.keys.clone(),
        &resources.config,
    );

    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/oauth", oauth2::endpoints::router(oauth2_state.clone()))
        .merge(oauth2::discovery::router(oauth2_state))
        .routes(routes!(health::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    let router = router.merge(Redoc::with_url("/api-docs", api));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!(addr = "0.0.0.0:8080", "Identity provider listening");
    axum::serve(listener, router)
        .await
        .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
