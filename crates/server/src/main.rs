use campus_idp::AppResources;
use campus_idp::api::start_webserver;
use campus_idp::config::load_config_or_panic;
use campus_idp::keys::KeyManager;
use sea_orm::{ConnectOptions, Database};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "campus_idp=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install().expect("Failed to install `color_eyre::install`");
    dotenvy::dotenv().ok();

    initialize_tracing();

    // Load config
    let config = Arc::new(load_config_or_panic());

    // Load the signing key pair. A deployment without key material must not
    // come up at all.
    let keys = Arc::new(
        KeyManager::from_pem_file(&config.signing_key_path)
            .expect("Failed to load signing key pair"),
    );
    tracing::info!(kid = keys.key_id(), "Signing key loaded");

    // Set up SeaORM database connection with bounded timeouts so store
    // outages surface as errors rather than hung requests.
    let mut options = ConnectOptions::new(&config.database_url);
    options
        .connect_timeout(Duration::from_secs(5))
        .acquire_timeout(Duration::from_secs(5));
    let db = Arc::new(
        Database::connect(options)
            .await
            .expect("Failed to connect to database"),
    );

    let resources = AppResources { db, config, keys };
    start_webserver(resources).await?;
    Ok(())
}
