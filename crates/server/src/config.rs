use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct OAuth2Config {
    /// Access token lifetime in seconds.
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    /// Refresh token lifetime in seconds.
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
    /// Authorization code lifetime in seconds. Values outside 60-600s are
    /// rejected at load.
    #[serde(default = "default_authorization_code_lifetime")]
    pub authorization_code_lifetime: i64,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            access_token_lifetime: default_access_token_lifetime(),
            refresh_token_lifetime: default_refresh_token_lifetime(),
            authorization_code_lifetime: default_authorization_code_lifetime(),
        }
    }
}

fn default_access_token_lifetime() -> i64 {
    3600 // 1 hour
}

fn default_refresh_token_lifetime() -> i64 {
    86400 * 30 // 30 days
}

fn default_authorization_code_lifetime() -> i64 {
    120
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Issuer URL embedded in the `iss` claim and discovery metadata.
    pub issuer_url: String,
    /// Path to the RSA private key PEM used for token signing.
    pub signing_key_path: String,
    #[serde(default)]
    pub oauth2: OAuth2Config,
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Environment variable override convention: any var matching the key path
/// separated by double underscores (e.g. `OAUTH2__ACCESS_TOKEN_LIFETIME`)
/// overrides the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    validate(&app)?;
    Ok(app)
}

fn validate(app: &AppConfig) -> Result<(), ConfigError> {
    if app.issuer_url.is_empty() {
        return Err(ConfigError::Validation("issuer_url must be set".into()));
    }
    if app.issuer_url.ends_with('/') {
        return Err(ConfigError::Validation(
            "issuer_url must not carry a trailing slash".into(),
        ));
    }
    if app.signing_key_path.is_empty() {
        return Err(ConfigError::Validation(
            "signing_key_path must be set".into(),
        ));
    }
    if app.oauth2.access_token_lifetime <= 0 {
        return Err(ConfigError::Validation(
            "oauth2.access_token_lifetime must be > 0".into(),
        ));
    }
    if app.oauth2.refresh_token_lifetime <= app.oauth2.access_token_lifetime {
        return Err(ConfigError::Validation(
            "oauth2.refresh_token_lifetime must exceed the access token lifetime".into(),
        ));
    }
    if !(60..=600).contains(&app.oauth2.authorization_code_lifetime) {
        return Err(ConfigError::Validation(
            "oauth2.authorization_code_lifetime must be between 60 and 600 seconds".into(),
        ));
    }
    Ok(())
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            issuer_url: "https://id.campus.example".into(),
            signing_key_path: "signing_key.pem".into(),
            oauth2: OAuth2Config::default(),
        }
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn rejects_trailing_slash_issuer() {
        let mut cfg = base_config();
        cfg.issuer_url = "https://id.campus.example/".into();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_out_of_range_code_lifetime() {
        let mut cfg = base_config();
        cfg.oauth2.authorization_code_lifetime = 30;
        assert!(validate(&cfg).is_err());
        cfg.oauth2.authorization_code_lifetime = 900;
        assert!(validate(&cfg).is_err());
        cfg.oauth2.authorization_code_lifetime = 600;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn rejects_refresh_lifetime_below_access_lifetime() {
        let mut cfg = base_config();
        cfg.oauth2.refresh_token_lifetime = cfg.oauth2.access_token_lifetime;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_missing_signing_key_path() {
        let mut cfg = base_config();
        cfg.signing_key_path = String::new();
        assert!(validate(&cfg).is_err());
    }
}
