//! Signing key management.
//!
//! Loads the RSA key pair used to sign access and ID tokens, and derives the
//! public JWK published at the JWKS endpoint. The key is loaded once at
//! startup and shared read-only across all requests. Only RS256 is ever
//! accepted for verification, so `alg: none` and algorithm-confusion tokens
//! are rejected by construction.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Failed to read signing key at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid RSA key material: {0}")]
    InvalidKey(String),
    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Public JSON Web Key. Never carries private components.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    pub kid: String,
    /// RSA public modulus, base64url-encoded big-endian
    pub n: String,
    /// RSA public exponent, base64url-encoded big-endian
    pub e: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Holds the signing key pair for the lifetime of the process.
pub struct KeyManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    kid: String,
    jwk: Jwk,
}

impl KeyManager {
    /// Load the signing key from a PEM file. Fails fast so a misconfigured
    /// deployment never starts serving unsigned-able endpoints.
    pub fn from_pem_file(path: &str) -> Result<Self, KeyError> {
        let pem = std::fs::read_to_string(path).map_err(|source| KeyError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_pem(&pem)
    }

    /// Build a key manager from RSA private key PEM (PKCS#1 or PKCS#8).
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;

        let public_key = private_key.to_public_key();
        let n_bytes = public_key.n().to_bytes_be();
        let e_bytes = public_key.e().to_bytes_be();
        let n = URL_SAFE_NO_PAD.encode(&n_bytes);
        let e = URL_SAFE_NO_PAD.encode(&e_bytes);
        let kid = derive_key_id(&n_bytes);

        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let decoding = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;

        let jwk = Jwk {
            kty: "RSA".to_string(),
            key_use: "sig".to_string(),
            alg: "RS256".to_string(),
            kid: kid.clone(),
            n,
            e,
        };

        Ok(Self {
            encoding,
            decoding,
            kid,
            jwk,
        })
    }

    /// Generate an ephemeral 2048-bit key pair. Used by tests and local
    /// development tooling; production deployments load a provisioned key.
    pub fn generate() -> Result<Self, KeyError> {
        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        Self::from_pem(&pem)
    }

    /// Stable key identifier, derived from the public modulus.
    pub fn key_id(&self) -> &str {
        &self.kid
    }

    /// The public JWK set served at the JWKS endpoint.
    pub fn jwk_set(&self) -> JwkSet {
        JwkSet {
            keys: vec![self.jwk.clone()],
        }
    }

    /// Sign a claim set as a compact RS256 JWS.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, KeyError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        Ok(jsonwebtoken::encode(&header, claims, &self.encoding)?)
    }

    /// Verify a compact JWS and decode its claims.
    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        validation: &Validation,
    ) -> Result<T, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<T>(token, &self.decoding, validation).map(|data| data.claims)
    }

    /// Baseline validation: the single accepted algorithm, expiry enforced.
    pub fn validation(&self) -> Validation {
        Validation::new(Algorithm::RS256)
    }
}

fn derive_key_id(modulus: &[u8]) -> String {
    let digest = Sha256::digest(modulus);
    let encoded = URL_SAFE_NO_PAD.encode(digest);
    encoded[..16].to_string()
}
