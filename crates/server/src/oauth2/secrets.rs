//! Secret hashing and opaque token generation.
//!
//! Client secrets are stored as Argon2id PHC hashes; verification is
//! constant-time by construction. Opaque tokens (authorization codes,
//! refresh token secrets) are 32 random bytes, URL-safe base64. Refresh
//! token secrets are persisted only as their SHA-256 digest.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Hash a client secret using Argon2id.
///
/// Returns the PHC-formatted hash string suitable for storage.
pub fn hash_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a client secret against a stored hash.
///
/// Returns true if the secret matches.
pub fn verify_secret(secret: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a secure random opaque token.
///
/// Returns a URL-safe base64-encoded string (43 characters).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).expect("Failed to generate random bytes");
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 digest of an opaque token, base64url-encoded.
///
/// This is the lookup key refresh tokens are persisted under.
pub fn token_digest(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_secret() {
        let secret = "client-secret-123!";
        let hash = hash_secret(secret).expect("Failed to hash secret");

        assert!(hash.starts_with("$argon2"));
        assert!(verify_secret(secret, &hash));
        assert!(!verify_secret("wrong-secret", &hash));
    }

    #[test]
    fn hash_produces_different_salts() {
        let secret = "same-secret";
        let hash1 = hash_secret(secret).expect("Failed to hash");
        let hash2 = hash_secret(secret).expect("Failed to hash");

        assert_ne!(hash1, hash2);
        assert!(verify_secret(secret, &hash1));
        assert!(verify_secret(secret, &hash2));
    }

    #[test]
    fn verify_invalid_hash_format() {
        assert!(!verify_secret("secret", "not-a-valid-hash"));
        assert!(!verify_secret("secret", ""));
        assert!(!verify_secret("secret", "$invalid$hash$format"));
    }

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let token1 = generate_token();
        let token2 = generate_token();

        assert_ne!(token1, token2);
        assert!(!token1.contains('+'));
        assert!(!token1.contains('/'));
        assert!(!token1.contains('='));
        assert_eq!(token1.len(), 43);
    }

    #[test]
    fn token_digest_is_deterministic() {
        let token = generate_token();
        assert_eq!(token_digest(&token), token_digest(&token));
        assert_ne!(token_digest(&token), token_digest("other"));
    }
}
