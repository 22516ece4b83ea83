//! PKCE verification (RFC 7636).
//!
//! Only the `S256` challenge method is accepted. The `plain` method offers
//! no protection against code interception and is rejected outright.

use crate::error::OAuthError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const METHOD_S256: &str = "S256";

/// RFC 7636 §4.1 bounds on code_verifier length.
const VERIFIER_MIN_LEN: usize = 43;
const VERIFIER_MAX_LEN: usize = 128;

/// Compute the S256 challenge for a verifier: base64url(SHA256(verifier)).
pub fn compute_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Reject any challenge method other than S256.
pub fn ensure_supported_method(method: &str) -> Result<(), OAuthError> {
    if method == METHOD_S256 {
        Ok(())
    } else {
        Err(OAuthError::InvalidRequest(format!(
            "code_challenge_method '{method}' is not supported, use S256"
        )))
    }
}

/// Verify a code_verifier against the stored challenge.
///
/// Out-of-range verifier length is a malformed request; a well-formed
/// verifier that does not hash to the stored challenge is an invalid grant.
pub fn verify(verifier: &str, stored_challenge: &str) -> Result<(), OAuthError> {
    if verifier.len() < VERIFIER_MIN_LEN || verifier.len() > VERIFIER_MAX_LEN {
        return Err(OAuthError::InvalidRequest(
            "code_verifier must be between 43 and 128 characters".into(),
        ));
    }
    let computed = compute_challenge(verifier);
    if computed.as_bytes().ct_eq(stored_challenge.as_bytes()).into() {
        Ok(())
    } else {
        Err(OAuthError::InvalidGrant("PKCE verification failed".into()))
    }
}
