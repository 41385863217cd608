//! PKCE (RFC 7636) code verifier and S256 challenge.
//!
//! A `Pkce` pair belongs to exactly one sign-in attempt. It is deliberately not
//! `Clone`: the verifier is moved into the token exchange and cannot be reused.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Unreserved URI characters allowed in a verifier.
pub const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Length of generated verifiers.
pub const VERIFIER_LEN: usize = 128;

const MIN_VERIFIER_LEN: usize = 43;

/// SHA-256 primitive used to derive the challenge.
pub trait Sha256Digest {
    fn sha256(&self, bytes: &[u8]) -> [u8; 32];
}

/// `sha2`-backed digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha2;

impl Sha256Digest for Sha2 {
    fn sha256(&self, bytes: &[u8]) -> [u8; 32] {
        Sha256::digest(bytes).into()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PkceError {
    #[error("code verifier must be 43-128 characters, got {0}")]
    InvalidLength(usize),
    #[error("code verifier contains a reserved character: {0:?}")]
    InvalidCharacter(char),
}

/// PKCE code verifier and challenge
pub struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    /// Generates a fresh pair from the thread-local CSPRNG.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::rng(), &Sha2)
    }

    /// Generates a fresh pair using the given RNG and digest.
    pub fn generate_with<R: Rng>(rng: &mut R, digest: &dyn Sha256Digest) -> Self {
        let verifier: String = (0..VERIFIER_LEN)
            .map(|_| char::from(VERIFIER_CHARSET[rng.random_range(0..VERIFIER_CHARSET.len())]))
            .collect();
        let challenge = challenge_for(&verifier, digest);
        Self {
            verifier,
            challenge,
        }
    }

    /// Builds a pair around an existing verifier.
    ///
    /// # Errors
    /// Returns an error if the verifier violates RFC 7636 length or charset rules.
    pub fn from_verifier(verifier: &str, digest: &dyn Sha256Digest) -> Result<Self, PkceError> {
        let len = verifier.chars().count();
        if !(MIN_VERIFIER_LEN..=VERIFIER_LEN).contains(&len) {
            return Err(PkceError::InvalidLength(len));
        }
        if let Some(bad) = verifier.chars().find(|c| !is_unreserved(*c)) {
            return Err(PkceError::InvalidCharacter(bad));
        }
        Ok(Self {
            verifier: verifier.to_string(),
            challenge: challenge_for(verifier, digest),
        })
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Consumes the pair, yielding the verifier for the token exchange.
    pub fn into_verifier(self) -> String {
        self.verifier
    }
}

impl std::fmt::Debug for Pkce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkce")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// Derives the S256 challenge: base64url (no padding) of SHA-256(verifier).
pub fn challenge_for(verifier: &str, digest: &dyn Sha256Digest) -> String {
    URL_SAFE_NO_PAD.encode(digest.sha256(verifier.as_bytes()))
}

fn is_unreserved(c: char) -> bool {
    c.is_ascii() && VERIFIER_CHARSET.contains(&(c as u8))
}
