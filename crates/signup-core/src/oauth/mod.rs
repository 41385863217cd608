//! OAuth sign-in: shared types, the provider seam and the Google flow.
//!
//! The browser redirect and the code exchange sit behind [`AuthProvider`] so
//! that [`flow::GoogleSignIn`] can be driven by scripted fakes.

use std::future::Future;

use thiserror::Error;

use crate::backend::BackendError;

pub mod flow;
pub mod google;

pub use google::{AuthorizationRequest, TokenExchangeParams};

/// Opaque identity token returned by the code exchange.
///
/// Forwarded verbatim to the backend; never parsed or validated here.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionToken({})", mask_token(&self.0))
    }
}

/// Returns a masked version of a token for display (first 12 chars + ...).
pub fn mask_token(token: &str) -> String {
    if token.len() <= 16 || !token.is_char_boundary(12) {
        return "***".to_string();
    }
    format!("{}...", &token[..12])
}

/// Outcome of the browser redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationResult {
    /// The user approved; `code` is bound to `redirect_uri`.
    Success { code: String, redirect_uri: String },
    /// The user dismissed the browser or denied access.
    Cancelled,
    /// The authorization server or redirect reported an error.
    Failed(String),
}

/// Why a sign-in attempt ended without a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignInError {
    #[error("sign-in cancelled")]
    Cancelled,
    #[error("authorization failed: {0}")]
    Authorization(String),
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Coarse failure category, recorded in the flow's terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Cancelled,
    Authorization,
    Exchange,
    Backend,
}

impl SignInError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SignInError::Cancelled => FailureKind::Cancelled,
            SignInError::Authorization(_) => FailureKind::Authorization,
            SignInError::Exchange(_) => FailureKind::Exchange,
            SignInError::Backend(_) => FailureKind::Backend,
        }
    }
}

/// Platform side of an OAuth sign-in: redirect URI, browser round-trip and
/// code exchange.
pub trait AuthProvider {
    /// Redirect URI the authorization server sends the user back to.
    fn redirect_uri(&self) -> String;

    /// Sends the user through the authorization endpoint and waits for the
    /// redirect to come back.
    fn start_authorization(
        &mut self,
        request: &AuthorizationRequest,
    ) -> impl Future<Output = AuthorizationResult>;

    /// Exchanges an authorization code (plus PKCE verifier) for an identity token.
    fn exchange_code(
        &self,
        params: TokenExchangeParams,
    ) -> impl Future<Output = Result<SessionToken, SignInError>>;
}
