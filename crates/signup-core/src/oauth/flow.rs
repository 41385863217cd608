//! Google sign-in state machine.
//!
//! `Idle -> GeneratingChallenge -> AwaitingRedirect -> ExchangingCode -> Completed`,
//! with `Errored` reachable from every non-terminal phase. Each call to
//! [`GoogleSignIn::run`] is one attempt and starts from a fresh PKCE pair.
//! The redirect, the exchange and the backend call run strictly in sequence.

use super::{
    AuthProvider, AuthorizationRequest, AuthorizationResult, FailureKind, SignInError,
    TokenExchangeParams,
};
use crate::backend::Backend;
use crate::config::GoogleConfig;
use crate::pkce::Pkce;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInPhase {
    Idle,
    GeneratingChallenge,
    AwaitingRedirect,
    ExchangingCode,
    Completed,
    Errored(FailureKind),
}

impl SignInPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SignInPhase::Completed | SignInPhase::Errored(_))
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_enter(self, next: SignInPhase) -> bool {
        use SignInPhase::{
            AwaitingRedirect, Completed, Errored, ExchangingCode, GeneratingChallenge, Idle,
        };

        match (self, next) {
            (Idle, GeneratingChallenge)
            | (GeneratingChallenge, AwaitingRedirect)
            | (AwaitingRedirect, ExchangingCode)
            | (ExchangingCode, Completed) => true,
            (from, Errored(_)) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// One Google sign-in, driven against an [`AuthProvider`] and a [`Backend`].
pub struct GoogleSignIn<P, B> {
    google: GoogleConfig,
    provider: P,
    backend: B,
    phase: SignInPhase,
    history: Vec<SignInPhase>,
}

impl<P: AuthProvider, B: Backend> GoogleSignIn<P, B> {
    pub fn new(google: GoogleConfig, provider: P, backend: B) -> Self {
        Self {
            google,
            provider,
            backend,
            phase: SignInPhase::Idle,
            history: vec![SignInPhase::Idle],
        }
    }

    pub fn phase(&self) -> SignInPhase {
        self.phase
    }

    /// Phases visited by the most recent attempt, starting at `Idle`.
    pub fn history(&self) -> &[SignInPhase] {
        &self.history
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Runs one sign-in attempt.
    ///
    /// # Errors
    /// Returns the reason the attempt ended in `Errored`. Nothing is retried.
    pub async fn run(&mut self) -> Result<(), SignInError> {
        self.phase = SignInPhase::Idle;
        self.history = vec![SignInPhase::Idle];

        match self.attempt().await {
            Ok(()) => {
                self.enter(SignInPhase::Completed);
                tracing::info!("google sign-in completed");
                Ok(())
            }
            Err(err) => {
                self.enter(SignInPhase::Errored(err.kind()));
                match &err {
                    SignInError::Cancelled => tracing::info!("google sign-in cancelled"),
                    other => tracing::warn!(error = %other, "google sign-in failed"),
                }
                Err(err)
            }
        }
    }

    async fn attempt(&mut self) -> Result<(), SignInError> {
        self.enter(SignInPhase::GeneratingChallenge);
        let pkce = Pkce::generate();
        let state = uuid::Uuid::new_v4().to_string();
        let redirect_uri = self.provider.redirect_uri();
        let request = AuthorizationRequest::new(&self.google, &redirect_uri, &pkce, &state);

        self.enter(SignInPhase::AwaitingRedirect);
        let code = match self.provider.start_authorization(&request).await {
            AuthorizationResult::Success {
                code,
                redirect_uri: returned,
            } => {
                if returned != request.redirect_uri {
                    return Err(SignInError::Authorization(
                        "redirect URI does not match the request".to_string(),
                    ));
                }
                code
            }
            AuthorizationResult::Cancelled => return Err(SignInError::Cancelled),
            AuthorizationResult::Failed(reason) => {
                return Err(SignInError::Authorization(reason));
            }
        };

        self.enter(SignInPhase::ExchangingCode);
        let params = TokenExchangeParams {
            client_id: self.google.client_id.clone(),
            client_secret: self.google.client_secret.clone(),
            code,
            redirect_uri: request.redirect_uri,
            code_verifier: pkce.into_verifier(),
        };
        let token = self.provider.exchange_code(params).await?;
        self.backend.forward_google_token(&token).await?;
        Ok(())
    }

    fn enter(&mut self, next: SignInPhase) {
        debug_assert!(
            self.phase.can_enter(next),
            "illegal sign-in transition {:?} -> {next:?}",
            self.phase
        );
        tracing::debug!(from = ?self.phase, to = ?next, "sign-in phase");
        self.phase = next;
        self.history.push(next);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::backend::{BackendError, RegisterError, RegistrationRequest};
    use crate::oauth::SessionToken;
    use crate::pkce::{Sha2, challenge_for};

    const REDIRECT: &str = "http://127.0.0.1:8085/oauth2callback";

    #[derive(Default)]
    struct FakeProvider {
        scripted: VecDeque<AuthorizationResult>,
        exchange_result: Option<Result<SessionToken, SignInError>>,
        requests: Vec<AuthorizationRequest>,
        exchanges: RefCell<Vec<TokenExchangeParams>>,
    }

    impl FakeProvider {
        fn with_results(results: Vec<AuthorizationResult>) -> Self {
            Self {
                scripted: results.into(),
                ..Default::default()
            }
        }
    }

    fn approve() -> AuthorizationResult {
        AuthorizationResult::Success {
            code: "4/code".to_string(),
            redirect_uri: REDIRECT.to_string(),
        }
    }

    impl AuthProvider for FakeProvider {
        fn redirect_uri(&self) -> String {
            REDIRECT.to_string()
        }

        async fn start_authorization(
            &mut self,
            request: &AuthorizationRequest,
        ) -> AuthorizationResult {
            self.requests.push(request.clone());
            self.scripted
                .pop_front()
                .unwrap_or(AuthorizationResult::Cancelled)
        }

        async fn exchange_code(
            &self,
            params: TokenExchangeParams,
        ) -> Result<SessionToken, SignInError> {
            self.exchanges.borrow_mut().push(params);
            self.exchange_result
                .clone()
                .unwrap_or_else(|| Ok(SessionToken::new("id-token-from-google")))
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        reject_with: Option<BackendError>,
        forwarded: RefCell<Vec<String>>,
    }

    impl Backend for FakeBackend {
        async fn register(&self, _request: &RegistrationRequest) -> Result<(), RegisterError> {
            Ok(())
        }

        async fn forward_google_token(&self, token: &SessionToken) -> Result<(), BackendError> {
            self.forwarded.borrow_mut().push(token.as_str().to_string());
            match &self.reject_with {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    fn flow(provider: FakeProvider, backend: FakeBackend) -> GoogleSignIn<FakeProvider, FakeBackend> {
        GoogleSignIn::new(GoogleConfig::default(), provider, backend)
    }

    #[tokio::test]
    async fn test_successful_sign_in_visits_every_phase() {
        let mut sign_in = flow(FakeProvider::with_results(vec![approve()]), FakeBackend::default());

        sign_in.run().await.unwrap();

        assert_eq!(
            sign_in.history(),
            &[
                SignInPhase::Idle,
                SignInPhase::GeneratingChallenge,
                SignInPhase::AwaitingRedirect,
                SignInPhase::ExchangingCode,
                SignInPhase::Completed,
            ]
        );
        assert_eq!(
            *sign_in.backend().forwarded.borrow(),
            vec!["id-token-from-google".to_string()]
        );
    }

    #[tokio::test]
    async fn test_exchange_uses_this_attempts_verifier_and_redirect() {
        let mut sign_in = flow(FakeProvider::with_results(vec![approve()]), FakeBackend::default());
        sign_in.run().await.unwrap();

        let provider = sign_in.provider();
        let request = &provider.requests[0];
        let exchanges = provider.exchanges.borrow();
        let params = &exchanges[0];

        assert_eq!(params.code, "4/code");
        assert_eq!(params.redirect_uri, request.redirect_uri);
        assert_eq!(params.client_id, request.client_id);
        assert_eq!(params.code_verifier.len(), 128);
        assert_eq!(challenge_for(&params.code_verifier, &Sha2), request.code_challenge);
    }

    #[tokio::test]
    async fn test_cancelled_redirect_makes_no_network_calls() {
        let mut sign_in = flow(
            FakeProvider::with_results(vec![AuthorizationResult::Cancelled]),
            FakeBackend::default(),
        );

        let err = sign_in.run().await.unwrap_err();

        assert_eq!(err, SignInError::Cancelled);
        assert_eq!(sign_in.phase(), SignInPhase::Errored(FailureKind::Cancelled));
        assert!(sign_in.provider().exchanges.borrow().is_empty());
        assert!(sign_in.backend().forwarded.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_failed_redirect_makes_no_network_calls() {
        let mut sign_in = flow(
            FakeProvider::with_results(vec![AuthorizationResult::Failed("server_error".into())]),
            FakeBackend::default(),
        );

        let err = sign_in.run().await.unwrap_err();

        assert_eq!(err, SignInError::Authorization("server_error".to_string()));
        assert!(sign_in.provider().exchanges.borrow().is_empty());
        assert!(sign_in.backend().forwarded.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_redirect_uri_mismatch_is_rejected() {
        let mut sign_in = flow(
            FakeProvider::with_results(vec![AuthorizationResult::Success {
                code: "c".to_string(),
                redirect_uri: "http://evil.example/cb".to_string(),
            }]),
            FakeBackend::default(),
        );

        assert!(matches!(
            sign_in.run().await,
            Err(SignInError::Authorization(_))
        ));
        assert!(sign_in.provider().exchanges.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_failure_skips_backend() {
        let provider = FakeProvider {
            exchange_result: Some(Err(SignInError::Exchange("HTTP 400".to_string()))),
            ..FakeProvider::with_results(vec![approve()])
        };
        let mut sign_in = flow(provider, FakeBackend::default());

        let err = sign_in.run().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Exchange);
        assert_eq!(
            sign_in.history().last(),
            Some(&SignInPhase::Errored(FailureKind::Exchange))
        );
        assert!(sign_in.backend().forwarded.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_backend_rejection_is_errored() {
        let backend = FakeBackend {
            reject_with: Some(BackendError::Rejected(401)),
            ..Default::default()
        };
        let mut sign_in = flow(FakeProvider::with_results(vec![approve()]), backend);

        let err = sign_in.run().await.unwrap_err();

        assert_eq!(err, SignInError::Backend(BackendError::Rejected(401)));
        assert_eq!(sign_in.phase(), SignInPhase::Errored(FailureKind::Backend));
    }

    #[tokio::test]
    async fn test_each_attempt_gets_a_fresh_pair() {
        let mut sign_in = flow(
            FakeProvider::with_results(vec![AuthorizationResult::Cancelled, approve()]),
            FakeBackend::default(),
        );

        assert!(sign_in.run().await.is_err());
        sign_in.run().await.unwrap();

        let requests = &sign_in.provider().requests;
        assert_eq!(requests.len(), 2);
        assert_ne!(requests[0].code_challenge, requests[1].code_challenge);
        assert_ne!(requests[0].state, requests[1].state);
        assert_eq!(sign_in.history().first(), Some(&SignInPhase::Idle));
        assert_eq!(sign_in.phase(), SignInPhase::Completed);
    }

    #[test]
    fn test_transition_table() {
        use SignInPhase::{
            AwaitingRedirect, Completed, Errored, ExchangingCode, GeneratingChallenge, Idle,
        };

        assert!(Idle.can_enter(GeneratingChallenge));
        assert!(Idle.can_enter(Errored(FailureKind::Authorization)));
        assert!(AwaitingRedirect.can_enter(Errored(FailureKind::Cancelled)));
        assert!(!Idle.can_enter(ExchangingCode));
        assert!(!Completed.can_enter(Errored(FailureKind::Backend)));
        assert!(!Errored(FailureKind::Exchange).can_enter(Completed));
        assert!(!AwaitingRedirect.can_enter(Completed));
    }
}
