//! Runs the registration screen reducer against real effects.

use std::collections::VecDeque;

use signup_core::backend::Backend;
use signup_core::form::state::{Alert, RegisterEffect, RegisterEvent, RegisterState, reduce};
use signup_core::oauth::flow::GoogleSignIn;
use signup_core::oauth::{AuthProvider, SignInError};

pub struct Screen<P, B> {
    state: RegisterState,
    backend: B,
    google: Option<GoogleSignIn<P, B>>,
    alerts: Vec<Alert>,
}

impl<P: AuthProvider, B: Backend> Screen<P, B> {
    pub fn new(backend: B, google: Option<GoogleSignIn<P, B>>) -> Self {
        Self {
            state: RegisterState::new(),
            backend,
            google,
            alerts: Vec::new(),
        }
    }

    pub fn state(&self) -> &RegisterState {
        &self.state
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    /// Feeds `event` through the reducer, executing effects until the
    /// screen is idle again.
    pub async fn send(&mut self, event: RegisterEvent) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let (next, effects) = reduce(std::mem::take(&mut self.state), event);
            self.state = next;

            for effect in effects {
                match effect {
                    RegisterEffect::SubmitRegistration(request) => {
                        let result = self.backend.register(&request).await;
                        queue.push_back(RegisterEvent::SubmitFinished(result));
                    }
                    RegisterEffect::StartGoogleSignIn => {
                        let result = match self.google.as_mut() {
                            Some(sign_in) => sign_in.run().await,
                            None => Err(SignInError::Authorization(
                                "Google sign-in is not available".to_string(),
                            )),
                        };
                        queue.push_back(RegisterEvent::GoogleSignInFinished(result));
                    }
                    RegisterEffect::ShowAlert(alert) => {
                        println!("{}: {}", alert.title, alert.message);
                        self.alerts.push(alert);
                    }
                }
            }
        }
    }

    /// Whether the last alert shown reported success.
    pub fn succeeded(&self) -> bool {
        self.alerts.last().is_some_and(|a| a.title == "Success")
    }
}
