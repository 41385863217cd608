//! Account backend client.
//!
//! Two endpoints: registration and Google identity-token forwarding. Neither
//! call is retried; every failure ends the current attempt.

use std::future::Future;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::{Config, ServerErrorMapping};
use crate::form::RegistrationInput;
use crate::oauth::SessionToken;

pub const REGISTER_PATH: &str = "/api/auth/register/";
pub const GOOGLE_PATH: &str = "/api/auth/google/";

/// Registration payload sent to the backend.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

impl RegistrationRequest {
    /// Builds the payload from validated form input. The email is lowercased.
    pub fn from_input(input: &RegistrationInput) -> Self {
        Self {
            full_name: input.full_name.clone(),
            email: input.email.to_lowercase(),
            password: input.password.clone(),
        }
    }
}

impl std::fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Why a registration did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// The backend reported the email as already registered.
    #[error("{0}")]
    DuplicateEmail(String),
    /// Any other non-success response.
    #[error("registration rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    /// Transport failure, timeout or unreachable host.
    #[error("network error: {0}")]
    Network(String),
}

/// Failure forwarding the identity token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend rejected the request (HTTP {0})")]
    Rejected(u16),
    #[error("network error: {0}")]
    Network(String),
}

/// The backend operations the client flows depend on.
pub trait Backend {
    /// Submits a registration.
    fn register(
        &self,
        request: &RegistrationRequest,
    ) -> impl Future<Output = Result<(), RegisterError>>;

    /// Hands a Google identity token to the backend session endpoint.
    fn forward_google_token(
        &self,
        token: &SessionToken,
    ) -> impl Future<Output = Result<(), BackendError>>;
}

/// HTTP implementation of [`Backend`].
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    errors: ServerErrorMapping,
}

impl BackendClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.backend.timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.backend.base_url.trim_end_matches('/').to_string(),
            errors: config.registration.errors.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Backend for BackendClient {
    async fn register(&self, request: &RegistrationRequest) -> Result<(), RegisterError> {
        let url = self.endpoint(REGISTER_PATH);
        tracing::debug!(%url, "submitting registration");

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| RegisterError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(status = status.as_u16(), "registration accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify_rejection(status.as_u16(), &body, &self.errors);
        tracing::warn!(status = status.as_u16(), error = %err, "registration rejected");
        Err(err)
    }

    async fn forward_google_token(&self, token: &SessionToken) -> Result<(), BackendError> {
        let url = self.endpoint(GOOGLE_PATH);
        tracing::debug!(%url, "forwarding identity token");

        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "token": token.as_str() }))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            tracing::warn!(status = status.as_u16(), "identity token rejected");
            Err(BackendError::Rejected(status.as_u16()))
        }
    }
}

/// Maps a non-success registration response onto a [`RegisterError`].
pub fn classify_rejection(status: u16, body: &str, mapping: &ServerErrorMapping) -> RegisterError {
    let json: Value = serde_json::from_str(body).unwrap_or(Value::Null);

    let is_client_error = (400..500).contains(&status);
    if is_client_error && json.get(&mapping.duplicate_field).is_some_and(is_truthy) {
        return RegisterError::DuplicateEmail(mapping.duplicate_message.clone());
    }

    let message = json
        .get(&mapping.message_field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map_or_else(|| mapping.fallback_message.clone(), ToString::to_string);

    RegisterError::Rejected { status, message }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
