//! Google OAuth (authorization code + PKCE) request building, redirect
//! parsing and code exchange.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{AuthorizationResult, SessionToken, SignInError};
use crate::config::GoogleConfig;
use crate::pkce::Pkce;

/// Google OAuth URLs
pub const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

pub const SCOPES: &[&str] = &["openid", "profile", "email"];
const RESPONSE_TYPE: &str = "code";
const CHALLENGE_METHOD: &str = "S256";
/// Forces the account chooser even when a single session exists.
const PROMPT: &str = "select_account";

/// Error value Google returns when the user denies consent.
const ACCESS_DENIED: &str = "access_denied";

/// Authorization request for one sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub authorize_url: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub state: String,
}

impl AuthorizationRequest {
    pub fn new(google: &GoogleConfig, redirect_uri: &str, pkce: &Pkce, state: &str) -> Self {
        Self {
            authorize_url: google.authorize_url.clone(),
            client_id: google.client_id.clone(),
            scopes: SCOPES.iter().map(ToString::to_string).collect(),
            redirect_uri: redirect_uri.to_string(),
            code_challenge: pkce.challenge().to_string(),
            state: state.to_string(),
        }
    }

    /// Builds the browser URL for this request.
    pub fn url(&self) -> String {
        let scope = self.scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", RESPONSE_TYPE),
            ("scope", scope.as_str()),
            ("code_challenge", self.code_challenge.as_str()),
            ("code_challenge_method", CHALLENGE_METHOD),
            ("prompt", PROMPT),
            ("state", self.state.as_str()),
        ];

        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();

        let sep = if self.authorize_url.contains('?') { '&' } else { '?' };
        format!("{}{sep}{query}", self.authorize_url)
    }
}

/// Parameters of the code-for-token exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenExchangeParams {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub code: String,
    pub redirect_uri: String,
    pub code_verifier: String,
}

impl TokenExchangeParams {
    /// Form-encoded request body.
    pub fn form_body(&self) -> String {
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        form.append_pair("grant_type", "authorization_code")
            .append_pair("client_id", &self.client_id);
        if let Some(secret) = &self.client_secret {
            form.append_pair("client_secret", secret);
        }
        form.append_pair("code", &self.code)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("code_verifier", &self.code_verifier);
        form.finish()
    }
}

impl std::fmt::Debug for TokenExchangeParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchangeParams")
            .field("client_id", &self.client_id)
            .field("code", &super::mask_token(&self.code))
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

/// Interprets what came back from the browser.
///
/// Accepts a full redirect URL, a bare query string (`code=...&state=...`),
/// `code#state`, or a bare code. A present `state` must equal `expected_state`.
pub fn parse_redirect(input: &str, redirect_uri: &str, expected_state: &str) -> AuthorizationResult {
    let value = input.trim();
    if value.is_empty() {
        return AuthorizationResult::Cancelled;
    }

    if let Ok(url) = url::Url::parse(value) {
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        return from_pairs(&pairs, redirect_uri, expected_state, false);
    }

    if value.contains("code=") || value.contains("error=") {
        let query = value.trim_start_matches('?');
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        return from_pairs(&pairs, redirect_uri, expected_state, false);
    }

    if let Some((code, state)) = value.split_once('#') {
        let pairs = vec![
            ("code".to_string(), code.to_string()),
            ("state".to_string(), state.to_string()),
        ];
        return from_pairs(&pairs, redirect_uri, expected_state, false);
    }

    AuthorizationResult::Success {
        code: value.to_string(),
        redirect_uri: redirect_uri.to_string(),
    }
}

/// Parses a redirect received by the loopback listener. Unlike
/// [`parse_redirect`], `state` is mandatory.
pub fn parse_callback(url: &url::Url, redirect_uri: &str, expected_state: &str) -> AuthorizationResult {
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    from_pairs(&pairs, redirect_uri, expected_state, true)
}

fn from_pairs(
    pairs: &[(String, String)],
    redirect_uri: &str,
    expected_state: &str,
    require_state: bool,
) -> AuthorizationResult {
    let get = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    if let Some(error) = get("error") {
        if error == ACCESS_DENIED {
            return AuthorizationResult::Cancelled;
        }
        let reason = match get("error_description") {
            Some(desc) => format!("{error}: {desc}"),
            None => error.to_string(),
        };
        return AuthorizationResult::Failed(reason);
    }

    match get("state") {
        Some(state) if state != expected_state => {
            return AuthorizationResult::Failed("state mismatch".to_string());
        }
        None if require_state => {
            return AuthorizationResult::Failed("redirect carried no state".to_string());
        }
        _ => {}
    }

    match get("code").filter(|c| !c.is_empty()) {
        Some(code) => AuthorizationResult::Success {
            code: code.to_string(),
            redirect_uri: redirect_uri.to_string(),
        },
        None => AuthorizationResult::Failed("redirect carried no authorization code".to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

/// Token endpoint client.
#[derive(Debug, Clone)]
pub struct GoogleTokenClient {
    http: reqwest::Client,
    token_url: String,
}

impl GoogleTokenClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(google: &GoogleConfig, timeout: std::time::Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            token_url: google.token_url.clone(),
        })
    }

    /// Exchanges an authorization code for the identity token.
    ///
    /// # Errors
    /// Returns `SignInError::Exchange` on transport failure, a non-success
    /// status, or a response without `id_token`.
    pub async fn exchange(&self, params: &TokenExchangeParams) -> Result<SessionToken, SignInError> {
        tracing::debug!(token_url = %self.token_url, "exchanging authorization code");

        let response = self
            .http
            .post(&self.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(params.form_body())
            .send()
            .await
            .map_err(|e| SignInError::Exchange(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SignInError::Exchange(format!("HTTP {status}: {body}")));
        }

        let token_data: TokenResponse = response
            .json()
            .await
            .map_err(|e| SignInError::Exchange(format!("invalid token response: {e}")))?;

        token_data
            .id_token
            .filter(|t| !t.is_empty())
            .map(SessionToken::new)
            .ok_or_else(|| SignInError::Exchange("token response has no id_token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkce::Sha2;

    const REDIRECT: &str = "http://127.0.0.1:8085/oauth2callback";
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

    fn request() -> AuthorizationRequest {
        let pkce = Pkce::from_verifier(VERIFIER, &Sha2).unwrap();
        AuthorizationRequest::new(&GoogleConfig::default(), REDIRECT, &pkce, "st-1")
    }

    #[test]
    fn test_auth_url_parameters() {
        let url = url::Url::parse(&request().url()).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(url.path(), "/o/oauth2/v2/auth");

        let q: std::collections::HashMap<String, String> =
            url.query_pairs().into_owned().collect();
        assert_eq!(q["client_id"], GoogleConfig::default().client_id);
        assert_eq!(q["redirect_uri"], REDIRECT);
        assert_eq!(q["response_type"], "code");
        assert_eq!(q["scope"], "openid profile email");
        assert_eq!(q["code_challenge"], "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
        assert_eq!(q["code_challenge_method"], "S256");
        assert_eq!(q["prompt"], "select_account");
        assert_eq!(q["state"], "st-1");
        assert!(!q.contains_key("code_verifier"));
    }

    #[test]
    fn test_form_body_carries_verifier() {
        let params = TokenExchangeParams {
            client_id: "cid".to_string(),
            client_secret: None,
            code: "4/abc".to_string(),
            redirect_uri: REDIRECT.to_string(),
            code_verifier: VERIFIER.to_string(),
        };
        let body = params.form_body();
        let pairs: std::collections::HashMap<String, String> =
            url::form_urlencoded::parse(body.as_bytes()).into_owned().collect();

        assert_eq!(pairs["grant_type"], "authorization_code");
        assert_eq!(pairs["code"], "4/abc");
        assert_eq!(pairs["redirect_uri"], REDIRECT);
        assert_eq!(pairs["code_verifier"], VERIFIER);
        assert!(!pairs.contains_key("client_secret"));
        assert!(!format!("{params:?}").contains(VERIFIER));
    }

    #[test]
    fn test_form_body_includes_secret_when_configured() {
        let params = TokenExchangeParams {
            client_id: "cid".to_string(),
            client_secret: Some("shh".to_string()),
            code: "c".to_string(),
            redirect_uri: REDIRECT.to_string(),
            code_verifier: VERIFIER.to_string(),
        };
        assert!(params.form_body().contains("client_secret=shh"));
    }

    #[test]
    fn test_parse_redirect_url_success() {
        let result = parse_redirect(
            "http://127.0.0.1:8085/oauth2callback?state=st-1&code=4%2Fxyz&scope=email",
            REDIRECT,
            "st-1",
        );
        assert_eq!(
            result,
            AuthorizationResult::Success {
                code: "4/xyz".to_string(),
                redirect_uri: REDIRECT.to_string()
            }
        );
    }

    #[test]
    fn test_parse_redirect_access_denied_is_cancel() {
        assert_eq!(
            parse_redirect(
                "http://127.0.0.1:8085/oauth2callback?error=access_denied&state=st-1",
                REDIRECT,
                "st-1"
            ),
            AuthorizationResult::Cancelled
        );
        assert_eq!(parse_redirect("   ", REDIRECT, "st-1"), AuthorizationResult::Cancelled);
    }

    #[test]
    fn test_parse_redirect_other_error_fails() {
        assert_eq!(
            parse_redirect(
                "error=invalid_request&error_description=bad+scope",
                REDIRECT,
                "st-1"
            ),
            AuthorizationResult::Failed("invalid_request: bad scope".to_string())
        );
    }

    #[test]
    fn test_parse_redirect_state_mismatch() {
        assert_eq!(
            parse_redirect("code=abc&state=other", REDIRECT, "st-1"),
            AuthorizationResult::Failed("state mismatch".to_string())
        );
        assert_eq!(
            parse_redirect("abc#other", REDIRECT, "st-1"),
            AuthorizationResult::Failed("state mismatch".to_string())
        );
    }

    #[test]
    fn test_parse_redirect_bare_code_and_missing_state() {
        let expected = AuthorizationResult::Success {
            code: "abc".to_string(),
            redirect_uri: REDIRECT.to_string(),
        };
        assert_eq!(parse_redirect("abc", REDIRECT, "st-1"), expected);
        assert_eq!(parse_redirect("?code=abc", REDIRECT, "st-1"), expected);
        assert_eq!(parse_redirect("abc#st-1", REDIRECT, "st-1"), expected);
    }

    #[test]
    fn test_parse_redirect_without_code_fails() {
        assert!(matches!(
            parse_redirect("http://127.0.0.1:8085/oauth2callback?state=st-1", REDIRECT, "st-1"),
            AuthorizationResult::Failed(_)
        ));
    }

    #[test]
    fn test_parse_callback_requires_state() {
        let without = url::Url::parse("http://localhost/oauth2callback?code=injected").unwrap();
        assert_eq!(
            parse_callback(&without, REDIRECT, "st-1"),
            AuthorizationResult::Failed("redirect carried no state".to_string())
        );

        let wrong = url::Url::parse("http://localhost/oauth2callback?code=abc&state=other").unwrap();
        assert_eq!(
            parse_callback(&wrong, REDIRECT, "st-1"),
            AuthorizationResult::Failed("state mismatch".to_string())
        );

        let good = url::Url::parse("http://localhost/oauth2callback?code=abc&state=st-1").unwrap();
        assert_eq!(
            parse_callback(&good, REDIRECT, "st-1"),
            AuthorizationResult::Success {
                code: "abc".to_string(),
                redirect_uri: REDIRECT.to_string(),
            }
        );
    }
}
