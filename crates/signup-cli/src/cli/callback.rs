//! Browser side of Google sign-in.
//!
//! Opens the authorization URL and waits for the redirect on a loopback
//! listener. When stdin is not a terminal, the port is taken, or no redirect
//! arrives in time, the user pastes the redirect URL or the bare code instead.

use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::net::TcpListener;
use std::time::{Duration, Instant};

use anyhow::Result;
use signup_core::config::GoogleConfig;
use signup_core::oauth::google::{GoogleTokenClient, parse_callback, parse_redirect};
use signup_core::oauth::{
    AuthProvider, AuthorizationRequest, AuthorizationResult, SessionToken, SignInError,
    TokenExchangeParams,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct BrowserAuthProvider {
    google: GoogleConfig,
    tokens: GoogleTokenClient,
    open_browser: bool,
    listen: bool,
    paste: Box<dyn BufRead>,
}

impl BrowserAuthProvider {
    pub fn new(google: &GoogleConfig, request_timeout: Duration, open_browser: bool) -> Result<Self> {
        Ok(Self {
            google: google.clone(),
            tokens: GoogleTokenClient::new(google, request_timeout)?,
            open_browser,
            listen: io::stdin().is_terminal(),
            paste: Box::new(io::BufReader::new(io::stdin())),
        })
    }

    /// `None` means the listener produced nothing usable; fall back to paste.
    async fn wait_for_callback(&self, state: &str) -> Option<AuthorizationResult> {
        let listener =
            match TcpListener::bind((self.google.redirect_host.as_str(), self.google.redirect_port)) {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::warn!(error = %err, "loopback listener unavailable, falling back to paste");
                    return None;
                }
            };

        let path = self.google.redirect_path.clone();
        let timeout = self.google.callback_timeout();
        let outcome = tokio::task::spawn_blocking(move || accept_redirect(&listener, &path, timeout))
            .await
            .ok()?;

        match outcome {
            Callback::Redirect(url) => Some(parse_callback(&url, &self.google.redirect_uri(), state)),
            Callback::TimedOut => {
                tracing::info!("no redirect before timeout, falling back to paste");
                None
            }
            Callback::Failed(reason) => {
                tracing::warn!(%reason, "loopback listener failed, falling back to paste");
                None
            }
        }
    }

    fn read_pasted_redirect(&mut self) -> io::Result<String> {
        print!("Paste the redirect URL (or authorization code): ");
        io::stdout().flush()?;
        let mut input = String::new();
        self.paste.read_line(&mut input)?;
        Ok(input)
    }
}

impl AuthProvider for BrowserAuthProvider {
    fn redirect_uri(&self) -> String {
        self.google.redirect_uri()
    }

    async fn start_authorization(&mut self, request: &AuthorizationRequest) -> AuthorizationResult {
        let auth_url = request.url();

        println!("To sign in with Google:");
        println!();
        println!("  1. A browser window will open (or visit the URL below)");
        println!("  2. Choose your Google account and approve access");
        println!("  3. If the browser cannot reach this machine, paste the redirect URL when asked");
        println!();
        println!("Authorization URL:");
        println!("  {auth_url}");
        println!();

        if self.open_browser
            && let Err(err) = open::that(&auth_url)
        {
            tracing::warn!(error = %err, "failed to open browser");
        }

        if self.listen
            && let Some(result) = self.wait_for_callback(&request.state).await
        {
            return result;
        }

        // An empty paste (or EOF) parses as a cancellation.
        match self.read_pasted_redirect() {
            Ok(input) => parse_redirect(&input, &request.redirect_uri, &request.state),
            Err(err) => AuthorizationResult::Failed(format!("failed to read redirect: {err}")),
        }
    }

    async fn exchange_code(&self, params: TokenExchangeParams) -> Result<SessionToken, SignInError> {
        println!("Exchanging code for tokens...");
        self.tokens.exchange(&params).await
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Callback {
    /// The redirect the browser followed.
    Redirect(url::Url),
    TimedOut,
    Failed(String),
}

/// Accepts connections until one hits `callback_path` or `timeout` elapses.
fn accept_redirect(listener: &TcpListener, callback_path: &str, timeout: Duration) -> Callback {
    if let Err(err) = listener.set_nonblocking(true) {
        return Callback::Failed(format!("listener setup failed: {err}"));
    }

    let start = Instant::now();
    loop {
        match listener.accept() {
            Ok((mut stream, _)) => {
                let _ = stream.set_nonblocking(false);
                let mut buffer = [0u8; 4096];
                let n = stream.read(&mut buffer).unwrap_or(0);
                let request = String::from_utf8_lossy(&buffer[..n]);

                let Some(url) = redirect_url(&request, callback_path) else {
                    let _ = stream.write_all(not_found_response().as_bytes());
                    continue;
                };

                let response = if has_code(&url) {
                    success_response()
                } else {
                    error_response()
                };
                let _ = stream.write_all(response.as_bytes());
                return Callback::Redirect(url);
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                if start.elapsed() > timeout {
                    return Callback::TimedOut;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(err) => return Callback::Failed(format!("accept failed: {err}")),
        }
    }
}

/// Parses the request line; `None` unless the target is `callback_path`.
fn redirect_url(request: &str, callback_path: &str) -> Option<url::Url> {
    let request_line = request.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    let target = parts.next()?;

    let url = url::Url::parse(&format!("http://localhost{target}")).ok()?;
    (url.path() == callback_path).then_some(url)
}

fn has_code(url: &url::Url) -> bool {
    url.query_pairs().any(|(k, v)| k == "code" && !v.is_empty())
}

fn html_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn success_response() -> String {
    html_response(
        "200 OK",
        "<html><body><h3>Sign-in complete</h3><p>You can close this window.</p></body></html>",
    )
}

fn error_response() -> String {
    html_response(
        "400 Bad Request",
        "<html><body><h3>Sign-in not completed</h3><p>Return to the terminal for details.</p></body></html>",
    )
}

fn not_found_response() -> String {
    html_response("404 Not Found", "")
}
