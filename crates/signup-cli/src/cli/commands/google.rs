//! `signup google`: one Google sign-in attempt.

use anyhow::Result;
use signup_core::backend::BackendClient;
use signup_core::config::Config;
use signup_core::form::state::RegisterEvent;
use signup_core::oauth::flow::GoogleSignIn;

use crate::cli::callback::BrowserAuthProvider;
use crate::cli::screen::Screen;

pub async fn run(config: &Config, no_browser: bool) -> Result<()> {
    let open_browser = !no_browser && std::env::var_os("SIGNUP_NO_BROWSER").is_none();

    let backend = BackendClient::from_config(config)?;
    let provider =
        BrowserAuthProvider::new(&config.google, config.backend.timeout(), open_browser)?;
    let sign_in = GoogleSignIn::new(config.google.clone(), provider, backend.clone());

    let mut screen = Screen::new(backend, Some(sign_in));
    screen.send(RegisterEvent::GoogleSignInPressed).await;

    if screen.succeeded() {
        return Ok(());
    }
    if screen.alerts().is_empty() {
        println!("Sign-in cancelled.");
        return Ok(());
    }
    anyhow::bail!("Google sign-in failed")
}
