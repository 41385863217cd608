//! `signup register`: fills the form from arguments and stdin, then submits.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result};
use signup_core::backend::BackendClient;
use signup_core::config::Config;
use signup_core::form::Field;
use signup_core::form::state::RegisterEvent;

use crate::cli::callback::BrowserAuthProvider;
use crate::cli::screen::Screen;

pub async fn run(full_name: &str, email: &str, config: &Config) -> Result<()> {
    let backend = BackendClient::from_config(config)?;

    let password = read_secret("Password: ").context("read password")?;
    let confirm_password = read_secret("Confirm password: ").context("read password confirmation")?;

    let mut screen: Screen<BrowserAuthProvider, BackendClient> = Screen::new(backend, None);
    for (field, value) in [
        (Field::FullName, full_name.to_string()),
        (Field::Email, email.to_string()),
        (Field::Password, password),
        (Field::ConfirmPassword, confirm_password),
    ] {
        screen.send(RegisterEvent::FocusChanged(Some(field))).await;
        screen.send(RegisterEvent::FieldChanged { field, value }).await;
    }
    screen.send(RegisterEvent::FocusChanged(None)).await;

    println!("{}", screen.state().submit_label());
    screen.send(RegisterEvent::SubmitPressed).await;

    let errors = &screen.state().errors;
    if !errors.is_empty() {
        println!("Please fix the following:");
        for (field, message) in errors.iter() {
            println!("  {}: {message}", field.key());
        }
        anyhow::bail!("registration failed");
    }

    if !screen.succeeded() {
        anyhow::bail!("registration failed");
    }
    Ok(())
}

/// Reads one line from stdin without its line terminator. Prompts only on a TTY.
fn read_secret(prompt: &str) -> io::Result<String> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        print!("{prompt}");
        io::stdout().flush()?;
    }

    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}
