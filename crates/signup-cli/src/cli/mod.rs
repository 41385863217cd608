//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use signup_core::config;

mod callback;
mod commands;
mod logging;
mod screen;

#[derive(Parser)]
#[command(name = "signup")]
#[command(version)]
#[command(about = "Create an account or sign in with Google")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Also write logs to ${SIGNUP_HOME}/logs/
    #[arg(long, global = true)]
    log_file: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Register a new account (password and confirmation are read from stdin)
    Register {
        /// Full name shown on the account
        #[arg(long)]
        full_name: String,

        /// Email address to register
        #[arg(long)]
        email: String,
    },

    /// Sign in with Google
    Google {
        /// Print the authorization URL without opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Sign in with Apple
    Apple,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = logging::init(cli.log_file).context("init logging")?;

    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
        Commands::Apple => {
            commands::apple::run();
            Ok(())
        }
        Commands::Register { full_name, email } => {
            let config = config::Config::load().context("load config")?;
            commands::register::run(&full_name, &email, &config).await
        }
        Commands::Google { no_browser } => {
            let config = config::Config::load().context("load config")?;
            commands::google::run(&config, no_browser).await
        }
    }
}
