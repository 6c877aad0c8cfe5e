//! AuthGate CLI - run the login gateway and manage its users.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use authgate_core::config::LogFormat;

#[derive(Parser)]
#[command(name = "authgate")]
#[command(about = "AuthGate - credential login issuing signed bearer tokens")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.authgate/authgate.json)
    #[arg(long, global = true, env = "AUTHGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the login gateway
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (IP)
        #[arg(long)]
        bind: Option<String>,
    },

    /// User management
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Token utilities
    Token {
        #[command(subcommand)]
        action: TokenCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a new user
    Create {
        /// Username for the new user
        #[arg(long)]
        username: String,

        /// Authority to grant (repeatable)
        #[arg(long = "authority", default_value = "ROLE_USER")]
        authorities: Vec<String>,

        /// Password (prompted if neither this nor --generate-password is given)
        #[arg(long, conflicts_with = "generate_password")]
        password: Option<String>,

        /// Generate a random password
        #[arg(long)]
        generate_password: bool,

        /// Email address
        #[arg(long)]
        email: Option<String>,

        /// Display name
        #[arg(long)]
        display_name: Option<String>,
    },

    /// List all users
    List,

    /// Reset a user's password to a generated one
    ResetPassword {
        /// Username of the user
        #[arg(long)]
        username: String,
    },

    /// Enable a user account
    Enable {
        /// Username of the user
        #[arg(long)]
        username: String,
    },

    /// Disable a user account
    Disable {
        /// Username of the user
        #[arg(long)]
        username: String,
    },

    /// Delete a user
    Delete {
        /// Username of the user to delete
        #[arg(long)]
        username: String,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Decode and validate a token with the configured settings
    Decode {
        /// The token
        token: String,
    },

    /// Generate a random signing key
    Secret {
        /// Key length in bytes
        #[arg(long, default_value_t = 64)]
        bytes: usize,

        /// Store the key in the config file
        #[arg(long)]
        write: bool,
    },
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = commands::load_config(cli.config.as_deref());
    let (verbose, format) = match &loaded {
        Ok(config) => (
            cli.verbose || config.settings.debug,
            config.settings.log_format,
        ),
        Err(_) => (cli.verbose, LogFormat::default()),
    };
    init_tracing(verbose, format);

    let config = loaded?;
    let config_path = cli
        .config
        .unwrap_or_else(authgate_core::Config::default_path);

    match cli.command {
        Commands::Serve { port, bind } => {
            commands::run_serve(config, commands::serve::ServeArgs { port, bind }).await?;
        }

        Commands::User { action } => {
            let action = match action {
                UserCommands::Create {
                    username,
                    authorities,
                    password,
                    generate_password,
                    email,
                    display_name,
                } => commands::user::UserAction::Create {
                    username,
                    authorities,
                    password,
                    generate_password,
                    email,
                    display_name,
                },
                UserCommands::List => commands::user::UserAction::List,
                UserCommands::ResetPassword { username } => {
                    commands::user::UserAction::ResetPassword { username }
                }
                UserCommands::Enable { username } => {
                    commands::user::UserAction::SetEnabled { username, enabled: true }
                }
                UserCommands::Disable { username } => {
                    commands::user::UserAction::SetEnabled { username, enabled: false }
                }
                UserCommands::Delete { username, yes } => {
                    commands::user::UserAction::Delete { username, yes }
                }
            };
            commands::run_user(&config, action)?;
        }

        Commands::Token { action } => {
            let action = match action {
                TokenCommands::Decode { token } => commands::token::TokenAction::Decode { token },
                TokenCommands::Secret { bytes, write } => {
                    commands::token::TokenAction::Secret { bytes, write }
                }
            };
            commands::run_token(config, &config_path, action)?;
        }
    }

    Ok(())
}
