//! Eventhub CLI - sign in and talk to the ticketing API from a terminal

use std::sync::Arc;

use clap::{Parser, Subcommand};
use eventhub_core::config::Config;
use eventhub_core::http::Method;
use eventhub_core::session::{
    Identity, Navigator, ProfileUpdate, Registration, SessionService, SilentNavigator,
};
use eventhub_core::storage::{self, TOKEN_KEY, USER_KEY};
use eventhub_core::Error;
use tracing::debug;

#[derive(Parser)]
#[command(name = "eventhub")]
#[command(author, version, about = "Client for the Eventhub ticketing API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "EVENTHUB_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create a new account
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "EVENTHUB_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        phone: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Revalidate the stored session and show the current user
    Whoami,

    /// Show the stored session without contacting the server
    Status,

    /// Manage your profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Change your password
    ChangePassword {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },

    /// Send a raw request to the API with the session credential
    Request {
        /// HTTP method (GET, POST, PUT, DELETE, ...)
        method: String,
        /// Path relative to the API base URL, e.g. /events
        path: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Re-fetch your profile from the server
    Show,
    /// Update profile fields
    Update {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show the configuration file path
    Path,
}

/// Tells the terminal user their session is gone
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect_to_login(&self) {
        eprintln!("Your session is no longer valid. Run `eventhub login` to sign in again.");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("eventhub=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Login { email, password } => {
            cmd_login(&email, &password, cli.format, cli.quiet).await
        }

        Commands::Register {
            email,
            password,
            first_name,
            last_name,
            phone,
        } => {
            let registration = Registration {
                email,
                password,
                first_name,
                last_name,
                phone,
            };
            cmd_register(&registration, cli.format, cli.quiet).await
        }

        Commands::Logout => cmd_logout(cli.quiet),

        Commands::Whoami => cmd_whoami(cli.format).await,

        Commands::Status => cmd_status(cli.format),

        Commands::Profile { action } => cmd_profile(action, cli.format, cli.quiet).await,

        Commands::ChangePassword { current, new } => {
            cmd_change_password(&current, &new, cli.quiet).await
        }

        Commands::Request { method, path, data } => {
            cmd_request(&method, &path, data.as_deref()).await
        }

        Commands::Config { action } => cmd_config(action, cli.quiet),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn session_service(navigator: Arc<dyn Navigator>) -> anyhow::Result<SessionService> {
    let config = Config::load()?;
    debug!(base_url = %config.api.base_url, backend = %config.storage.backend, "Loaded config");

    Ok(SessionService::builder()
        .config(config)
        .navigator(navigator)
        .build()?)
}

/// Service with the stored session revalidated; fails when logged out
async fn authenticated_service() -> anyhow::Result<SessionService> {
    let service = session_service(Arc::new(TerminalNavigator))?;
    let snapshot = service.start().await;
    if !snapshot.is_authenticated() {
        return Err(Error::NotAuthenticated.into());
    }
    Ok(service)
}

fn print_identity(identity: &Identity, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(identity)?),
        OutputFormat::Text => {
            println!("{} <{}>", identity.display_name(), identity.email);
            println!("  id:        {}", identity.id);
            if !identity.phone.is_empty() {
                println!("  phone:     {}", identity.phone);
            }
            let mut roles = Vec::new();
            if identity.is_admin {
                roles.push("admin");
            }
            if identity.is_organizer {
                roles.push("organizer");
            }
            if !roles.is_empty() {
                println!("  roles:     {}", roles.join(", "));
            }
        }
    }
    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_login(
    email: &str,
    password: &str,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    // Already on the login path, nowhere to redirect to
    let service = session_service(Arc::new(SilentNavigator))?;
    let identity = service.login(email, password).await?;

    if format == OutputFormat::Json {
        return print_identity(&identity, format);
    }
    if !quiet {
        println!("Logged in as {}", identity.display_name());
    }
    Ok(())
}

async fn cmd_register(
    registration: &Registration,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let service = session_service(Arc::new(SilentNavigator))?;
    let identity = service.register(registration).await?;

    if format == OutputFormat::Json {
        return print_identity(&identity, format);
    }
    if !quiet {
        println!("Account created for {}.", identity.email);
        println!("Run `eventhub login --email {}` to sign in.", identity.email);
    }
    Ok(())
}

fn cmd_logout(quiet: bool) -> anyhow::Result<()> {
    let service = session_service(Arc::new(SilentNavigator))?;
    service.logout();
    if !quiet {
        println!("Logged out.");
    }
    Ok(())
}

async fn cmd_whoami(format: OutputFormat) -> anyhow::Result<()> {
    let service = authenticated_service().await?;
    match service.current_user() {
        Some(identity) => print_identity(&identity, format),
        None => Err(Error::NotAuthenticated.into()),
    }
}

fn cmd_status(format: OutputFormat) -> anyhow::Result<()> {
    let config = Config::load()?;
    let storage = storage::open(&config.storage)?;

    let has_token = storage.get(TOKEN_KEY)?.is_some_and(|t| !t.is_empty());
    let identity = match storage.get(USER_KEY)? {
        Some(json) if has_token => serde_json::from_str::<Identity>(&json).ok(),
        _ => None,
    };

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "logged_in": identity.is_some(),
                "api": config.api.base_url,
                "user": identity,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("API: {}", config.api.base_url);
            match identity {
                Some(identity) => println!(
                    "Logged in as {} (stored session, not revalidated)",
                    identity.display_name()
                ),
                None => println!("Not logged in"),
            }
        }
    }
    Ok(())
}

async fn cmd_profile(action: ProfileAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let service = authenticated_service().await?;

    match action {
        ProfileAction::Show => {
            let identity = service.refresh_user().await?;
            print_identity(&identity, format)
        }
        ProfileAction::Update {
            first_name,
            last_name,
            phone,
        } => {
            let update = ProfileUpdate {
                first_name,
                last_name,
                phone,
            };
            if update.is_empty() {
                return Err(Error::InvalidInput(
                    "Nothing to update. Pass --first-name, --last-name or --phone.".to_string(),
                )
                .into());
            }

            service.update_profile(&update).await?;
            if let Some(identity) = service.current_user() {
                if format == OutputFormat::Json || !quiet {
                    print_identity(&identity, format)?;
                }
            }
            Ok(())
        }
    }
}

async fn cmd_change_password(current: &str, new: &str, quiet: bool) -> anyhow::Result<()> {
    let service = authenticated_service().await?;
    let message = service.change_password(current, new).await?;
    if !quiet {
        println!("{}", message);
    }
    Ok(())
}

async fn cmd_request(method: &str, path: &str, data: Option<&str>) -> anyhow::Result<()> {
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|_| Error::InvalidInput(format!("Invalid HTTP method: {}", method)))?;
    let body = data
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .map_err(|e| Error::InvalidInput(format!("--data is not valid JSON: {}", e)))?;

    let service = session_service(Arc::new(TerminalNavigator))?;
    service.start().await;

    let response = service
        .client()
        .send_json(method, path, body.as_ref())
        .await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load_file()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
