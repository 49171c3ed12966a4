//! Bee CLI - pair with your Bee account and keep the credential safe
//!
//! `bee login` runs the app pairing handshake and stores the resulting
//! bearer token; other commands read it back from the credential store.

use anyhow::{Context, Result};
use bee_auth::{CredentialStore, LoginFlow, PairingClient, PairingLink, Presenter, SystemClock};
use bee_core::{env_flag, Config, Environment, StoreMode};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use std::io::{BufRead, IsTerminal, Write};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Bee - command-line access to your Bee account
#[derive(Parser, Debug)]
#[command(name = "bee")]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment to use (production, staging)
    #[arg(short, long, global = true, env = "BEE_ENV", default_value = "production")]
    env: String,

    /// Override the API base URL
    #[arg(long, global = true, env = "BEE_API_URL", hide = true)]
    api_url: Option<String>,

    /// Credential storage (auto, keyring, file)
    #[arg(long, global = true, env = "BEE_CREDENTIAL_STORE", default_value = "auto")]
    credential_store: String,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pair this CLI with your Bee account
    Login {
        /// Non-interactive login that resumes an unfinished pairing
        #[arg(long, conflicts_with = "token_stdin")]
        agent: bool,

        /// Read a bearer token from standard input instead of pairing
        #[arg(long)]
        token_stdin: bool,
    },
    /// Remove stored credentials for the environment
    Logout,
    /// Show login state and where credentials are stored
    Status,
    /// Print the stored bearer token
    Token,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays clean for `bee token`
    let log_level = if args.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    debug!("bee v{}", env!("CARGO_PKG_VERSION"));

    let environment: Environment = args.env.parse()?;
    let store_mode: StoreMode = args.credential_store.parse()?;

    let config = Config::new(environment)
        .with_api_base_url(args.api_url.clone())
        .with_store_mode(store_mode)
        .with_emoji_hash(env_flag(std::env::var("BEE_EMOJI_HASH").ok().as_deref()));

    let store = Arc::new(
        CredentialStore::from_config(&config).context("Failed to open credential store")?,
    );

    match args.command {
        Command::Login { agent, token_stdin } => {
            if token_stdin {
                login_with_stdin(&store, environment).await
            } else {
                login(config, store, agent).await
            }
        }
        Command::Logout => {
            store.clear_token(environment).await?;
            store.clear_pairing_state(environment).await?;
            println!("Logged out of {}", environment);
            Ok(())
        }
        Command::Status => status(&store, environment).await,
        Command::Token => {
            let token = store.require_token(environment).await?;
            println!("{}", token);
            Ok(())
        }
    }
}

async fn login(config: Config, store: Arc<CredentialStore>, agent: bool) -> Result<()> {
    let environment = config.environment;

    if !agent && !std::io::stdin().is_terminal() {
        return Err(bee_core::Error::validation(
            "interactive login needs a terminal; use `bee login --agent` or `--token-stdin`",
        )
        .into());
    }

    info!("Logging in to {}", environment);
    let client =
        PairingClient::new(config.api_base_url()).context("Failed to build HTTP client")?;
    let flow = LoginFlow::new(client, SystemClock, store, config);

    if agent {
        flow.login_agent(&AgentPresenter).await?;
    } else {
        flow.login_interactive(&TerminalPresenter).await?;
    }

    println!("Logged in to {}", environment);
    Ok(())
}

async fn login_with_stdin(store: &CredentialStore, environment: Environment) -> Result<()> {
    if std::io::stdin().is_terminal() {
        return Err(bee_core::Error::validation(
            "--token-stdin expects the token on a pipe, e.g. `echo $TOKEN | bee login --token-stdin`",
        )
        .into());
    }

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read token from standard input")?;

    let token = input.trim();
    if token.is_empty() {
        return Err(bee_core::Error::validation("no token received on standard input").into());
    }

    store.save_token(environment, token).await?;
    println!("Logged in to {}", environment);
    Ok(())
}

async fn status(store: &CredentialStore, environment: Environment) -> Result<()> {
    let logged_in = store.load_token(environment).await?.is_some();
    let pending = store.load_pairing_state(environment).await?;

    println!("Environment: {}", environment);
    println!("Logged in:   {}", if logged_in { "yes" } else { "no" });
    println!("Storage:     {}", store.active_backend().await);
    if let Some(state) = pending {
        println!(
            "Pairing:     request {} pending until {}",
            state.request_id,
            format_local(state.expires_at)
        );
    }
    Ok(())
}

/// Asks how to open the link, then opens a browser or draws a QR code
struct TerminalPresenter;

impl Presenter for TerminalPresenter {
    fn present(&self, link: &PairingLink) -> std::io::Result<()> {
        println!();
        println!("  How would you like to approve this CLI?");
        println!("    [1] Open the link in a browser");
        println!("    [2] Show a QR code to scan");
        print!("  Choice [1]: ");
        std::io::stdout().flush()?;

        let mut choice = String::new();
        std::io::stdin().lock().read_line(&mut choice)?;

        println!();
        if choice.trim() == "2" {
            display_qr_code(&link.url);
        } else if let Err(e) = open::that(&link.url) {
            warn!("Failed to open browser: {}", e);
        }

        println!("  Approve at: {}", link.url);
        if let Some(ref fingerprint) = link.fingerprint {
            println!("  Key fingerprint: {}", fingerprint);
        }
        if let Some(expires_at) = link.expires_at {
            println!("  Link expires at {}", format_local(expires_at));
        }
        println!();
        println!("  Waiting for approval...");
        Ok(())
    }
}

/// Prints the link without prompting
struct AgentPresenter;

impl Presenter for AgentPresenter {
    fn present(&self, link: &PairingLink) -> std::io::Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "Open {} to approve this CLI", link.url)?;
        if let Some(ref fingerprint) = link.fingerprint {
            writeln!(out, "Key fingerprint: {}", fingerprint)?;
        }
        if let Some(expires_at) = link.expires_at {
            writeln!(out, "Expires at {}", expires_at.to_rfc3339())?;
        }
        out.flush()
    }
}

fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// Display a QR code in the terminal
fn display_qr_code(data: &str) {
    use qrcode::QrCode;

    let code = match QrCode::new(data.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to generate QR code: {}", e);
            return;
        }
    };

    // Render as Unicode block characters for terminal display
    let string = code
        .render::<char>()
        .quiet_zone(true)
        .module_dimensions(2, 1)
        .build();

    for line in string.lines() {
        println!("  {}", line);
    }
}
