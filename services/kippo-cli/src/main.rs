//! Kippo command-line client
//!
//! Talks to the Kippo requirements API through the authenticated gateway:
//! 1. Loads configuration (file + env overlay)
//! 2. Opens the on-disk credential store
//! 3. Runs one command, refreshing the access token transparently when it expires

mod config;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use common::Secret;
use kippo_auth::FileStore;
use kippo_gateway::{
    Gateway, GatewayConfig, LogNavigator, OutboundRequest, ReqwestTransport, ResponseBody,
    fetch_all_pages,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Command-line client for the Kippo requirements API
#[derive(Parser, Debug)]
#[command(name = "kippo")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (falls back to CONFIG_PATH, then kippo.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Sign in; the password is read from KIPPO_PASSWORD
    Login { username: String },
    /// Forget stored credentials
    Logout,
    /// Show who is signed in
    Whoami,
    /// GET an API path and print the decoded body
    Get { path: String },
    /// List every project across all pages
    Projects,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr as JSON so stdout stays clean for command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        url_prefix = %config.api.url_prefix,
        storage = %config.storage.path.display(),
        "configuration loaded"
    );

    let store = FileStore::open(config.storage.path.clone())
        .await
        .with_context(|| format!("failed to open {}", config.storage.path.display()))?;
    let transport = ReqwestTransport::new(
        Duration::from_secs(config.api.timeout_secs),
        config.origin_url()?,
    )?;
    let gateway = Gateway::new(
        GatewayConfig {
            endpoint: config.endpoint()?,
            login_route: config.api.login_route.clone(),
        },
        Arc::new(transport),
        Arc::new(store),
        Arc::new(LogNavigator),
    )?;

    run(&gateway, cli.command).await
}

async fn run(gateway: &Gateway, command: Command) -> Result<()> {
    match command {
        Command::Login { username } => {
            if gateway.take_session_expired_notice().await? {
                eprintln!("Your session expired. Please sign in again.");
            }
            let password = std::env::var("KIPPO_PASSWORD")
                .map(Secret::new)
                .context("KIPPO_PASSWORD must be set")?;
            let user = gateway.login(&username, &password).await?;
            println!("signed in as {}", user.username);
        }
        Command::Logout => {
            gateway.logout().await?;
            println!("signed out");
        }
        Command::Whoami => match gateway.bootstrap().await {
            Some(user) => println!(
                "{} (token: {}, session: {})",
                user.username,
                if user.has_token { "yes" } else { "no" },
                if user.session_auth { "yes" } else { "no" },
            ),
            None => println!("not signed in"),
        },
        Command::Get { path } => {
            let response = gateway.execute(OutboundRequest::get(path)).await?;
            print_body(&response.data)?;
            if !response.status.is_success() {
                bail!("request failed with status {}", response.status);
            }
        }
        Command::Projects => {
            let projects: Vec<serde_json::Value> =
                fetch_all_pages(gateway, "/api/projects/").await?;
            for project in &projects {
                println!("{project}");
            }
            info!(count = projects.len(), "listed projects");
        }
    }
    Ok(())
}

fn print_body(body: &ResponseBody) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    match body {
        ResponseBody::Json(value) => writeln!(stdout, "{}", serde_json::to_string_pretty(value)?)?,
        ResponseBody::Text(text) => writeln!(stdout, "{text}")?,
        ResponseBody::Binary(bytes) => stdout.write_all(bytes)?,
    }
    Ok(())
}
