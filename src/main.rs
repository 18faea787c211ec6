use std::sync::Arc;

use anyhow::{Context, Result};
use dialoguer::{Input, Password};

use portal_client::auth::{CredentialStore, SqliteBackend};
use portal_client::client::PortalClient;
use portal_client::config::{Command, Config};
use portal_client::redirect::LoggingNavigator;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, command) = Config::load()?;

    // Initialize logging with the configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    tracing::debug!(origin = %config.origin, "Portal client starting");

    let backend = SqliteBackend::open(&config.session_file).with_context(|| {
        format!(
            "Failed to open session store at {}",
            config.session_file.display()
        )
    })?;
    let store = CredentialStore::new(Arc::new(backend));

    let client = PortalClient::new(
        &config.origin,
        store,
        Arc::new(LoggingNavigator),
        config.connect_timeout,
        config.request_timeout,
        config.refresh_timeout,
    )?;

    match command {
        Command::Login { email } => login(&client, email).await,
        Command::Whoami => whoami(&client),
        Command::Get { path } => fetch(&client, &path).await,
        Command::Logout => {
            client.logout()?;
            println!("Signed out.");
            Ok(())
        }
    }
}

async fn login(client: &PortalClient, email: Option<String>) -> Result<()> {
    let email: String = match email {
        Some(email) => email,
        None => Input::new()
            .with_prompt("Email")
            .interact_text()
            .context("Failed to read email")?,
    };
    let password: String = Password::new()
        .with_prompt("Password")
        .interact()
        .context("Failed to read password")?;

    let credential = client.login(&email, &password).await?;
    tracing::info!("✅ Signed in as {}", credential.email);
    println!(
        "Signed in as {} <{}> ({:?})",
        credential.display_name, credential.email, credential.role
    );
    Ok(())
}

fn whoami(client: &PortalClient) -> Result<()> {
    match client.current_session() {
        Some(credential) => println!(
            "{} <{}> role={:?} since {}",
            credential.display_name,
            credential.email,
            credential.role,
            credential.logged_in_at.to_rfc3339()
        ),
        None => println!("No active session."),
    }
    Ok(())
}

async fn fetch(client: &PortalClient, path: &str) -> Result<()> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    let response = client.get(&path).await?;
    let body = response.text().await?;
    println!("{body}");
    Ok(())
}
