//! Tollgate operator CLI.
//!
//! Wires the client stack against the file-backed session and runs one
//! command. Logging honours `RUST_LOG`.

mod cli;

use clap::Parser;
use tollgate_domain::SignInCredentials;
use tollgate_infrastructure::{Client, build_client, load_settings};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    tracing::debug!(base_url = %settings.base_url, "settings loaded");

    let client = build_client(settings)?;
    client.session.restore().await?;

    run(&client, cli.command).await
}

async fn run(client: &Client, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Login {
            identifier,
            password,
        } => {
            let user = client
                .session
                .sign_in(SignInCredentials::new(identifier, password))
                .await?;
            match user {
                Some(user) => println!("Signed in as {}", user.display_name()),
                None => println!("Signed in"),
            }
        }
        Command::Status => {
            let tokens = client.tokens();
            println!("State: {}", tokens.state());
            println!("Token: {}", tokens.status().display_message());
            if let Some(user) = tokens.current_user() {
                println!("User:  {}", user.display_name());
            }
        }
        Command::Get { path } => {
            let body: serde_json::Value = client.api().get(&path).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Logout => {
            client.session.sign_out().await?;
            println!("Signed out");
        }
    }
    Ok(())
}
