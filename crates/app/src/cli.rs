//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Exercises a Tollgate session against a live backend.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
pub struct Cli {
    /// Settings file (TOML, JSON or YAML).
    #[arg(long, short, global = true, env = "TOLLGATE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and persist the session.
    Login {
        /// Username or email.
        identifier: String,
        /// Password; read from the environment so it stays out of shell history.
        #[arg(long, env = "TOLLGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show the persisted session.
    Status,
    /// GET a path through the authenticated pipeline and print the JSON.
    Get {
        /// Path relative to the base URL.
        path: String,
    },
    /// End the session.
    Logout,
}
