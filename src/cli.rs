//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::token::ACCESS_TOKEN_TTL_SECS;
use clap::Parser;
use tracing::{error, info};

const MIN_TOKEN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "Fleetgate", about = "Fleet backend authentication service")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "fleetgate.db")]
    pub database: String,

    /// Path to file containing the token signing secret. Prefer using the TOKEN_SECRET env var instead
    #[arg(long)]
    pub token_secret_file: Option<String>,

    /// Access token expiry horizon in seconds
    #[arg(long, default_value_t = ACCESS_TOKEN_TTL_SECS)]
    pub access_token_ttl_secs: u64,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the token signing secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_token_secret(token_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("TOKEN_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("TOKEN_SECRET") };
        secret
    } else if let Some(path) = token_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read token secret file");
                return None;
            }
        }
    } else {
        error!(
            "Token secret is required. Set TOKEN_SECRET environment variable (recommended) or use --token-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_TOKEN_SECRET_LENGTH {
        error!(
            "Token secret is shorter than {} characters. Use a longer secret",
            MIN_TOKEN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(db: Database, token_secret: String, access_token_ttl_secs: u64) -> ServerConfig {
    ServerConfig {
        db,
        token_secret: token_secret.into_bytes(),
        access_token_ttl_secs,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
