pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod directory;
pub mod token;

use api::create_api_router;
use auth::authentication_gate;
use axum::{Router, middleware};
use db::Database;
use directory::PrincipalResolver;
use std::net::SocketAddr;
use std::sync::Arc;
use token::TokenCodec;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub token_secret: Vec<u8>,
    /// Access token expiry horizon in seconds
    pub access_token_ttl_secs: u64,
}

/// Shared state handed to the gate and the API handlers.
/// Everything in here is immutable per request; all mutable authentication
/// state lives in request extensions.
#[derive(Clone)]
pub struct AppState {
    pub codec: Arc<TokenCodec>,
    pub db: Database,
    pub resolver: PrincipalResolver,
}

/// Create the application router with the given configuration.
///
/// The authentication gate wraps every route, so any handler can consume
/// the installed identity via `auth::CurrentIdentity`.
pub fn create_app(config: &ServerConfig) -> Router {
    let codec = Arc::new(TokenCodec::with_ttl(
        &config.token_secret,
        config.access_token_ttl_secs,
    ));
    let state = AppState {
        codec,
        db: config.db.clone(),
        resolver: PrincipalResolver::new(config.db.clone()),
    };

    let api_router = create_api_router(state.clone());

    Router::new()
        .nest("/api", api_router)
        .layer(middleware::from_fn_with_state(state, authentication_gate))
}

/// Run cleanup tasks and spawn the background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    axum::serve(listener, app).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> (tokio::task::JoinHandle<()>, SocketAddr) {
    init_cleanup(&config.db).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    let local_addr = listener.local_addr().expect("Failed to get local address");

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    (handle, local_addr)
}
