//! HTTP API routes.

mod error;
mod session;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub use error::{ApiError, ResultExt};
pub use session::{SessionTokens, open_session};

/// Create the API router. The authentication gate is layered on top of the
/// whole app in `create_app`, so these handlers only consume the identity it
/// installs.
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .route("/session/refresh", post(session::refresh))
        .route("/session/logout", post(session::logout))
        .route("/session/me", get(session::me))
        .with_state(state)
}
