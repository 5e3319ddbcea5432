//! Request authentication gate.
//!
//! Runs as middleware on every route. Extracts the bearer token, validates
//! it, resolves the principal and installs an [`AuthenticatedIdentity`] into
//! the request extensions for downstream handlers.
//!
//! The gate is fail-open to the chain: it never aborts request handling
//! itself. Its job is to avoid installing a false identity and, for clearly
//! bad tokens, to mark the response with an advisory 401. Refusing
//! unauthenticated access is the downstream handlers' responsibility (see
//! [`CurrentIdentity`]).

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::directory::Principal;
use crate::token::TokenError;

/// Expected `Authorization` scheme prefix. Case-sensitive, single space.
const BEARER_PREFIX: &str = "Bearer ";

/// Extract the bearer token from the Authorization header.
/// A missing header or one without the exact prefix is treated as no token.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix(BEARER_PREFIX).map(str::to_string)
}

/// Request-scoped details captured at authentication time.
#[derive(Debug, Clone)]
pub struct RequestDetails {
    /// Path of the request that was authenticated
    pub path: String,
}

/// Per-request authenticated identity.
///
/// Installed at most once per request into the request extensions, read by
/// downstream authorization logic and discarded with the request. Never
/// shared across requests.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    pub principal: Principal,
    pub details: RequestDetails,
}

/// Authentication middleware applied to every route.
///
/// Every path through this function calls `next.run` exactly once. Expired
/// and invalid tokens force a 401 onto the response the chain produced; an
/// unresolvable principal or a subject mismatch leaves the response
/// untouched and simply installs no identity.
pub async fn authentication_gate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(req.headers()) else {
        // Anonymous request, nothing to do
        return next.run(req).await;
    };

    let path = req.uri().path().to_string();

    let subject = match state.codec.decode(&token) {
        Ok(subject) => subject,
        Err(TokenError::Expired {
            subject,
            expires_at,
        }) => {
            tracing::warn!(subject = %subject, expires_at, "Bearer token expired");
            let mut response = next.run(req).await;
            *response.status_mut() = StatusCode::UNAUTHORIZED;
            return response;
        }
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Rejected bearer token");
            let mut response = next.run(req).await;
            *response.status_mut() = StatusCode::UNAUTHORIZED;
            return response;
        }
    };

    // A request is authenticated at most once per pipeline traversal; if an
    // identity is already installed, skip re-authentication.
    if req.extensions().get::<AuthenticatedIdentity>().is_none() {
        match state.resolver.load_by_username(&subject).await {
            Ok(principal) => {
                if state.codec.validate(&token, &principal) {
                    tracing::debug!(user = %principal.username, "Authenticated");
                    req.extensions_mut().insert(AuthenticatedIdentity {
                        principal,
                        details: RequestDetails { path },
                    });
                } else {
                    tracing::warn!(user = %principal.username, path = %path, "Token failed principal validation");
                }
            }
            Err(e) => {
                // Deliberately not a 401: an unresolvable subject just means
                // no identity is present downstream.
                tracing::error!(subject = %subject, error = %e, "Failed to resolve principal");
            }
        }
    }

    next.run(req).await
}

/// Extractor for handlers that require an authenticated caller.
/// Rejects with a JSON 401 when the gate installed no identity.
pub struct CurrentIdentity(pub AuthenticatedIdentity);

/// Rejection for [`CurrentIdentity`].
#[derive(Debug)]
pub struct NotAuthenticated;

impl IntoResponse for NotAuthenticated {
    fn into_response(self) -> Response {
        use axum::Json;
        use serde::Serialize;

        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Not authenticated",
            }),
        )
            .into_response()
    }
}

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = NotAuthenticated;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedIdentity>()
            .cloned()
            .map(CurrentIdentity)
            .ok_or(NotAuthenticated)
    }
}
