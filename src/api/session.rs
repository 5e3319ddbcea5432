//! Session renewal endpoints.
//!
//! A thin CRUD flow over the token codec and the refresh token store:
//! refresh rotates the opaque refresh token and mints a new access token,
//! logout revokes the presented refresh token. Primary credential
//! verification (login) lives in the external user service; it opens
//! sessions through [`open_session`].

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::AppState;
use crate::auth::CurrentIdentity;
use crate::db::{Database, Role};
use crate::token::{REFRESH_TOKEN_TTL_SECS, TokenCodec};

use super::error::{ApiError, ResultExt};

/// Access and refresh token pair handed to a client.
#[derive(Debug, Serialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry (Unix seconds)
    pub expires_at: u64,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct IdentityResponse {
    pub username: String,
    pub authorities: Vec<Role>,
}

fn unix_now() -> Result<u64, ApiError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| ApiError::internal("System time error"))?
        .as_secs())
}

/// Mint an access token plus a fresh refresh token record for a user.
///
/// The opaque refresh value is a UUIDv4; the unique constraint on
/// `token_value` makes a collision an insert error rather than a silent
/// overwrite.
pub async fn open_session(
    db: &Database,
    codec: &TokenCodec,
    username: &str,
) -> Result<SessionTokens, ApiError> {
    let user = db
        .users()
        .get_by_username(username)
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| ApiError::not_found("Unknown user"))?;

    let issued = codec.issue(&user.username).map_err(|e| {
        tracing::error!(error = %e, "Failed to issue access token");
        ApiError::internal("Token issue error")
    })?;

    let now = unix_now()?;
    let refresh_value = uuid::Uuid::new_v4().to_string();
    db.refresh_tokens()
        .create(&refresh_value, user.id, now, now + REFRESH_TOKEN_TTL_SECS)
        .await
        .db_err("Failed to persist refresh token")?;

    Ok(SessionTokens {
        access_token: issued.token,
        refresh_token: refresh_value,
        expires_at: issued.expires_at,
    })
}

/// POST /api/session/refresh
///
/// Exchanges a live refresh token for a new access token. The refresh token
/// is rotated: the presented value is deleted and a new one issued, so each
/// value is usable once.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<SessionTokens>, ApiError> {
    let record = state
        .db
        .refresh_tokens()
        .get_by_value(&req.refresh_token)
        .await
        .db_err("Failed to look up refresh token")?
        .ok_or_else(|| ApiError::unauthorized("Unknown refresh token"))?;

    let now = unix_now()?;
    if (record.expires_at as u64) < now {
        // Stale row, remove it while rejecting
        state
            .db
            .refresh_tokens()
            .delete(record.id)
            .await
            .db_err("Failed to delete expired refresh token")?;
        return Err(ApiError::unauthorized("Refresh token expired"));
    }

    let user = state
        .db
        .users()
        .get_by_id(record.user_id)
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| ApiError::unauthorized("Unknown refresh token"))?;

    if !user.active {
        return Err(ApiError::unauthorized("Account deactivated"));
    }

    // The delete arbitrates concurrent replays of the same value: only the
    // caller that actually removed the row may mint a new session.
    let deleted = state
        .db
        .refresh_tokens()
        .delete(record.id)
        .await
        .db_err("Failed to rotate refresh token")?;
    if !deleted {
        return Err(ApiError::unauthorized("Unknown refresh token"));
    }

    let tokens = open_session(&state.db, &state.codec, &user.username).await?;
    tracing::debug!(user = %user.username, "Session refreshed");
    Ok(Json(tokens))
}

/// POST /api/session/logout
///
/// Revokes the presented refresh token. Requires an authenticated caller,
/// and only the owner of the token can revoke it.
pub async fn logout(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(req): Json<RefreshRequest>,
) -> Result<StatusCode, ApiError> {
    let caller = state
        .db
        .users()
        .get_by_username(&identity.principal.username)
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| ApiError::unauthorized("Unknown user"))?;

    let record = state
        .db
        .refresh_tokens()
        .get_by_value(&req.refresh_token)
        .await
        .db_err("Failed to look up refresh token")?;

    // A foreign token reads the same as a missing one
    match record {
        Some(record) if record.user_id == caller.id => {
            state
                .db
                .refresh_tokens()
                .delete(record.id)
                .await
                .db_err("Failed to delete refresh token")?;
            tracing::debug!(user = %caller.username, "Session closed");
            Ok(StatusCode::NO_CONTENT)
        }
        _ => Err(ApiError::not_found("Unknown refresh token")),
    }
}

/// GET /api/session/me
///
/// Returns the identity the gate installed for this request. Serves as the
/// downstream enforcement point for unauthenticated access.
pub async fn me(CurrentIdentity(identity): CurrentIdentity) -> Json<IdentityResponse> {
    Json(IdentityResponse {
        username: identity.principal.username,
        authorities: identity.principal.authorities.into_iter().collect(),
    })
}
