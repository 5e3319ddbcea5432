//! Refresh token persistence.
//!
//! Only refresh tokens are stored in the database; access tokens are
//! stateless bearer tokens and never touch this table. The `token_value`
//! column carries a UNIQUE constraint, so two rows with the same value can
//! never coexist regardless of how many refresh attempts race.

use sqlx::sqlite::SqlitePool;

/// A persisted refresh token record.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: i64,
    pub token_value: String,
    pub user_id: i64,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Keyed persistence surface for refresh tokens. No validation logic lives
/// here; callers decide what an expired or missing record means.
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

type RefreshTokenRow = (i64, String, i64, i64, i64);

fn row_to_token((id, token_value, user_id, issued_at, expires_at): RefreshTokenRow) -> RefreshToken {
    RefreshToken {
        id,
        token_value,
        user_id,
        issued_at,
        expires_at,
    }
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a new refresh token record. Fails on a duplicate
    /// `token_value` via the unique constraint.
    pub async fn create(
        &self,
        token_value: &str,
        user_id: i64,
        issued_at: u64,
        expires_at: u64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (token_value, user_id, issued_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(token_value)
        .bind(user_id)
        .bind(issued_at as i64)
        .bind(expires_at as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Look up a refresh token by its opaque value. Exact, case-sensitive
    /// match; a missing value is `None`, not an error.
    pub async fn get_by_value(&self, value: &str) -> Result<Option<RefreshToken>, sqlx::Error> {
        let row: Option<RefreshTokenRow> = sqlx::query_as(
            "SELECT id, token_value, user_id, issued_at, expires_at FROM refresh_tokens WHERE token_value = ?",
        )
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_token))
    }

    /// Delete a refresh token by ID (revoke). Returns whether a row existed.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a refresh token by its opaque value.
    pub async fn delete_by_value(&self, value: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_value = ?")
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all expired refresh tokens.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE expires_at < CAST(strftime('%s', 'now') AS INTEGER)",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// List all live refresh tokens for a user, newest first.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<RefreshToken>, sqlx::Error> {
        let rows: Vec<RefreshTokenRow> = sqlx::query_as(
            "SELECT id, token_value, user_id, issued_at, expires_at FROM refresh_tokens \
             WHERE user_id = ? AND expires_at >= CAST(strftime('%s', 'now') AS INTEGER) \
             ORDER BY issued_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_token).collect())
    }

    /// Delete all refresh tokens for a user (logout everywhere).
    pub async fn delete_all_by_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
