use sqlx::sqlite::SqlitePool;
use std::collections::BTreeSet;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// Granted authority in the fleet backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Driver,
    Dispatcher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Driver => "driver",
            Role::Dispatcher => "dispatcher",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "driver" => Some(Role::Driver),
            "dispatcher" => Some(Role::Dispatcher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Serialize a role set as a comma-separated column value.
fn roles_to_column(roles: &BTreeSet<Role>) -> String {
    roles
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a comma-separated role column. Unknown identifiers are dropped.
fn roles_from_column(s: &str) -> BTreeSet<Role> {
    s.split(',').filter_map(Role::from_str).collect()
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub roles: BTreeSet<Role>,
    pub active: bool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    roles: String,
    active: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            roles: roles_from_column(&row.roles),
            active: row.active != 0,
        }
    }
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new active user with the given roles. Returns the user ID.
    pub async fn create(&self, username: &str, roles: &BTreeSet<Role>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO users (username, roles, active) VALUES (?, ?, 1)")
            .bind(username)
            .bind(roles_to_column(roles))
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by username. Exact, case-sensitive match.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, username, roles, active FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, username, roles, active FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Replace the role set for a user.
    pub async fn set_roles(&self, id: i64, roles: &BTreeSet<Role>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET roles = ? WHERE id = ?")
            .bind(roles_to_column(roles))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deactivate a user. Inactive users no longer resolve in the directory.
    pub async fn deactivate(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET active = 0 WHERE id = ? AND active = 1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user by ID.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_column_round_trip() {
        let roles = BTreeSet::from([Role::Driver, Role::Admin]);
        let column = roles_to_column(&roles);
        assert_eq!(column, "driver,admin");
        assert_eq!(roles_from_column(&column), roles);
    }

    #[test]
    fn test_unknown_role_identifiers_dropped() {
        let roles = roles_from_column("driver,superuser");
        assert_eq!(roles, BTreeSet::from([Role::Driver]));
    }
}
