//! Principal resolution against the user directory.

use std::collections::BTreeSet;

use crate::db::Database;

pub use crate::db::Role;

/// Resolved identity and authority set for one request.
///
/// Derived read-only from the directory; the authentication pipeline never
/// mutates directory records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub authorities: BTreeSet<Role>,
}

/// Read-only lookup of principals by username.
#[derive(Clone)]
pub struct PrincipalResolver {
    db: Database,
}

impl PrincipalResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Map a username to a principal. Unknown and deactivated users both
    /// resolve as `UnknownUser`; the directory only serves live accounts.
    pub async fn load_by_username(&self, username: &str) -> Result<Principal, DirectoryError> {
        let user = self
            .db
            .users()
            .get_by_username(username)
            .await
            .map_err(DirectoryError::Database)?
            .ok_or_else(|| DirectoryError::UnknownUser(username.to_string()))?;

        if !user.active {
            return Err(DirectoryError::UnknownUser(username.to_string()));
        }

        Ok(Principal {
            username: user.username,
            authorities: user.roles,
        })
    }
}

/// Errors from the directory lookup path.
#[derive(Debug)]
pub enum DirectoryError {
    /// No live user with this username
    UnknownUser(String),
    /// The lookup itself failed
    Database(sqlx::Error),
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::UnknownUser(username) => write!(f, "Unknown user: {}", username),
            DirectoryError::Database(e) => write!(f, "Directory lookup failed: {}", e),
        }
    }
}

impl std::error::Error for DirectoryError {}
