//! User accounts for the multi-tenant catalog variant. Passwords are
//! stored as salted SHA-256 digests; verification failures and unknown
//! usernames are indistinguishable to the caller.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{InventoryError, ValidationError};
use crate::models::User;

/// Create an account. A duplicate username surfaces as the underlying
/// unique-constraint storage error.
pub fn register(
    conn: &Connection,
    username: &str,
    password: &str,
) -> Result<User, InventoryError> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(ValidationError::BadFormat.into());
    }
    let id = Uuid::new_v4().to_string();
    let salt = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users (id, username, password_hash, salt, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            username,
            hash_password(&salt, password),
            salt,
            Utc::now().timestamp_millis()
        ],
    )?;
    log::info!("registered user {}", username);
    Ok(User {
        id,
        username: username.to_string(),
    })
}

/// Check credentials; `None` for unknown username or wrong password.
pub fn verify(
    conn: &Connection,
    username: &str,
    password: &str,
) -> Result<Option<User>, InventoryError> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT id, password_hash, salt FROM users WHERE username = ?1",
            params![username.trim()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    Ok(row.and_then(|(id, stored_hash, salt)| {
        if hash_password(&salt, password) == stored_hash {
            Some(User {
                id,
                username: username.trim().to_string(),
            })
        } else {
            None
        }
    }))
}

/// Look up a user by name, e.g. to resolve a CLI `--username` flag to
/// an owner id.
pub fn find_by_username(conn: &Connection, username: &str) -> Result<Option<User>, InventoryError> {
    let row = conn
        .query_row(
            "SELECT id, username FROM users WHERE username = ?1",
            params![username.trim()],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::{find_by_username, register, verify};
    use crate::db;
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::prepare_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn register_then_verify_round_trips() {
        let conn = test_conn();
        let user = register(&conn, "mara", "hunter2").unwrap();
        let verified = verify(&conn, "mara", "hunter2").unwrap().unwrap();
        assert_eq!(verified.id, user.id);
    }

    #[test]
    fn wrong_password_and_unknown_user_both_fail_closed() {
        let conn = test_conn();
        register(&conn, "mara", "hunter2").unwrap();
        assert!(verify(&conn, "mara", "wrong").unwrap().is_none());
        assert!(verify(&conn, "nobody", "hunter2").unwrap().is_none());
    }

    #[test]
    fn duplicate_usernames_are_rejected() {
        let conn = test_conn();
        register(&conn, "mara", "one").unwrap();
        assert!(register(&conn, "mara", "two").is_err());
    }

    #[test]
    fn salts_differ_between_users_with_the_same_password() {
        let conn = test_conn();
        register(&conn, "first", "password").unwrap();
        register(&conn, "second", "password").unwrap();
        let hashes: Vec<String> = conn
            .prepare("SELECT password_hash FROM users")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_ne!(hashes[0], hashes[1]);
    }

    #[test]
    fn find_by_username_resolves_registered_users() {
        let conn = test_conn();
        let user = register(&conn, "mara", "hunter2").unwrap();
        let found = find_by_username(&conn, "mara").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(find_by_username(&conn, "ghost").unwrap().is_none());
    }
}
