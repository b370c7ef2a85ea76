use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::InventoryError;

const MIGRATION_INITIAL_SQL: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY NOT NULL,
        username TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        salt TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS shelf_books (
        id TEXT PRIMARY KEY NOT NULL,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        shelf_row INTEGER NOT NULL,
        shelf_column TEXT NOT NULL,
        side TEXT NOT NULL,
        location TEXT NOT NULL,
        position INTEGER NOT NULL,
        source_image TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS catalog_books (
        id TEXT PRIMARY KEY NOT NULL,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        publisher TEXT NOT NULL,
        position INTEGER NOT NULL,
        source_image TEXT NOT NULL,
        owner_id TEXT REFERENCES users(id),
        created_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_shelf_books_placement
        ON shelf_books (shelf_row, shelf_column, side, position);
    CREATE INDEX IF NOT EXISTS idx_catalog_books_owner
        ON catalog_books (owner_id);
    CREATE INDEX IF NOT EXISTS idx_catalog_books_created
        ON catalog_books (created_at);
";

/// Open (or create) the catalog database and bring its schema up to
/// date. Each caller gets its own connection; nothing is shared.
pub fn open_db(path: impl AsRef<Path>) -> Result<Connection, InventoryError> {
    let conn = Connection::open(path.as_ref())?;
    prepare_schema(&conn)?;
    Ok(conn)
}

pub(crate) fn prepare_schema(conn: &Connection) -> Result<(), InventoryError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            id TEXT PRIMARY KEY NOT NULL,
            applied_at INTEGER NOT NULL
        );",
    )?;

    apply_migration(conn, "0000_initial", MIGRATION_INITIAL_SQL)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

fn apply_migration(conn: &Connection, id: &str, sql: &str) -> Result<(), InventoryError> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM schema_migrations WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(());
    }
    log::info!("applying migration {}", id);
    conn.execute_batch(sql)?;
    conn.execute(
        "INSERT INTO schema_migrations (id, applied_at) VALUES (?1, ?2)",
        params![id, chrono::Utc::now().timestamp_millis()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::prepare_schema;
    use rusqlite::Connection;

    #[test]
    fn schema_applies_to_a_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        prepare_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for expected in ["catalog_books", "schema_migrations", "shelf_books", "users"] {
            assert!(tables.iter().any(|t| t == expected), "missing {}", expected);
        }
    }

    #[test]
    fn migrations_are_recorded_once() {
        let conn = Connection::open_in_memory().unwrap();
        prepare_schema(&conn).unwrap();
        prepare_schema(&conn).unwrap();

        let applied: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM schema_migrations WHERE id = '0000_initial'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(applied, 1);
    }
}
