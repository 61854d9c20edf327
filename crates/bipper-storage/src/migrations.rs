use rusqlite_migration::{Migrations, M};

/// Metadata schema. Tracked through SQLite's `user_version` pragma.
///
/// Migration 1 is the table layout earlier installations created without
/// versioning, hence `IF NOT EXISTS`: an existing database adopts it as-is.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "CREATE TABLE IF NOT EXISTS blobs (
    passphrase_hash BLOB NOT NULL PRIMARY KEY,
    filename TEXT NOT NULL,
    content_nonce BLOB NOT NULL,
    filename_nonce BLOB NOT NULL
);",
        ),
        M::up(
            "CREATE TABLE pending_uploads (
    address TEXT NOT NULL PRIMARY KEY,
    staged_at INTEGER NOT NULL
);",
        ),
    ])
}
