//! Lightweight migration runner for rusqlite.
//!
//! Migrations are numbered SQL files under `migrations/`, compiled into the
//! binary. Applied versions are tracked in `schema_versions`, and pending ones
//! run in order at startup, each inside its own transaction.

use std::collections::HashSet;

use rusqlite::{params, Connection};
use tracing::info;

const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        1,
        "001_emails",
        include_str!("../../../migrations/001_emails.sql"),
    ),
    (
        2,
        "002_email_views",
        include_str!("../../../migrations/002_email_views.sql"),
    ),
];

/// Run all pending migrations against the given connection. Returns how many
/// were applied.
///
/// Call this before any other database operations.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<usize> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )",
    )?;

    let applied: HashSet<i64> = conn
        .prepare("SELECT version FROM schema_versions")?
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    let mut pending = 0;
    for (version, name, sql) in MIGRATIONS {
        if applied.contains(version) {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_versions (version, name) VALUES (?1, ?2)",
            params![version, name],
        )?;
        tx.commit()?;

        info!(
            component = "migrations",
            event = "migration.applied",
            version = version,
            name = %name,
            "Applied migration"
        );
        pending += 1;
    }

    let total = MIGRATIONS.len();
    info!(
        component = "migrations",
        event = "migrations.complete",
        total = total,
        applied = pending,
        skipped = total - pending,
        "Migration check complete"
    );

    Ok(pending)
}
