//! `viewdeck init` — bootstrap a fresh machine.
//!
//! Creates the data dir structure, runs migrations, and prints next steps.

use std::path::Path;

use crate::migration_runner;
use crate::paths;

pub fn run(data_dir: &Path) -> anyhow::Result<()> {
    println!();

    paths::ensure_dirs()?;
    println!("  Created {}/", data_dir.display());

    let db_path = paths::db_path()?;
    let mut conn = rusqlite::Connection::open(&db_path)?;
    let applied = migration_runner::run_migrations(&mut conn)?;
    if applied == 0 {
        println!("  Database already up to date at {}", db_path.display());
    } else {
        println!(
            "  Database initialized at {} ({} migration(s) applied)",
            db_path.display(),
            applied
        );
    }

    let allowed: i64 = conn.query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))?;
    println!("  {} email(s) on the allowlist", allowed);

    println!();
    println!("  Next steps:");
    println!("    1. Start the server:        viewdeck");
    println!("    2. Add an allowed viewer:   POST /api/emails {{\"email\": \"...\"}}");
    println!("    3. Watch presence:          viewdeck-viewer --stream <id> --user <id> --email <addr>");
    println!();

    Ok(())
}
