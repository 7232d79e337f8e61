//! Email allowlist store — SQLite-backed records reachable by short id.
//!
//! SQLite is not async, so every call hops onto the blocking pool with
//! `spawn_blocking` and runs against one shared connection.

use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex};

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;
use viewdeck_protocol::Email;

use crate::migration_runner::run_migrations;

const ID_LEN: usize = 8;
const MAX_ID_ATTEMPTS: usize = 16;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid email address")]
    InvalidEmail,

    #[error("email already registered")]
    DuplicateEmail,

    #[error("email not found")]
    NotFound,

    #[error("no unique id after {MAX_ID_ATTEMPTS} attempts")]
    IdSpaceExhausted,

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store connection lock poisoned")]
    Poisoned,

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Trimmed, lowercased address if it looks like `local@domain.tld`.
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    EMAIL_RE
        .is_match(trimmed)
        .then(|| trimmed.to_lowercase())
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()[..ID_LEN].to_string()
}

fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row_to_email(row: &Row<'_>) -> rusqlite::Result<Email> {
    Ok(Email {
        id: row.get(0)?,
        email: row.get(1)?,
        created_at: row.get(2)?,
        ip_address: row.get(3)?,
        last_viewed_at: row.get(4)?,
    })
}

const SELECT_COLUMNS: &str = "SELECT id, email, created_at, ip_address, last_viewed_at FROM emails";

#[derive(Clone)]
pub struct EmailStore {
    conn: Arc<Mutex<Connection>>,
}

impl EmailStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        info!(
            component = "email_store",
            event = "email_store.open",
            path = %path.display(),
            "Opening email store"
        );
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StoreError> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await?
    }

    /// Add an address to the allowlist under a freshly generated id.
    pub async fn create(&self, raw_email: &str) -> Result<Email, StoreError> {
        let email = normalize_email(raw_email).ok_or(StoreError::InvalidEmail)?;
        self.with_conn(move |conn| insert_email(conn, &email)).await
    }

    /// Every record, newest first.
    pub async fn list(&self) -> Result<Vec<Email>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC"))?;
            let emails = stmt
                .query_map([], row_to_email)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(emails)
        })
        .await
    }

    /// Delete by id. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM emails WHERE id = ?1", params![id])?;
            Ok(removed > 0)
        })
        .await
    }

    /// Stamp a record with the viewer's address and the current time.
    pub async fn record_view(&self, id: &str, ip_address: &str) -> Result<Email, StoreError> {
        let id = id.to_string();
        let ip_address = ip_address.to_string();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE emails SET ip_address = ?1, last_viewed_at = ?2 WHERE id = ?3",
                params![ip_address, timestamp_now(), id],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound);
            }
            find_email(conn, &id)?.ok_or(StoreError::NotFound)
        })
        .await
    }
}

fn find_email(conn: &Connection, id: &str) -> rusqlite::Result<Option<Email>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
        params![id],
        row_to_email,
    )
    .optional()
}

fn id_taken(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM emails WHERE id = ?1", params![id], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
}

fn insert_email(conn: &Connection, email: &str) -> Result<Email, StoreError> {
    let mut id = None;
    for attempt in 1..=MAX_ID_ATTEMPTS {
        let candidate = generate_id();
        if !id_taken(conn, &candidate)? {
            id = Some(candidate);
            break;
        }
        debug!(
            component = "email_store",
            event = "email_store.id_collision",
            attempt = attempt,
            "Generated id already in use, retrying"
        );
    }
    let id = id.ok_or(StoreError::IdSpaceExhausted)?;
    let created_at = timestamp_now();

    match conn.execute(
        "INSERT INTO emails (id, email, created_at) VALUES (?1, ?2, ?3)",
        params![id, email, created_at],
    ) {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            return Err(StoreError::DuplicateEmail);
        }
        Err(err) => return Err(err.into()),
    }

    Ok(Email {
        id,
        email: email.to_string(),
        created_at,
        ip_address: None,
        last_viewed_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_and_validates_addresses() {
        assert_eq!(
            normalize_email("  Alice@Example.COM "),
            Some("alice@example.com".to_string())
        );
        assert_eq!(normalize_email("no-at-sign.com"), None);
        assert_eq!(normalize_email("a@b"), None);
        assert_eq!(normalize_email("a b@c.com"), None);
        assert_eq!(normalize_email(""), None);
    }

    #[tokio::test]
    async fn create_stores_normalized_email_with_short_id() {
        let store = EmailStore::open_in_memory().expect("store");
        let email = store.create(" Viewer@Example.com").await.expect("create");

        assert_eq!(email.email, "viewer@example.com");
        assert_eq!(email.id.len(), ID_LEN);
        assert!(email.ip_address.is_none());
        assert_eq!(store.list().await.expect("list"), vec![email]);
    }

    #[tokio::test]
    async fn create_rejects_invalid_and_duplicate_addresses() {
        let store = EmailStore::open_in_memory().expect("store");
        assert!(matches!(
            store.create("nope").await,
            Err(StoreError::InvalidEmail)
        ));

        store.create("dup@example.com").await.expect("first");
        assert!(matches!(
            store.create("DUP@example.com").await,
            Err(StoreError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let store = EmailStore::open_in_memory().expect("store");
        store.create("first@example.com").await.expect("first");
        store.create("second@example.com").await.expect("second");
        store.create("third@example.com").await.expect("third");

        let emails: Vec<String> = store
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|e| e.email)
            .collect();
        assert_eq!(
            emails,
            vec![
                "third@example.com".to_string(),
                "second@example.com".to_string(),
                "first@example.com".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_went_away() {
        let store = EmailStore::open_in_memory().expect("store");
        let email = store.create("gone@example.com").await.expect("create");

        assert!(store.delete(&email.id).await.expect("delete"));
        assert!(!store.delete(&email.id).await.expect("delete again"));
        assert!(store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn record_view_stamps_ip_and_time() {
        let store = EmailStore::open_in_memory().expect("store");
        let email = store.create("watcher@example.com").await.expect("create");

        let updated = store
            .record_view(&email.id, "203.0.113.9")
            .await
            .expect("record view");
        assert_eq!(updated.ip_address.as_deref(), Some("203.0.113.9"));
        assert!(updated.last_viewed_at.is_some());

        assert!(matches!(
            store.record_view("missing1", "203.0.113.9").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("viewdeck.db");

        let store = EmailStore::open(&path).expect("open");
        store.create("kept@example.com").await.expect("create");
        drop(store);

        let reopened = EmailStore::open(&path).expect("reopen");
        let emails = reopened.list().await.expect("list");
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].email, "kept@example.com");
    }
}
