//! Shared fixtures for the integration tests: a migrated in-memory database
//! and a few seeded members and books.

#![allow(dead_code)]

use api_lib::adapters::DbAdapter;
use chrono::NaiveDate;
use library_core::domain::{Book, BookDraft, Member, MemberDraft, Role};
use library_core::ports::LibraryStore;
use library_core::Circulation;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::Arc;
use std::time::Duration;

/// A single connection keeps every query on the same in-memory database.
pub async fn test_db() -> Arc<DbAdapter> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    let db = DbAdapter::new(pool);
    db.run_migrations().await.expect("migrations apply");
    Arc::new(db)
}

/// A database file shared by `connections` pooled connections, so
/// concurrent callers really contend for SQLite's write lock.
pub async fn file_db(dir: &tempfile::TempDir, connections: u32) -> Arc<DbAdapter> {
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("library.db"))
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(30));
    let pool = SqlitePoolOptions::new()
        .max_connections(connections)
        .connect_with(options)
        .await
        .expect("file database");
    let db = DbAdapter::new(pool);
    db.run_migrations().await.expect("migrations apply");
    Arc::new(db)
}

pub fn circulation(db: &Arc<DbAdapter>) -> Circulation {
    Circulation::new(db.clone(), db.clone(), db.clone())
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub async fn add_member(db: &DbAdapter, first_name: &str, mob_no: &str, role: Role) -> Member {
    let draft = MemberDraft {
        first_name: first_name.to_string(),
        last_name: "Tester".to_string(),
        address: "1 Library Lane".to_string(),
        mob_no: mob_no.to_string(),
        email: format!("{}@example.com", first_name.to_lowercase()),
        role,
    };
    db.create_member(&draft, "not-a-real-hash")
        .await
        .expect("member created")
}

pub async fn add_book(db: &DbAdapter, title: &str, total_stock: i64) -> Book {
    let draft = BookDraft {
        title: title.to_string(),
        author: "Some Author".to_string(),
        category: "Fiction".to_string(),
        publisher: "Press".to_string(),
        year: 1999,
        edition: "1st".to_string(),
        total_stock,
    };
    db.create_book(&draft).await.expect("book created")
}
