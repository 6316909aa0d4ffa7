//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::CrawlResult;
use crate::state::CrawlStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Loads the stored result for `url`
    pub fn get(&self, url: &str) -> StorageResult<Option<CrawlResult>> {
        let record: Option<String> = self
            .conn
            .query_row(
                "SELECT record FROM crawl_results WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;

        match record {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Number of stored results per status
    pub fn status_counts(&self) -> StorageResult<BTreeMap<CrawlStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM crawl_results GROUP BY status")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = CrawlStatus::from_db_string(&status) {
                counts.insert(status, count.max(0) as u64);
            }
        }
        Ok(counts)
    }

    /// Distinct domains with at least one stored result, sorted
    pub fn domains(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT domain FROM crawl_results WHERE domain IS NOT NULL ORDER BY domain",
        )?;
        let domains = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(domains)
    }
}

impl Storage for SqliteStorage {
    fn save(&mut self, result: &CrawlResult) -> StorageResult<()> {
        let record = serde_json::to_string(result)?;
        let title = result.content.as_ref().and_then(|c| c.title.as_deref());

        self.conn.execute(
            "INSERT OR REPLACE INTO crawl_results
             (url, domain, depth, status, status_code, error_kind, error, title,
              retry_count, elapsed_ms, bytes, crawled_at, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                result.url().as_str(),
                result.request.domain(),
                result.request.depth,
                result.status.as_str(),
                result.status_code,
                result.error_kind,
                result.error,
                title,
                result.retry_count,
                i64::try_from(result.elapsed_ms).unwrap_or(i64::MAX),
                i64::try_from(result.bytes).unwrap_or(i64::MAX),
                result.crawled_at.to_rfc3339(),
                record,
            ],
        )?;
        Ok(())
    }

    fn count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM crawl_results", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn flush(&mut self) -> StorageResult<()> {
        // Every statement autocommits; fold the WAL back into the main file
        self.conn
            .query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))
            .optional()?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

/// Initializes a new database at the specified path
///
/// If the database already exists, it will be opened and the schema will be
/// verified.
pub fn init_database(path: &Path) -> StorageResult<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    initialize_schema(&conn)?;
    Ok(conn)
}
