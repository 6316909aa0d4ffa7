//! Database schema definitions
//!
//! One row per crawled URL. The full result is kept as JSON next to the
//! columns used for querying.

/// Version stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 1;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS crawl_results (
    url TEXT PRIMARY KEY,
    domain TEXT,
    depth INTEGER NOT NULL,
    status TEXT NOT NULL,
    status_code INTEGER,
    error_kind TEXT,
    error TEXT,
    title TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    elapsed_ms INTEGER NOT NULL DEFAULT 0,
    bytes INTEGER NOT NULL DEFAULT 0,
    crawled_at TEXT NOT NULL,
    record TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_results_domain ON crawl_results(domain);
CREATE INDEX IF NOT EXISTS idx_crawl_results_status ON crawl_results(status);
"#;

/// Initializes the database schema
///
/// Safe to call on an existing database.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
