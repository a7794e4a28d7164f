//! Database schema for the job store

use rusqlite::Connection;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per submitted job
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT,
    error TEXT,
    config_hash TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

-- Last reported progress of every domain of a job
CREATE TABLE IF NOT EXISTS domain_progress (
    job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    domain TEXT NOT NULL,
    root TEXT NOT NULL,
    status TEXT NOT NULL,
    pages_fetched INTEGER NOT NULL DEFAULT 0,
    queued INTEGER NOT NULL DEFAULT 0,
    in_flight INTEGER NOT NULL DEFAULT 0,
    products_found INTEGER NOT NULL DEFAULT 0,
    failed_pages INTEGER NOT NULL DEFAULT 0,
    rendered_pages INTEGER NOT NULL DEFAULT 0,
    robots_skipped INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (job_id, domain)
);

-- Accepted product URLs
CREATE TABLE IF NOT EXISTS product_urls (
    job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    domain TEXT NOT NULL,
    url TEXT NOT NULL,
    PRIMARY KEY (job_id, domain, url)
);

CREATE INDEX IF NOT EXISTS idx_product_urls_job ON product_urls(job_id);
"#;

/// Creates all tables and indexes if they do not exist yet
pub fn initialize_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
