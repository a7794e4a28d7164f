//! SQLite storage implementation

use crate::state::{DomainProgress, DomainStatus, JobId, JobResults, JobSnapshot, JobStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{JobStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite job store
pub struct SqliteJobStore {
    conn: Connection,
}

impl SqliteJobStore {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn load_progress(&self, job: JobId) -> StorageResult<Vec<DomainProgress>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, root, status, pages_fetched, queued, in_flight, products_found,
                    failed_pages, rendered_pages, robots_skipped
             FROM domain_progress WHERE job_id = ?1 ORDER BY rowid",
        )?;

        let rows = stmt.query_map(params![job.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, u32>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, u32>(7)?,
                row.get::<_, u32>(8)?,
                row.get::<_, u32>(9)?,
            ))
        })?;

        let mut progress = Vec::new();
        for row in rows {
            let (domain, root, status, pages_fetched, queued, in_flight, products, failed, rendered, skipped) =
                row?;
            let status = DomainStatus::from_db_string(&status)
                .ok_or_else(|| StorageError::Corrupt(format!("domain status '{}'", status)))?;
            progress.push(DomainProgress {
                domain,
                root,
                status,
                pages_fetched,
                queued: queued.max(0) as usize,
                in_flight,
                products_found: products.max(0) as usize,
                failed_pages: failed,
                rendered_pages: rendered,
                robots_skipped: skipped,
            });
        }

        Ok(progress)
    }
}

fn to_db_time(time: Option<DateTime<Utc>>) -> Option<String> {
    time.map(|t| t.to_rfc3339())
}

fn from_db_time(value: Option<String>) -> StorageResult<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| StorageError::Corrupt(format!("timestamp '{}': {}", s, e)))
        })
        .transpose()
}

fn parse_job_id(s: &str) -> StorageResult<JobId> {
    s.parse()
        .map_err(|e| StorageError::Corrupt(format!("job id '{}': {}", s, e)))
}

impl JobStore for SqliteJobStore {
    fn save_snapshot(&mut self, snapshot: &JobSnapshot) -> StorageResult<()> {
        let job_id = snapshot.id.to_string();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO jobs (id, status, created_at, started_at, finished_at, error, config_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                started_at = excluded.started_at,
                finished_at = excluded.finished_at,
                error = excluded.error,
                config_hash = excluded.config_hash",
            params![
                job_id,
                snapshot.status.as_str(),
                snapshot.created_at.to_rfc3339(),
                to_db_time(snapshot.started_at),
                to_db_time(snapshot.finished_at),
                snapshot.error,
                snapshot.config_hash,
            ],
        )?;

        tx.execute(
            "DELETE FROM domain_progress WHERE job_id = ?1",
            params![job_id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO domain_progress (job_id, domain, root, status, pages_fetched, queued,
                    in_flight, products_found, failed_pages, rendered_pages, robots_skipped)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for d in &snapshot.domains {
                stmt.execute(params![
                    job_id,
                    d.domain,
                    d.root,
                    d.status.as_str(),
                    d.pages_fetched,
                    d.queued as i64,
                    d.in_flight,
                    d.products_found as i64,
                    d.failed_pages,
                    d.rendered_pages,
                    d.robots_skipped,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn save_results(&mut self, job: JobId, results: &JobResults) -> StorageResult<()> {
        let job_id = job.to_string();
        let tx = self.conn.transaction()?;

        let known: Option<String> = tx
            .query_row("SELECT id FROM jobs WHERE id = ?1", params![job_id], |row| {
                row.get(0)
            })
            .optional()?;
        if known.is_none() {
            return Err(StorageError::JobNotFound(job_id));
        }

        tx.execute("DELETE FROM product_urls WHERE job_id = ?1", params![job_id])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO product_urls (job_id, domain, url) VALUES (?1, ?2, ?3)")?;
            for (domain, urls) in results {
                for url in urls {
                    stmt.execute(params![job_id, domain, url])?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn load_snapshot(&self, job: JobId) -> StorageResult<Option<JobSnapshot>> {
        let row = self
            .conn
            .query_row(
                "SELECT status, created_at, started_at, finished_at, error, config_hash
                 FROM jobs WHERE id = ?1",
                params![job.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((status, created_at, started_at, finished_at, error, config_hash)) = row else {
            return Ok(None);
        };

        let status = JobStatus::from_db_string(&status)
            .ok_or_else(|| StorageError::Corrupt(format!("job status '{}'", status)))?;
        let created_at = from_db_time(Some(created_at))?
            .ok_or_else(|| StorageError::Corrupt("missing created_at".to_string()))?;

        Ok(Some(JobSnapshot {
            id: job,
            status,
            created_at,
            started_at: from_db_time(started_at)?,
            finished_at: from_db_time(finished_at)?,
            error,
            config_hash,
            domains: self.load_progress(job)?,
        }))
    }

    fn load_results(&self, job: JobId) -> StorageResult<JobResults> {
        let mut stmt = self
            .conn
            .prepare("SELECT domain, url FROM product_urls WHERE job_id = ?1")?;
        let rows = stmt.query_map(params![job.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut results = JobResults::new();
        for row in rows {
            let (domain, url) = row?;
            results.entry(domain).or_default().insert(url);
        }
        Ok(results)
    }

    fn list_jobs(&self) -> StorageResult<Vec<(JobId, JobStatus)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, status FROM jobs ORDER BY created_at DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut jobs = Vec::new();
        for row in rows {
            let (id, status) = row?;
            let status = JobStatus::from_db_string(&status)
                .ok_or_else(|| StorageError::Corrupt(format!("job status '{}'", status)))?;
            jobs.push((parse_job_id(&id)?, status));
        }
        Ok(jobs)
    }
}
