//! File-based result writers

use crate::output::traits::{OutputResult, ResultWriter};
use crate::state::{JobId, JobResults, JobSnapshot};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// File stem for one domain of a job: `{job}_{domain}` with `.` and `:` as `_`
pub fn domain_file_stem(job: JobId, domain: &str) -> String {
    let domain: String = domain
        .chars()
        .map(|c| match c {
            '.' | ':' => '_',
            c => c,
        })
        .collect();
    format!("{}_{}", job, domain)
}

fn ensure_dir(directory: &Path) -> OutputResult<()> {
    fs::create_dir_all(directory)?;
    Ok(())
}

/// One CSV file per (job, domain) with a single `product_url` column
#[derive(Debug, Clone)]
pub struct CsvResultWriter {
    directory: PathBuf,
}

impl CsvResultWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path_for(&self, job: JobId, domain: &str) -> PathBuf {
        self.directory
            .join(format!("{}.csv", domain_file_stem(job, domain)))
    }
}

impl ResultWriter for CsvResultWriter {
    fn write_domain(&self, job: JobId, domain: &str, urls: &BTreeSet<String>) -> OutputResult<()> {
        ensure_dir(&self.directory)?;
        let path = self.path_for(job, domain);

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["product_url"])?;
        for url in urls {
            writer.write_record([url.as_str()])?;
        }
        writer.flush()?;

        tracing::debug!(path = %path.display(), rows = urls.len(), "wrote CSV results");
        Ok(())
    }
}

#[derive(Serialize)]
struct JobReport<'a> {
    job: &'a JobSnapshot,
    results: &'a JobResults,
}

/// One JSON document per job: the snapshot plus the domain → URLs mapping
#[derive(Debug, Clone)]
pub struct JsonResultWriter {
    directory: PathBuf,
}

impl JsonResultWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path_for(&self, job: JobId) -> PathBuf {
        self.directory.join(format!("{}.json", job))
    }
}

impl ResultWriter for JsonResultWriter {
    /// Writes `{job}_{domain}.json`, a sorted array of URLs
    fn write_domain(&self, job: JobId, domain: &str, urls: &BTreeSet<String>) -> OutputResult<()> {
        ensure_dir(&self.directory)?;
        let path = self
            .directory
            .join(format!("{}.json", domain_file_stem(job, domain)));
        let file = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(file, urls)?;
        Ok(())
    }

    fn write_job(&self, snapshot: &JobSnapshot, results: &JobResults) -> OutputResult<()> {
        ensure_dir(&self.directory)?;
        let path = self.path_for(snapshot.id);
        let file = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(file, &JobReport { job: snapshot, results })?;

        tracing::debug!(path = %path.display(), domains = results.len(), "wrote JSON results");
        Ok(())
    }
}
