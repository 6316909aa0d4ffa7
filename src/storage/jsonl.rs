//! JSON lines storage
//!
//! Each result is appended as one line of JSON. Existing files are appended
//! to, so repeated runs accumulate history.

use crate::model::CrawlResult;
use crate::storage::traits::{Storage, StorageResult};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct JsonLinesStorage {
    path: PathBuf,
    writer: BufWriter<File>,
    urls: HashSet<String>,
}

impl JsonLinesStorage {
    /// Opens `path` for appending, creating parent directories as needed
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            urls: HashSet::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for JsonLinesStorage {
    fn save(&mut self, result: &CrawlResult) -> StorageResult<()> {
        serde_json::to_writer(&mut self.writer, result)?;
        self.writer.write_all(b"\n")?;
        self.urls.insert(result.url().to_string());
        Ok(())
    }

    /// Distinct URLs written by this instance
    fn count(&self) -> StorageResult<u64> {
        Ok(self.urls.len() as u64)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "jsonl"
    }
}

impl Drop for JsonLinesStorage {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to flush results file");
        }
    }
}
