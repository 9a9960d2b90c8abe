//! CSV-backed dataset store.
//!
//! The dataset file is the only source of truth for what has been scraped.
//! Every write is a whole-file rewrite through a temp file + rename, so the
//! file on disk is always either the previous dataset or the new one.

use crate::models::{DatasetSummary, Record};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{error, info, warn};

const DATE_FORMAT: &str = "%Y/%m/%d";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub struct DatasetStore {
    path: PathBuf,
    records: Vec<Record>,
}

impl DatasetStore {
    /// Open the store at `path` and load whatever is there.
    ///
    /// The loaded rows are sorted newest-first and deduplicated by date, so a
    /// hand-edited or legacy file still yields one record per date.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let loaded = load(&path);
        let count = loaded.len();
        let records = sort_and_dedup(loaded);
        if records.len() < count {
            warn!(
                "Dropped {} duplicate-date row(s) while loading {:?}",
                count - records.len(),
                path
            );
        }
        Self { path, records }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Newest date in the dataset (`YYYY/MM/DD`).
    pub fn latest_date(&self) -> Option<String> {
        let dates = self.parsed_dates()?;
        dates.iter().max().map(|d| d.format(DATE_FORMAT).to_string())
    }

    pub fn oldest_date(&self) -> Option<String> {
        let dates = self.parsed_dates()?;
        dates.iter().min().map(|d| d.format(DATE_FORMAT).to_string())
    }

    pub fn summary(&self) -> DatasetSummary {
        let latest_date = self.latest_date();
        let oldest_date = self.oldest_date();
        let date_range = match (&oldest_date, &latest_date) {
            (Some(oldest), Some(latest)) => Some(format!("{} to {}", oldest, latest)),
            _ => None,
        };

        DatasetSummary {
            total_records: self.records.len(),
            latest_date,
            oldest_date,
            date_range,
        }
    }

    /// All dates as calendar dates; `None` if empty or any date is unparsable.
    fn parsed_dates(&self) -> Option<Vec<NaiveDate>> {
        if self.records.is_empty() {
            return None;
        }
        let parsed: Result<Vec<NaiveDate>, _> = self
            .records
            .iter()
            .map(|r| NaiveDate::parse_from_str(&r.gregorian_date, DATE_FORMAT))
            .collect();

        match parsed {
            Ok(dates) => Some(dates),
            Err(e) => {
                error!("Error reading dataset dates in {:?}: {}", self.path, e);
                None
            }
        }
    }

    /// Merge a scraped batch into the dataset and rewrite the file.
    ///
    /// Existing dates win: a new record whose date is already stored is
    /// dropped, never used to overwrite. Returns the number of records added.
    /// On error nothing on disk or in memory has changed.
    pub fn merge_and_persist(&mut self, new_records: &[Record]) -> Result<usize, StoreError> {
        if new_records.is_empty() {
            return Ok(0);
        }

        if self.records.is_empty() {
            let merged = sort_and_dedup(new_records.to_vec());
            let added = merged.len();
            self.write(&merged)?;
            self.records = merged;
            info!("Successfully saved {} records to {:?}", added, self.path);
            return Ok(added);
        }

        let known: HashSet<&str> = self
            .records
            .iter()
            .map(|r| r.gregorian_date.as_str())
            .collect();

        let fresh: Vec<Record> = new_records
            .iter()
            .filter(|r| !known.contains(r.gregorian_date.as_str()))
            .cloned()
            .collect();

        if fresh.is_empty() {
            info!("No new data to add (all records already exist)");
            return Ok(0);
        }

        let added = fresh
            .iter()
            .map(|r| r.gregorian_date.as_str())
            .collect::<HashSet<_>>()
            .len();
        let mut combined = fresh;
        combined.extend(self.records.iter().cloned());
        let merged = sort_and_dedup(combined);

        self.write(&merged)?;
        self.records = merged;
        info!("Successfully added {} new records", added);
        Ok(added)
    }

    /// Whole-file rewrite: temp file in the same directory, then rename.
    fn write(&self, records: &[Record]) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        std::fs::create_dir_all(&dir).map_err(io_err)?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;

        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            for rec in records {
                writer.serialize(rec)?;
            }
            writer.flush().map_err(io_err)?;
        }
        tmp.as_file_mut().sync_all().map_err(io_err)?;

        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// Newest first, one record per date; the first occurrence of a date wins.
fn sort_and_dedup(mut records: Vec<Record>) -> Vec<Record> {
    // stable sort keeps the first occurrence first among equal dates
    records.sort_by(|a, b| b.gregorian_date.cmp(&a.gregorian_date));
    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.gregorian_date.clone()));
    records
}

/// Read the dataset file. Missing → empty; unreadable → empty plus an error log.
pub fn load(path: &Path) -> Vec<Record> {
    if !path.exists() {
        info!("No existing data file found. Starting fresh.");
        return Vec::new();
    }

    match read_records(path) {
        Ok(records) => {
            info!("Loaded existing data: {} records from {:?}", records.len(), path);
            records
        }
        Err(e) => {
            error!("Error loading existing data from {:?}: {}", path, e);
            Vec::new()
        }
    }
}

fn read_records(path: &Path) -> Result<Vec<Record>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;

    let mut records = Vec::new();
    for result in reader.deserialize::<Record>() {
        let rec = result?;
        if !rec.is_valid() {
            warn!("Skipping stored row without date/close: {:?}", rec);
            continue;
        }
        records.push(rec);
    }
    Ok(records)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
