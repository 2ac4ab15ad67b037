//! Append-only snapshot log kept as a single JSON array on disk.

use crate::aggregator::ConvertedValue;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Minute granularity, e.g. `202401311405`.
pub const DATE_FORMAT: &str = "%Y%m%d%H%M";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: String,
    pub data: Vec<ConvertedValue>,
}

/// The persisted history file.
///
/// Every append reads the whole file, adds one entry and rewrites it. There is
/// no locking, so overlapping runs against the same file can lose an update.
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        HistoryLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<Snapshot>> {
        match self.read_contents()? {
            Some(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse history file: {}", self.path.display())),
            None => Ok(Vec::new()),
        }
    }

    pub fn latest(&self) -> Result<Option<Snapshot>> {
        Ok(self.load()?.pop())
    }

    /// Appends `values` stamped with the current local time.
    pub fn append_snapshot(&self, values: &[ConvertedValue]) -> Result<Snapshot> {
        self.append_snapshot_at(values, Local::now().naive_local())
    }

    pub fn append_snapshot_at(
        &self,
        values: &[ConvertedValue],
        at: NaiveDateTime,
    ) -> Result<Snapshot> {
        // Existing entries stay raw so they are written back untouched.
        let mut entries: Vec<Box<RawValue>> = match self.read_contents()? {
            Some(contents) => serde_json::from_str(&contents).with_context(|| {
                format!("Failed to parse history file: {}", self.path.display())
            })?,
            None => Vec::new(),
        };

        let snapshot = Snapshot {
            date: at.format(DATE_FORMAT).to_string(),
            data: values.to_vec(),
        };
        entries.push(serde_json::value::to_raw_value(&snapshot)?);

        self.write_entries(&entries)?;
        info!(
            date = %snapshot.date,
            entries = entries.len(),
            path = %self.path.display(),
            "Appended snapshot"
        );
        Ok(snapshot)
    }

    /// File contents, or `None` when the file is missing or blank.
    fn read_contents(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(None),
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No history at {}, starting empty", self.path.display());
                Ok(None)
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read history file: {}", self.path.display())),
        }
    }

    fn write_entries(&self, entries: &[Box<RawValue>]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let tmp_path = self.tmp_path();
        let written = Self::write_file(&tmp_path, entries).and_then(|_| {
            fs::rename(&tmp_path, &self.path).with_context(|| {
                format!("Failed to replace history file: {}", self.path.display())
            })
        });
        if written.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        written
    }

    fn write_file(path: &Path, entries: &[Box<RawValue>]) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entries)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "history.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(hour, minute, 59)
            .unwrap()
    }

    fn values() -> Vec<ConvertedValue> {
        vec![
            ConvertedValue {
                asset: "BTC".to_string(),
                reference: "USD".to_string(),
                value: 100000.0,
            },
            ConvertedValue {
                asset: "BTC".to_string(),
                reference: "EUR".to_string(),
                value: 92000.0,
            },
        ]
    }

    #[test]
    fn test_append_to_missing_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let log = HistoryLog::new(temp_dir.path().join("nested").join("history.json"));

        let snapshot = log.append_snapshot_at(&values(), at(14, 5))?;
        assert_eq!(snapshot.date, "202401311405");

        let history = log.load()?;
        assert_eq!(history, vec![snapshot]);
        assert!(!log.tmp_path().exists());
        Ok(())
    }

    #[test]
    fn test_blank_file_reads_as_empty() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("history.json");
        fs::write(&path, "  \n")?;

        let log = HistoryLog::new(&path);
        assert!(log.load()?.is_empty());

        log.append_snapshot_at(&values(), at(0, 0))?;
        assert_eq!(log.load()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_prior_entries_are_kept_verbatim() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("history.json");
        let first = r#"{"date": "202312312359", "data": [{"asset": "ETH", "reference": "USD", "value": 1e3}]}"#;
        let second = r#"{"date": "202401010000", "data": []}"#;
        fs::write(&path, format!("[{first}, {second}]"))?;

        let log = HistoryLog::new(&path);
        log.append_snapshot_at(&values(), at(9, 30))?;

        let raw: Vec<Box<RawValue>> = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[0].get(), first);
        assert_eq!(raw[1].get(), second);

        let history = log.load()?;
        assert_eq!(history[0].data[0].value, 1000.0);
        assert_eq!(history[2].date, "202401310930");
        assert_eq!(history[2].data, values());
        Ok(())
    }

    #[test]
    fn test_corrupt_history_is_left_untouched() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("history.json");
        fs::write(&path, "{not json")?;

        let log = HistoryLog::new(&path);
        let result = log.append_snapshot_at(&values(), at(1, 1));
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse history file")
        );
        assert_eq!(fs::read_to_string(&path)?, "{not json");
        Ok(())
    }

    #[test]
    fn test_latest_returns_last_snapshot() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let log = HistoryLog::new(temp_dir.path().join("history.json"));
        assert!(log.latest()?.is_none());

        log.append_snapshot_at(&[], at(8, 0))?;
        log.append_snapshot_at(&values(), at(9, 0))?;

        let latest = log.latest()?.unwrap();
        assert_eq!(latest.date, "202401310900");
        assert_eq!(latest.data, values());
        Ok(())
    }
}
