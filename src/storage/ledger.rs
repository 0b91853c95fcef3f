use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use super::StorageError;
use crate::util::{byte_units, iso_timestamp};

/// One storage-size observation.
///
/// `bytes` is authoritative; the other units are derived from it and
/// stored only for the convenience of readers of the JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeRecord {
    pub timestamp: String,
    pub category: String,
    pub bytes: u64,
    pub kilobytes: f64,
    pub megabytes: f64,
    pub gigabytes: f64,
    pub terabytes: f64,
    pub path: String,
}

impl SizeRecord {
    pub fn new(category: impl Into<String>, bytes: u64, path: &Path, at: DateTime<Utc>) -> Self {
        let (kilobytes, megabytes, gigabytes, terabytes) = byte_units(bytes);
        Self {
            timestamp: iso_timestamp(at),
            category: category.into(),
            bytes,
            kilobytes,
            megabytes,
            gigabytes,
            terabytes,
            path: path.display().to_string(),
        }
    }

    pub fn at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Append-only size history kept as a JSON array on disk.
///
/// Every append is a full read-modify-write. Callers must serialize
/// appends (the engine holds a lock around them). The replacement file
/// is written beside the ledger and renamed over it, so readers never see
/// a half-written array.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the full ledger.
    ///
    /// Missing file → empty. Unreadable or corrupt file → empty, with a
    /// warning; the next append starts a fresh history.
    pub fn load(&self) -> Vec<SizeRecord> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Size ledger {} unreadable, treating as empty: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        if data.trim().is_empty() {
            return Vec::new();
        }

        match serde_json::from_str(&data) {
            Ok(records) => records,
            Err(e) => {
                warn!("Size ledger {} corrupt, treating as empty: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    pub fn append(&self, record: SizeRecord) -> Result<(), StorageError> {
        let mut records = self.load();
        records.push(record);

        let encoded = serde_json::to_vec_pretty(&records)?;
        let tmp = self.path.with_extension("json.tmp");

        fs::write(&tmp, encoded).map_err(|source| StorageError::Ledger {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StorageError::Ledger {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(category: &str, bytes: u64) -> SizeRecord {
        SizeRecord::new(category, bytes, Path::new("/data/x"), Utc::now())
    }

    #[test]
    fn appends_preserve_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("size_history.json"));

        ledger.append(record("trades/BTC", 10)).unwrap();
        ledger.append(record("allMids", 20)).unwrap();
        ledger.append(record("trades/BTC", 30)).unwrap();

        let bytes: Vec<u64> = ledger.load().into_iter().map(|r| r.bytes).collect();
        assert_eq!(bytes, vec![10, 20, 30]);
        assert!(!dir.path().join("size_history.json.tmp").exists());
    }

    #[test]
    fn corrupt_ledger_reads_empty_and_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("size_history.json");
        fs::write(&path, "[{not json").unwrap();

        let ledger = Ledger::new(path.clone());
        assert!(ledger.load().is_empty());

        ledger.append(record("allMids", 5)).unwrap();
        let records = ledger.load();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, "allMids");
    }

    #[test]
    fn record_derives_units_and_parses_back() {
        let r = record("candle/BTC/1m", 2048);
        assert_eq!(r.kilobytes, 2.0);
        assert!(r.at().is_some());
    }
}
