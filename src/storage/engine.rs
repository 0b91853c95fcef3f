use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{debug, error};
use serde::Serialize;

use super::category::CategoryKey;
use super::ledger::{Ledger, SizeRecord};
use super::walk::dir_size;
use super::StorageError;
use crate::metrics::{RuntimeMetrics, METRICS};
use crate::util::file_stem_timestamp;

/// File name of the size ledger inside the data root.
pub const LEDGER_FILE: &str = "size_history.json";

/// Directory owned by the logging layer; never counted as a category.
pub const LOG_DIR: &str = "logs";

/// Upper bound on `-<n>` suffixes tried when a timestamp name is taken.
const MAX_NAME_COLLISIONS: u32 = 10_000;

/// Fresh view of how much space the archive uses.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeSnapshot {
    /// Whole root except `logs/`
    pub total: SizeRecord,

    /// One entry per top-level directory except `logs/`
    pub by_category: BTreeMap<String, SizeRecord>,

    /// Files sitting directly in the root (e.g. the ledger itself)
    pub uncategorized_bytes: u64,
}

/// Category-partitioned event store plus size ledger.
///
/// RESPONSIBILITIES:
/// - Lay out `<root>/<segments...>/<timestamp>.json`
/// - Recompute the category size after each write
/// - Append one ledger record per successful write
///
/// FAILURE POLICY:
/// - `persist` and `recompute_size` never return errors; failures are
///   logged and counted, and the pipeline moves on.
///
/// THREADING:
/// - Cheap to clone; clones share the ledger lock, so ledger appends
///   from different clones never interleave.
#[derive(Debug, Clone)]
pub struct StorageEngine {
    root: PathBuf,
    ledger: Ledger,
    ledger_lock: Arc<Mutex<()>>,
}

impl StorageEngine {
    /// Opens (and creates if needed) the data root.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::CreateDir {
            path: root.clone(),
            source,
        })?;

        Ok(Self {
            ledger: Ledger::new(root.join(LEDGER_FILE)),
            root,
            ledger_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn category_dir(&self, key: &CategoryKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Writes `payload` as a new timestamped file under `key` and records
    /// the category's new size.
    ///
    /// Returns the written file, or `None` if the event could not be
    /// stored (already logged).
    pub fn persist<T: Serialize + ?Sized>(&self, key: &CategoryKey, payload: &T) -> Option<PathBuf> {
        match self.write_event(key, payload, Utc::now()) {
            Ok(path) => {
                RuntimeMetrics::bump(&METRICS.events_persisted);
                debug!("Saved {} data to {}", key, path.display());
                self.recompute_size(key);
                Some(path)
            }
            Err(e) => {
                RuntimeMetrics::bump(&METRICS.persist_errors);
                error!("Error saving {} data: {}", key, e);
                None
            }
        }
    }

    fn write_event<T: Serialize + ?Sized>(
        &self,
        key: &CategoryKey,
        payload: &T,
        at: DateTime<Utc>,
    ) -> Result<PathBuf, StorageError> {
        let body = serde_json::to_vec_pretty(payload)?;

        let dir = self.category_dir(key);
        fs::create_dir_all(&dir).map_err(|source| StorageError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let stem = file_stem_timestamp(at);
        for n in 0..MAX_NAME_COLLISIONS {
            let name = if n == 0 {
                format!("{}.json", stem)
            } else {
                format!("{}-{}.json", stem, n)
            };
            let path = dir.join(name);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(StorageError::Write { path, source }),
            };

            file.write_all(&body)
                .and_then(|_| file.flush())
                .map_err(|source| StorageError::Write {
                    path: path.clone(),
                    source,
                })?;
            return Ok(path);
        }

        Err(StorageError::NameExhausted { dir, stem })
    }

    /// Re-walks the category directory and appends one ledger record.
    pub fn recompute_size(&self, key: &CategoryKey) -> Option<SizeRecord> {
        match self.try_recompute_size(key) {
            Ok(record) => {
                debug!("Size of {} is now {} bytes", key, record.bytes);
                Some(record)
            }
            Err(e) => {
                error!("Error updating size for {}: {}", key, e);
                None
            }
        }
    }

    fn try_recompute_size(&self, key: &CategoryKey) -> Result<SizeRecord, StorageError> {
        let dir = self.category_dir(key);
        let bytes = dir_size(&dir).map_err(|source| StorageError::Walk {
            path: dir.clone(),
            source,
        })?;

        let record = SizeRecord::new(key.label(), bytes, &dir, Utc::now());

        let _guard = self
            .ledger_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.ledger.append(record.clone())?;

        Ok(record)
    }

    /// Walks the data root now; does not consult the ledger.
    pub fn current_size_snapshot(&self) -> Result<SizeSnapshot, StorageError> {
        let walk_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StorageError::Walk { path, source }
        };

        let now = Utc::now();
        let mut by_category = BTreeMap::new();
        let mut uncategorized_bytes = 0u64;

        let entries = fs::read_dir(&self.root).map_err(walk_err(&self.root))?;
        for entry in entries {
            let entry = entry.map_err(walk_err(&self.root))?;
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(source) => return Err(StorageError::Walk { path, source }),
            };
            let name = entry.file_name().to_string_lossy().to_string();

            if file_type.is_dir() {
                if name == LOG_DIR {
                    continue;
                }
                let bytes = dir_size(&path).map_err(walk_err(&path))?;
                by_category.insert(name.clone(), SizeRecord::new(name, bytes, &path, now));
            } else if file_type.is_file() {
                match entry.metadata() {
                    Ok(meta) => uncategorized_bytes += meta.len(),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(source) => return Err(StorageError::Walk { path, source }),
                }
            }
        }

        let total_bytes = by_category.values().map(|r| r.bytes).sum::<u64>() + uncategorized_bytes;

        Ok(SizeSnapshot {
            total: SizeRecord::new("total", total_bytes, &self.root, now),
            by_category,
            uncategorized_bytes,
        })
    }

    /// Full ledger in append order, optionally only one category label.
    pub fn history(&self, category: Option<&str>) -> Vec<SizeRecord> {
        let records = self.ledger.load();
        match category {
            Some(filter) => records.into_iter().filter(|r| r.category == filter).collect(),
            None => records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> (tempfile::TempDir, StorageEngine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = StorageEngine::open(dir.path().join("data")).unwrap();
        (dir, engine)
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn trades_land_under_coin_directory_with_exact_payload() {
        let (_tmp, engine) = engine();
        let key = CategoryKey::with_coin("trades", "BTC");
        let payload = json!([{"coin": "BTC", "px": "65000.0", "sz": "0.1"}]);

        let path = engine.persist(&key, &payload).unwrap();

        assert_eq!(path.parent().unwrap(), engine.root().join("trades").join("BTC"));
        assert_eq!(path.extension().unwrap(), "json");
        assert!(!path.file_name().unwrap().to_string_lossy().contains(':'));

        let written = fs::read(&path).unwrap();
        assert_eq!(written, serde_json::to_vec_pretty(&payload).unwrap());
    }

    #[test]
    fn second_persist_creates_a_second_file() {
        let (_tmp, engine) = engine();
        let key = CategoryKey::with_coin("trades", "BTC");

        let first = engine.persist(&key, &json!({"n": 1})).unwrap();
        let second = engine.persist(&key, &json!({"n": 2})).unwrap();

        assert_ne!(first, second);
        assert_eq!(files_in(&engine.category_dir(&key)).len(), 2);
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&fs::read(&first).unwrap()).unwrap(),
            json!({"n": 1})
        );
    }

    #[test]
    fn same_instant_writes_get_suffixes() {
        let (_tmp, engine) = engine();
        let key = CategoryKey::kind("allMids");
        let at = Utc::now();

        let a = engine.write_event(&key, &json!(1), at).unwrap();
        let b = engine.write_event(&key, &json!(2), at).unwrap();

        assert_ne!(a, b);
        assert!(b.file_name().unwrap().to_string_lossy().ends_with("-1.json"));
    }

    #[test]
    fn candle_path_has_coin_and_interval() {
        let (_tmp, engine) = engine();
        let path = engine
            .persist(&CategoryKey::candle("BTC", "1m"), &json!({"s": "BTC", "i": "1m"}))
            .unwrap();
        assert_eq!(
            path.parent().unwrap(),
            engine.root().join("candle").join("BTC").join("1m")
        );
    }

    #[test]
    fn ledger_grows_one_record_per_persist_with_non_decreasing_bytes() {
        let (_tmp, engine) = engine();
        let key = CategoryKey::with_coin("l2Book", "ETH");

        for n in 0..4 {
            engine.persist(&key, &json!({"seq": n, "pad": "x".repeat(n * 10)}));
        }
        engine.persist(&CategoryKey::kind("notification"), &json!({"notification": "hi"}));

        let history = engine.history(Some("l2Book/ETH"));
        assert_eq!(history.len(), 4);
        assert!(history.windows(2).all(|w| w[0].bytes <= w[1].bytes));
        assert!(history.iter().all(|r| r.category == "l2Book/ETH"));

        assert_eq!(engine.history(None).len(), 5);
        assert_eq!(engine.history(Some("notification")).len(), 1);
        assert!(engine.history(Some("trades")).is_empty());
    }

    #[test]
    fn directories_emptied_externally_are_recreated() {
        let (_tmp, engine) = engine();
        let key = CategoryKey::with_user("userFills", "0xabc");

        engine.persist(&key, &json!({"a": 1})).unwrap();
        fs::remove_dir_all(engine.root().join("userFills")).unwrap();

        let path = engine.persist(&key, &json!({"a": 2})).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn persist_failure_is_absorbed() {
        let (_tmp, engine) = engine();
        // A file where the category directory should be.
        fs::write(engine.root().join("trades"), b"blocker").unwrap();

        let key = CategoryKey::with_coin("trades", "BTC");
        assert!(engine.persist(&key, &json!({})).is_none());
        assert!(engine.history(None).is_empty());
    }

    #[test]
    fn snapshot_total_is_categories_plus_loose_files_without_logs() {
        let (_tmp, engine) = engine();
        engine.persist(&CategoryKey::with_coin("trades", "BTC"), &json!({"x": 1}));
        engine.persist(&CategoryKey::candle("ETH", "5m"), &json!({"y": 2}));

        let logs = engine.root().join(LOG_DIR);
        fs::create_dir_all(&logs).unwrap();
        fs::write(logs.join("2024-01-01.log"), vec![b'l'; 4096]).unwrap();

        let snapshot = engine.current_size_snapshot().unwrap();

        assert!(!snapshot.by_category.contains_key(LOG_DIR));
        assert_eq!(
            snapshot.by_category.keys().cloned().collect::<Vec<_>>(),
            vec!["candle".to_string(), "trades".to_string()]
        );

        let ledger_len = fs::metadata(engine.root().join(LEDGER_FILE)).unwrap().len();
        assert_eq!(snapshot.uncategorized_bytes, ledger_len);

        let categories: u64 = snapshot.by_category.values().map(|r| r.bytes).sum();
        assert_eq!(snapshot.total.bytes, categories + ledger_len);
        assert_eq!(
            snapshot.by_category["trades"].bytes,
            dir_size(&engine.root().join("trades")).unwrap()
        );
    }
}
