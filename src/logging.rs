use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use env_logger::{Builder, Env, Target};
use log::{warn, Level};

use crate::storage::LOG_DIR;
use crate::util::{iso_timestamp, log_date};

// ------------------------------------------------------------
// Logging setup
// ------------------------------------------------------------
//
// Every record is written twice:
// - to stderr
// - to `<data_dir>/logs/<YYYY-MM-DD>.log`, one file per UTC day
//
// Line format: `[2024-05-01T12:30:45.123Z] [INFO] message`
//
// The level comes from config; `RUST_LOG`, when set, wins.
//

/// Installs the global logger. Call once, before anything logs.
pub fn init(level: &str, data_dir: &Path) -> anyhow::Result<()> {
    let log_dir = data_dir.join(LOG_DIR);
    let (file, file_err) = match DailyFile::open(log_dir.clone()) {
        Ok(file) => (Some(file), None),
        Err(e) => (None, Some(e)),
    };

    Builder::from_env(Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(buf, "{}", format_line(Utc::now(), record.level(), record.args()))
        })
        .target(Target::Pipe(Box::new(Tee { file })))
        .try_init()?;

    if let Some(e) = file_err {
        warn!(
            "Could not open log directory {}, logging to stderr only: {}",
            log_dir.display(),
            e
        );
    }
    Ok(())
}

pub fn format_line(at: DateTime<Utc>, level: Level, message: &fmt::Arguments<'_>) -> String {
    format!("[{}] [{}] {}", iso_timestamp(at), level, message)
}

/// stderr plus the optional daily file.
///
/// A failing file write is swallowed so that logging to stderr keeps
/// working when the disk is full.
struct Tee {
    file: Option<DailyFile>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
        io::stderr().flush()
    }
}

/// Append-only log file that rolls over when the UTC date changes.
struct DailyFile {
    dir: PathBuf,
    date: String,
    file: File,
}

impl DailyFile {
    fn open(dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let date = log_date(Utc::now());
        let file = Self::open_for(&dir, &date)?;
        Ok(Self { dir, date, file })
    }

    fn open_for(dir: &Path, date: &str) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{}.log", date)))
    }

    fn roll_if_needed(&mut self) -> io::Result<()> {
        let today = log_date(Utc::now());
        if today != self.date {
            self.file = Self::open_for(&self.dir, &today)?;
            self.date = today;
        }
        Ok(())
    }
}

impl Write for DailyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.roll_if_needed()?;
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
