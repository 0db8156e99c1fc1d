//! Logging for the image engine
//!
//! Logs to ~/.jcode/logs/ (or `$JCODE_HOME/logs/`), one file per day.
//!
//! Nothing is written until [`init`] is called, so embedding the library in
//! a TUI or a test run stays silent by default.

use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

const RETENTION_DAYS: i64 = 7;

pub struct Logger {
    file: File,
    path: PathBuf,
}

impl Logger {
    fn new() -> Option<Self> {
        let log_dir = log_dir()?;
        fs::create_dir_all(&log_dir).ok()?;

        let path = log_file_in(&log_dir);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;

        Some(Self { file, path })
    }

    fn write(&mut self, level: &str, message: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("[{}] [{}] {}\n", timestamp, level, message);
        let _ = self.file.write_all(line.as_bytes());
        let _ = self.file.flush();
    }
}

fn log_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("JCODE_HOME") {
        return Some(PathBuf::from(path).join("logs"));
    }
    Some(dirs::home_dir()?.join(".jcode").join("logs"))
}

fn log_file_in(dir: &Path) -> PathBuf {
    let date = Local::now().format("%Y-%m-%d");
    dir.join(format!("jcode-images-{}.log", date))
}

/// Initialize the logger (call once at startup)
pub fn init() {
    let mut guard = LOGGER.lock().unwrap_or_else(|e| e.into_inner());
    if guard.is_none() {
        *guard = Logger::new();
    }
}

fn log(level: &str, message: &str) {
    if let Ok(mut guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_mut() {
            logger.write(level, message);
        }
    }
}

/// Log an info message
pub fn info(message: &str) {
    log("INFO", message);
}

/// Log an error message
pub fn error(message: &str) {
    log("ERROR", message);
}

/// Log a warning message
pub fn warn(message: &str) {
    log("WARN", message);
}

/// Log a debug message (only if JCODE_TRACE is set)
pub fn debug(message: &str) {
    if std::env::var("JCODE_TRACE").is_ok() {
        log("DEBUG", message);
    }
}

/// Path of the open log file, or today's file if logging isn't initialized
pub fn log_path() -> Option<PathBuf> {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            return Some(logger.path.clone());
        }
    }
    log_dir().map(|dir| log_file_in(&dir))
}

/// Clean up old logs (keep last 7 days)
pub fn cleanup_old_logs() {
    if let Some(log_dir) = log_dir() {
        cleanup_logs_in(&log_dir, RETENTION_DAYS);
    }
}

fn cleanup_logs_in(log_dir: &Path, days: i64) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };
    let cutoff = Local::now() - chrono::Duration::days(days);
    for entry in entries.flatten() {
        let is_ours = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with("jcode-images-") && name.ends_with(".log"));
        if !is_ours {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            let modified: chrono::DateTime<Local> = modified.into();
            if modified < cutoff {
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}
