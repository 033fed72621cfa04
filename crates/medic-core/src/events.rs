//! Event sink for crash and fix events.
//!
//! The supervisor takes an `Option<Arc<dyn EventSink>>`; `None` disables event
//! logging entirely. Sink methods return nothing: a sink that cannot write
//! logs a warning and carries on.

use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::Result;

/// Receiver of pipeline events. Implementations must not panic.
pub trait EventSink: Send + Sync {
    fn log_crash(&self, file: &Path, line: usize, category: &str, raw_output: &str);
    fn log_fix_generated(&self, file: &Path, old_code: &str, new_code: &str);
    fn log_fix_applied(&self, file: &Path, success: bool);
    fn log_fix_rejected(&self, file: &Path);
}

/// One record in a daily event file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: String,
    pub event_type: String,
    pub data: Value,
}

/// Appends events to `<dir>/medic_YYYYMMDD.json`, a JSON array per day.
#[derive(Debug, Clone)]
pub struct JsonEventLog {
    dir: PathBuf,
}

impl JsonEventLog {
    /// Log into `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Today's log file.
    pub fn current_file(&self) -> PathBuf {
        self.dir
            .join(format!("medic_{}.json", Local::now().format("%Y%m%d")))
    }

    /// All records in today's file; a missing or corrupt file reads as empty.
    pub fn read_today(&self) -> Vec<EventRecord> {
        read_records(&self.current_file())
    }

    fn append(&self, event_type: &str, data: Value) {
        if let Err(e) = self.try_append(event_type, data) {
            warn!(event_type, error = %e, dir = %self.dir.display(), "failed to write event log");
        }
    }

    fn try_append(&self, event_type: &str, data: Value) -> Result<()> {
        let path = self.current_file();
        let mut records = read_records(&path);
        records.push(EventRecord {
            timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            event_type: event_type.to_string(),
            data,
        });
        std::fs::write(&path, serde_json::to_vec_pretty(&records)?)?;
        Ok(())
    }
}

fn read_records(path: &Path) -> Vec<EventRecord> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(file = %path.display(), error = %e, "corrupt event log; starting a new array");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    }
}

impl EventSink for JsonEventLog {
    fn log_crash(&self, file: &Path, line: usize, category: &str, raw_output: &str) {
        self.append(
            "crash_detected",
            json!({
                "file": file.display().to_string(),
                "line": line,
                "error_type": category,
                "error_message": raw_output,
            }),
        );
    }

    fn log_fix_generated(&self, file: &Path, old_code: &str, new_code: &str) {
        self.append(
            "fix_generated",
            json!({
                "file": file.display().to_string(),
                "old_code": old_code,
                "new_code": new_code,
            }),
        );
    }

    fn log_fix_applied(&self, file: &Path, success: bool) {
        self.append(
            "fix_applied",
            json!({
                "file": file.display().to_string(),
                "success": success,
            }),
        );
    }

    fn log_fix_rejected(&self, file: &Path) {
        self.append(
            "fix_rejected",
            json!({ "file": file.display().to_string() }),
        );
    }
}
