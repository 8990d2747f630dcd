//! Breach audit log
//!
//! Appends every breach notification to a JSONL file for later review.

use super::{BreachHook, RiskAlert, Severity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Entry in the audit log
#[derive(Debug, Serialize)]
struct BreachEntry<'a> {
    timestamp: DateTime<Utc>,
    entry_type: &'static str,
    severity: Severity,
    code: &'a str,
    description: &'a str,
}

/// Writer for audit log entries
struct BreachLogWriter {
    path: PathBuf,
}

impl BreachLogWriter {
    fn write(&self, entry: &BreachEntry<'_>) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

/// Breach hook that appends alerts to a file
pub struct JsonlBreachLog {
    writer: Mutex<BreachLogWriter>,
}

impl JsonlBreachLog {
    /// # Arguments
    /// * `log_path` - Path to the audit log file (JSONL format)
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Mutex::new(BreachLogWriter {
                path: log_path.into(),
            }),
        }
    }

    pub fn path(&self) -> PathBuf {
        match self.writer.lock() {
            Ok(writer) => writer.path.clone(),
            Err(poisoned) => poisoned.into_inner().path.clone(),
        }
    }
}

impl std::fmt::Debug for JsonlBreachLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlBreachLog")
            .field("path", &self.path())
            .finish()
    }
}

impl BreachHook for JsonlBreachLog {
    fn notify(&self, alert: &RiskAlert) {
        let entry = BreachEntry {
            timestamp: Utc::now(),
            entry_type: "risk_breach",
            severity: alert.severity,
            code: &alert.code,
            description: &alert.description,
        };

        let writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writer.write(&entry) {
            tracing::warn!(
                error = %e,
                path = %writer.path.display(),
                "Failed to write audit log entry"
            );
        }
    }
}
