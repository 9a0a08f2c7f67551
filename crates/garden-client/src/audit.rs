//! Append-only audit trail of every frame sent and received.
//!
//! Each record is a banner line with a timestamp and direction, followed by
//! the frame as indented JSON when it parses, or the raw text otherwise:
//!
//! ```text
//!
//! ================================================================================
//! [2025-01-04 12:00:00.123] RECEIVED (PartialState)
//! ================================================================================
//! {
//!   "type": "PartialState",
//!   ...
//! }
//! ```
//!
//! Write failures are logged and swallowed so that auditing never affects
//! the session.

use chrono::Local;
use garden_core::JsonValue;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default file name of the audit trail.
pub const DEFAULT_AUDIT_FILE: &str = "messages.log";

const BANNER_WIDTH: usize = 80;

/// Handle to the audit trail. Cheap to clone; clones share the file.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    sink: Option<Arc<AuditSink>>,
}

#[derive(Debug)]
struct AuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    /// Create (or truncate) the file at `path` and write the session header.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        writeln!(file, "Garden Bot - Message Log")?;
        writeln!(file, "Started: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        Ok(Self {
            sink: Some(Arc::new(AuditSink {
                path,
                file: Mutex::new(file),
            })),
        })
    }

    /// An audit log that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Path of the backing file, if enabled.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.sink.as_deref().map(|sink| sink.path.as_path())
    }

    /// Record a text frame, pretty-printing it if it is JSON.
    pub fn record(&self, direction: &str, frame: &str) {
        if self.sink.is_none() {
            return;
        }
        let body = match serde_json::from_str::<JsonValue>(frame) {
            Ok(value) => pretty(&value),
            Err(_) => frame.to_owned(),
        };
        self.write_record(direction, &body);
    }

    /// Record an already parsed frame.
    pub fn record_json(&self, direction: &str, frame: &JsonValue) {
        if self.sink.is_none() {
            return;
        }
        self.write_record(direction, &pretty(frame));
    }

    fn write_record(&self, direction: &str, body: &str) {
        let Some(sink) = self.sink.as_deref() else {
            return;
        };
        let banner = "=".repeat(BANNER_WIDTH);
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let record = format!("\n{banner}\n[{timestamp}] {direction}\n{banner}\n{body}\n");

        let mut file = sink.file.lock();
        if let Err(err) = file.write_all(record.as_bytes()) {
            tracing::warn!(path = %sink.path.display(), %err, "failed to write audit record");
        }
    }
}

fn pretty(value: &JsonValue) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_truncates_and_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_AUDIT_FILE);
        std::fs::write(&path, "stale contents").unwrap();

        let log = AuditLog::create(&path).unwrap();
        assert_eq!(log.path(), Some(path.as_path()));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Garden Bot - Message Log\nStarted: "));
        assert!(!text.contains("stale"));
    }

    #[test]
    fn json_frames_are_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::create(&path).unwrap();

        log.record("RECEIVED (Ping)", r#"{"type":"Ping","id":1}"#);
        log.record_json("SENT", &json!({"type": "Pong"}));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("] RECEIVED (Ping)\n"));
        assert!(text.contains("{\n  \"type\": \"Ping\",\n  \"id\": 1\n}"));
        assert!(text.contains("] SENT\n"));
        assert_eq!(text.matches(&"=".repeat(80)).count(), 4);
    }

    #[test]
    fn raw_frames_are_written_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::create(&path).unwrap();

        log.record("RECEIVED (RAW)", "not json {");
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("] RECEIVED (RAW)\n"));
        assert!(text.ends_with("\nnot json {\n"));
    }

    #[test]
    fn disabled_log_is_silent() {
        let log = AuditLog::disabled();
        assert!(log.path().is_none());
        log.record("SENT", "{}");
    }

    #[test]
    fn clones_share_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::create(&path).unwrap();
        let clone = log.clone();
        log.record("SENT", "one");
        clone.record("SENT", "two");
        let text = std::fs::read_to_string(&path).unwrap();
        let one = text.find("\none\n").unwrap();
        let two = text.find("\ntwo\n").unwrap();
        assert!(one < two);
    }
}
