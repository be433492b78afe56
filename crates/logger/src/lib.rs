/// hltv-ics — Logger
/// JSONL audit stream of served feeds and bypass session changes

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        fs::create_dir_all(&dir).ok();
        Self { log_dir: dir }
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let date  = Utc::now().format("%Y-%m-%d").to_string();
        let path  = self.log_dir.join(format!("{date}.jsonl"));
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    /// Like [`log`](Self::log) but never fails the caller.
    pub fn log_or_warn<T: Serialize>(&self, event: &T) {
        if let Err(e) = self.log(event) {
            tracing::warn!("audit log write failed in {:?}: {}", self.log_dir, e);
        }
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event typy ────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct FeedServedEvent {
    pub ts:           String,
    pub event:        &'static str,   // "FEED_SERVED"
    pub team_id:      String,
    pub url:          String,
    pub duration_min: i64,
    pub events:       usize,
    pub elapsed_ms:   u64,
}

#[derive(Serialize, Debug)]
pub struct FeedFailedEvent {
    pub ts:       String,
    pub event:    &'static str,       // "FEED_FAILED"
    pub team_id:  String,
    pub error:    String,
}

#[derive(Serialize, Debug)]
pub struct BypassSessionEvent {
    pub ts:       String,
    pub event:    &'static str,       // "BYPASS_SESSION"
    pub action:   String,             // "created" | "unavailable" | "destroyed"
    pub session:  Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir().join(format!("hltv-ics-logger-{tag}-{}-{nanos}", std::process::id()))
    }

    #[test]
    fn appends_one_json_line_per_event() {
        let dir = scratch_dir("append");
        let logger = EventLogger::new(&dir);

        for n in 0..2 {
            logger
                .log(&FeedFailedEvent {
                    ts: now_iso(),
                    event: "FEED_FAILED",
                    team_id: n.to_string(),
                    error: "origin returned HTTP 500".into(),
                })
                .unwrap();
        }

        let path = dir.join(format!("{}.jsonl", Utc::now().format("%Y-%m-%d")));
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "FEED_FAILED");
        assert_eq!(first["team_id"], "0");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn session_event_serializes_missing_session_as_null() {
        let ev = BypassSessionEvent {
            ts: now_iso(),
            event: "BYPASS_SESSION",
            action: "unavailable".into(),
            session: None,
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert!(v["session"].is_null());
        assert_eq!(v["action"], "unavailable");
    }
}
