//! Per-session JSONL transcripts.
//!
//! Every executor message is appended to the session's transcript before the
//! loop looks at it. Each line is a self-contained record carrying a
//! timestamp, the role, the iteration and the raw message. Lines are flushed
//! as they are written so `tail -f` shows progress in real time.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::core::types::Role;

/// `{role}_{iteration:03}_{YYYY-MM-DD_HH-MM-SS}.jsonl`
pub fn transcript_file_name(role: Role, iteration: u32, at: DateTime<Local>) -> String {
    format!(
        "{}_{:03}_{}.jsonl",
        role.as_str(),
        iteration,
        at.format("%Y-%m-%d_%H-%M-%S")
    )
}

/// ISO-8601 UTC timestamp with millisecond precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Serialize)]
struct TranscriptRecord<'a> {
    ts: String,
    kind: Role,
    iteration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Append-only transcript sink owned by a single session.
pub struct TranscriptWriter {
    path: PathBuf,
    role: Role,
    iteration: u32,
    out: BufWriter<File>,
    records: usize,
}

impl TranscriptWriter {
    /// Create the transcript file for `role` / `iteration` under `log_dir`.
    pub async fn create(log_dir: &Path, role: Role, iteration: u32) -> Result<Self> {
        fs::create_dir_all(log_dir)
            .await
            .with_context(|| format!("create log dir {}", log_dir.display()))?;
        let path = log_dir.join(transcript_file_name(role, iteration, Local::now()));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("open transcript {}", path.display()))?;
        debug!(path = %path.display(), "transcript opened");
        Ok(Self {
            path,
            role,
            iteration,
            out: BufWriter::new(file),
            records: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> usize {
        self.records
    }

    /// Persist one raw executor message.
    pub async fn append(&mut self, msg: &Value) -> Result<()> {
        self.write_record(&TranscriptRecord {
            ts: now_iso(),
            kind: self.role,
            iteration: self.iteration,
            msg: Some(msg),
            error: None,
        })
        .await
    }

    /// Persist a stream fault as the final record.
    pub async fn append_fault(&mut self, message: &str) -> Result<()> {
        self.write_record(&TranscriptRecord {
            ts: now_iso(),
            kind: self.role,
            iteration: self.iteration,
            msg: None,
            error: Some(message),
        })
        .await
    }

    /// Flush and close the file, returning its path.
    pub async fn close(mut self) -> Result<PathBuf> {
        self.out
            .shutdown()
            .await
            .with_context(|| format!("close transcript {}", self.path.display()))?;
        debug!(path = %self.path.display(), records = self.records, "transcript closed");
        Ok(self.path)
    }

    async fn write_record(&mut self, record: &TranscriptRecord<'_>) -> Result<()> {
        let mut line = serde_json::to_vec(record).context("serialize transcript record")?;
        line.push(b'\n');
        self.out
            .write_all(&line)
            .await
            .with_context(|| format!("write transcript {}", self.path.display()))?;
        self.out
            .flush()
            .await
            .with_context(|| format!("flush transcript {}", self.path.display()))?;
        self.records += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn file_name_encodes_role_iteration_and_stamp() {
        let at = Local
            .with_ymd_and_hms(2026, 3, 4, 5, 6, 7)
            .single()
            .expect("local time");
        assert_eq!(
            transcript_file_name(Role::Verifier, 7, at),
            "verifier_007_2026-03-04_05-06-07.jsonl"
        );
        assert_eq!(
            transcript_file_name(Role::Builder, 123, at),
            "builder_123_2026-03-04_05-06-07.jsonl"
        );
    }

    #[tokio::test]
    async fn records_are_appended_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_dir = temp.path().join("logs");
        let mut writer = TranscriptWriter::create(&log_dir, Role::Builder, 2)
            .await
            .expect("create");
        writer.append(&json!({"type": "system"})).await.expect("append");
        writer
            .append(&json!({"type": "result", "result": "ok"}))
            .await
            .expect("append");
        writer.append_fault("boom").await.expect("fault");
        assert_eq!(writer.records(), 3);
        let path = writer.close().await.expect("close");

        let contents = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["kind"], "builder");
        assert_eq!(lines[0]["iteration"], 2);
        assert_eq!(lines[0]["msg"]["type"], "system");
        assert_eq!(lines[1]["msg"]["result"], "ok");
        assert_eq!(lines[2]["error"], "boom");
        assert!(lines[2].get("msg").is_none());
        assert!(lines[0]["ts"].as_str().expect("ts").ends_with('Z'));
    }
}
