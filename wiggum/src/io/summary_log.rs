//! Master summary log (`wiggum_master.log`).
//!
//! A single growing text file spanning every run in the log directory. One
//! line per loop start, iteration boundary and session outcome, plus each
//! captured verifier report.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::types::{Role, SessionResult};
use crate::io::transcript::now_iso;

pub const SUMMARY_LOG_NAME: &str = "wiggum_master.log";

#[derive(Debug, Clone)]
pub struct SummaryLog {
    path: PathBuf,
}

impl SummaryLog {
    pub fn new(log_dir: &Path) -> Self {
        Self {
            path: log_dir.join(SUMMARY_LOG_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn loop_start(&self) -> Result<()> {
        self.append(&format!(
            "\n========== WIGGUM LOOP START {} ==========\n",
            now_iso()
        ))
    }

    pub fn iteration(&self, iteration: u32, max_iterations: u32) -> Result<()> {
        self.append(&format!(
            "\n--- loop {iteration}/{max_iterations} @ {} ---\n",
            now_iso()
        ))
    }

    pub fn session(&self, result: &SessionResult) -> Result<()> {
        let flag = match result.role {
            Role::Builder => "done",
            Role::Verifier => "verified",
        };
        self.append(&format!(
            "[{}] error={} {flag}={} log={}\n",
            result.role,
            result.had_error(),
            result.completion_signaled,
            result.transcript_path.display()
        ))
    }

    pub fn report(&self, report: &str) -> Result<()> {
        self.append(&format!("[verifier-report]\n{report}\n"))
    }

    pub fn verified(&self) -> Result<()> {
        self.append(&format!("VERIFIED COMPLETE @ {}\n", now_iso()))
    }

    pub fn exhausted(&self, max_iterations: u32) -> Result<()> {
        self.append(&format!(
            "EXHAUSTED after {max_iterations} loops @ {}\n",
            now_iso()
        ))
    }

    fn append(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("write {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(role: Role, done: bool) -> SessionResult {
        SessionResult {
            role,
            iteration: 1,
            transcript_path: PathBuf::from("logs/x.jsonl"),
            aggregated_text: String::new(),
            completion_signaled: done,
            execution_faulted: false,
            fault: None,
            result_error: false,
            verifier_report: None,
        }
    }

    #[test]
    fn appends_across_instances() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_dir = temp.path().join("logs");
        SummaryLog::new(&log_dir).loop_start().expect("start");
        let log = SummaryLog::new(&log_dir);
        log.iteration(1, 3).expect("iteration");
        log.session(&result(Role::Builder, true)).expect("builder");
        log.session(&result(Role::Verifier, false)).expect("verifier");
        log.report("1. fix tests").expect("report");

        let contents = fs::read_to_string(log.path()).expect("read");
        assert!(contents.contains("WIGGUM LOOP START"));
        assert!(contents.contains("--- loop 1/3 @ "));
        assert!(contents.contains("[builder] error=false done=true log=logs/x.jsonl"));
        assert!(contents.contains("[verifier] error=false verified=false log=logs/x.jsonl"));
        assert!(contents.contains("[verifier-report]\n1. fix tests\n"));
    }
}
