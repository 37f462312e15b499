//! Shared deterministic types for the loop core.
//!
//! These types define stable contracts between the session runner, the loop
//! controller and the command policy. They carry no I/O handles.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which side of the loop a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Attempts the task and claims completion with the builder marker.
    Builder,
    /// Re-checks the builder's work under the command policy.
    Verifier,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Builder => "builder",
            Role::Verifier => "verifier",
        }
    }

    /// Completion marker this role is expected to print.
    pub fn marker(self) -> &'static str {
        match self {
            Role::Builder => crate::core::signals::BUILDER_DONE,
            Role::Verifier => crate::core::signals::VERIFIER_DONE,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one shell command against the command policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandDecision {
    Allow,
    Deny { reason: String },
}

impl CommandDecision {
    pub fn deny(reason: impl Into<String>) -> Self {
        CommandDecision::Deny {
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, CommandDecision::Allow)
    }

    /// Deny reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            CommandDecision::Allow => None,
            CommandDecision::Deny { reason } => Some(reason),
        }
    }
}

/// Terminal state of the loop controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStatus {
    /// Still iterating.
    Pending,
    /// Builder and verifier agreed the task is complete.
    Success,
    /// The iteration budget ran out without verifier agreement.
    Exhausted,
}

/// Structured result of one builder or verifier session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResult {
    pub role: Role,
    /// Iteration number (1-indexed).
    pub iteration: u32,
    /// JSONL transcript written for this session.
    pub transcript_path: PathBuf,
    /// Trimmed final text: the terminal result string, else accumulated assistant text.
    pub aggregated_text: String,
    /// The role's completion marker was found and the stream did not fault.
    pub completion_signaled: bool,
    /// Consuming the event stream failed part way.
    pub execution_faulted: bool,
    /// Fault description when `execution_faulted` is set.
    pub fault: Option<String>,
    /// The terminal result notice reported something other than success.
    pub result_error: bool,
    /// Report to hand to the next builder (verifier sessions that did not complete).
    pub verifier_report: Option<String>,
}

impl SessionResult {
    /// Any error condition worth surfacing in the summary log.
    pub fn had_error(&self) -> bool {
        self.execution_faulted || self.result_error
    }
}
