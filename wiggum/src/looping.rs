//! Builder/verifier iteration loop.
//!
//! Each iteration runs a builder session. Only when the builder signals
//! completion does a verifier session run in the same iteration. The loop
//! succeeds the moment a verifier signals completion; otherwise the verifier's
//! report replaces whatever report the next builder would have seen, and the
//! loop pauses for the cooldown before trying again. Running out of
//! iterations is an ordinary outcome, not an error.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{info, instrument};

use crate::core::types::{LoopStatus, Role, SessionResult};
use crate::io::executor::AgentExecutor;
use crate::io::prompt::PromptSource;
use crate::io::summary_log::SummaryLog;
use crate::session::SessionRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Iteration budget (must be > 0).
    pub max_iterations: u32,
    /// Pause after an iteration that did not finish the loop.
    pub cooldown: Duration,
}

/// State carried from one iteration to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopState {
    iteration: u32,
    report: Option<String>,
    status: LoopStatus,
}

impl Default for LoopState {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopState {
    pub fn new() -> Self {
        Self {
            iteration: 0,
            report: None,
            status: LoopStatus::Pending,
        }
    }

    /// Last iteration started (0 before the first).
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Report the next builder will see.
    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    fn begin_iteration(&mut self) -> u32 {
        self.iteration += 1;
        self.iteration
    }

    /// Replace the carried report. `None` clears it; reports never accumulate.
    pub fn replace_report(&mut self, report: Option<String>) {
        self.report = report;
    }
}

/// Sessions run in one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationRecord {
    pub iteration: u32,
    pub builder: SessionResult,
    /// Present exactly when the builder signaled completion.
    pub verifier: Option<SessionResult>,
}

impl IterationRecord {
    pub fn verified(&self) -> bool {
        self.verifier
            .as_ref()
            .is_some_and(|verifier| verifier.completion_signaled)
    }
}

/// Progress notifications for callers that report to a human.
#[derive(Debug, Clone, Copy)]
pub enum LoopEvent<'a> {
    IterationStarted { iteration: u32, max_iterations: u32 },
    IterationFinished(&'a IterationRecord),
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub status: LoopStatus,
    pub iterations: Vec<IterationRecord>,
    pub summary_log: PathBuf,
    /// Report still pending when the loop stopped.
    pub final_report: Option<String>,
}

impl LoopOutcome {
    pub fn builder_sessions(&self) -> usize {
        self.iterations.len()
    }

    pub fn verifier_sessions(&self) -> usize {
        self.iterations
            .iter()
            .filter(|record| record.verifier.is_some())
            .count()
    }
}

/// Run builder/verifier iterations until the verifier agrees or the budget
/// runs out.
///
/// Errors are harness failures only (summary log, prompt rendering,
/// transcript creation); session faults are recorded and the loop continues.
#[instrument(skip_all, fields(max_iterations = config.max_iterations))]
pub async fn run_loop<E, P, F>(
    sessions: &SessionRunner<'_, E>,
    prompts: &P,
    summary: &SummaryLog,
    config: &LoopConfig,
    mut on_event: F,
) -> Result<LoopOutcome>
where
    E: AgentExecutor,
    P: PromptSource + ?Sized,
    F: FnMut(LoopEvent<'_>),
{
    if config.max_iterations == 0 {
        bail!("max iterations must be > 0");
    }
    let max = config.max_iterations;
    summary.loop_start()?;

    let mut state = LoopState::new();
    let mut iterations = Vec::new();
    while state.iteration() < max {
        let iteration = state.begin_iteration();
        summary.iteration(iteration, max)?;
        on_event(LoopEvent::IterationStarted {
            iteration,
            max_iterations: max,
        });

        let builder_prompt = prompts.builder_prompt(state.report())?;
        let builder = sessions
            .run_session(Role::Builder, &builder_prompt, iteration)
            .await?;
        summary.session(&builder)?;

        let verifier = if builder.completion_signaled {
            let verifier_prompt = prompts.verifier_prompt()?;
            let verifier = sessions
                .run_session(Role::Verifier, &verifier_prompt, iteration)
                .await?;
            summary.session(&verifier)?;
            if verifier.completion_signaled {
                summary.verified()?;
                state.status = LoopStatus::Success;
            } else {
                state.replace_report(verifier.verifier_report.clone());
                if let Some(report) = state.report() {
                    summary.report(report)?;
                }
            }
            Some(verifier)
        } else {
            None
        };

        let record = IterationRecord {
            iteration,
            builder,
            verifier,
        };
        info!(
            iteration,
            builder_done = record.builder.completion_signaled,
            verified = record.verified(),
            "iteration finished"
        );
        on_event(LoopEvent::IterationFinished(&record));
        iterations.push(record);

        if state.status == LoopStatus::Success {
            break;
        }
        if iteration < max && !config.cooldown.is_zero() {
            tokio::time::sleep(config.cooldown).await;
        }
    }

    if state.status != LoopStatus::Success {
        state.status = LoopStatus::Exhausted;
        summary.exhausted(max)?;
    }

    Ok(LoopOutcome {
        status: state.status,
        iterations,
        summary_log: summary.path().to_path_buf(),
        final_report: state.report,
    })
}
