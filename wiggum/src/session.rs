//! One builder or verifier session.
//!
//! A session submits a prompt to the executor, persists every event to its
//! transcript before looking at it, echoes progress to the console and folds
//! the stream into a [`SessionResult`]. A stream fault ends consumption
//! early and is reported in the result rather than as an error; only harness
//! I/O problems (the transcript cannot be created) fail the call.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::core::signals::{builder_signaled, report_or_full_text, verifier_signaled};
use crate::core::types::{Role, SessionResult};
use crate::io::console;
use crate::io::executor::{
    AgentEvent, AgentExecutor, AgentMessage, EventStream, QueryOptions, QueryRequest,
};
use crate::io::hook::VerifierHook;
use crate::io::transcript::TranscriptWriter;

/// Runs sessions against one executor with shared options.
pub struct SessionRunner<'a, E: AgentExecutor> {
    executor: &'a E,
    log_dir: PathBuf,
    options: QueryOptions,
    verifier_hook: Arc<VerifierHook>,
    console: bool,
}

impl<'a, E: AgentExecutor> SessionRunner<'a, E> {
    /// `options.hook` is ignored; the verifier always gets `verifier_hook` and
    /// the builder never gets one.
    pub fn new(
        executor: &'a E,
        log_dir: PathBuf,
        options: QueryOptions,
        verifier_hook: Arc<VerifierHook>,
    ) -> Self {
        Self {
            executor,
            log_dir,
            options,
            verifier_hook,
            console: true,
        }
    }

    /// Toggle console progress output (on by default).
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    fn options_for(&self, role: Role) -> QueryOptions {
        let mut options = self.options.clone();
        options.hook = match role {
            Role::Builder => None,
            Role::Verifier => Some(Arc::clone(&self.verifier_hook)),
        };
        options
    }

    /// Run one session to completion.
    #[instrument(skip_all, fields(role = %role, iteration))]
    pub async fn run_session(
        &self,
        role: Role,
        prompt: &str,
        iteration: u32,
    ) -> Result<SessionResult> {
        let mut transcript = TranscriptWriter::create(&self.log_dir, role, iteration).await?;
        let transcript_path = transcript.path().to_path_buf();
        if self.console {
            console::session_start(role, iteration, &transcript_path);
        }

        let mut stream = self.executor.query(QueryRequest {
            prompt: prompt.to_string(),
            options: self.options_for(role),
        });
        let mut acc = Accumulator::default();
        let fault = self
            .consume(role, &mut stream, &mut transcript, &mut acc)
            .await
            .err()
            .map(|err| format!("{err:#}"));
        drop(stream);

        if let Some(message) = &fault {
            warn!(fault = %message, "session stream faulted");
            if self.console {
                println!("[{role}] stream error: {message}");
            }
            if let Err(err) = transcript.append_fault(message).await {
                warn!(err = %format!("{err:#}"), "could not record fault in transcript");
            }
        }
        if let Err(err) = transcript.close().await {
            warn!(err = %format!("{err:#}"), "could not close transcript");
        }

        let result = acc.finish(role, iteration, transcript_path, fault);
        info!(
            completed = result.completion_signaled,
            faulted = result.execution_faulted,
            result_error = result.result_error,
            "session finished"
        );
        Ok(result)
    }

    async fn consume(
        &self,
        role: Role,
        stream: &mut EventStream,
        transcript: &mut TranscriptWriter,
        acc: &mut Accumulator,
    ) -> Result<()> {
        while let Some(item) = stream.next().await {
            let event = item?;
            transcript.append(&event.raw).await?;
            if self.console {
                console::print_event(role, &event);
            }
            acc.absorb(&event);
        }
        debug!(records = transcript.records(), "stream ended");
        Ok(())
    }
}

/// Running fold over a session's events.
#[derive(Debug, Default)]
struct Accumulator {
    text: String,
    final_result: Option<String>,
    result_error: bool,
}

impl Accumulator {
    fn absorb(&mut self, event: &AgentEvent) {
        match &event.message {
            AgentMessage::Assistant { .. } => self.text.push_str(&event.assistant_text()),
            AgentMessage::Result { .. } => match event.message.success_result() {
                Some(result) => self.final_result = Some(result.to_string()),
                None => self.result_error = true,
            },
            AgentMessage::Init { .. } | AgentMessage::Other => {}
        }
    }

    fn finish(
        self,
        role: Role,
        iteration: u32,
        transcript_path: PathBuf,
        fault: Option<String>,
    ) -> SessionResult {
        let text = match self.final_result {
            Some(result) if !result.is_empty() => result,
            _ => self.text,
        };
        let aggregated_text = text.trim().to_string();
        let execution_faulted = fault.is_some();
        let signaled = match role {
            Role::Builder => builder_signaled(&aggregated_text),
            Role::Verifier => verifier_signaled(&aggregated_text),
        };
        let completion_signaled = !execution_faulted && signaled;
        let verifier_report = match role {
            Role::Verifier if !completion_signaled => report_or_full_text(&aggregated_text),
            _ => None,
        };
        SessionResult {
            role,
            iteration,
            transcript_path,
            aggregated_text,
            completion_signaled,
            execution_faulted,
            fault,
            result_error: self.result_error,
            verifier_report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::PolicyConfig;
    use crate::core::signals::{BUILDER_DONE, VERIFIER_DONE};
    use crate::test_support::{ScriptedExecutor, ScriptedSession, test_options};

    fn runner(executor: &ScriptedExecutor, log_dir: PathBuf) -> SessionRunner<'_, ScriptedExecutor> {
        let hook = VerifierHook::new(PolicyConfig::default()).expect("hook");
        SessionRunner::new(executor, log_dir, test_options(), Arc::new(hook)).with_console(false)
    }

    fn transcript_lines(path: &std::path::Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .expect("read transcript")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }

    #[tokio::test]
    async fn success_result_overrides_accumulated_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let executor = ScriptedExecutor::new(vec![
            ScriptedSession::new()
                .init()
                .text("working on it")
                .result(&format!("all done\n{BUILDER_DONE}\n")),
        ]);
        let result = runner(&executor, temp.path().to_path_buf())
            .run_session(Role::Builder, "build", 1)
            .await
            .expect("session");

        assert_eq!(result.aggregated_text, format!("all done\n{BUILDER_DONE}"));
        assert!(result.completion_signaled);
        assert!(!result.had_error());
        assert_eq!(transcript_lines(&result.transcript_path).len(), 3);
    }

    #[tokio::test]
    async fn accumulated_text_is_the_fallback() {
        let temp = tempfile::tempdir().expect("tempdir");
        let executor = ScriptedExecutor::new(vec![
            ScriptedSession::new()
                .text("first ")
                .text(BUILDER_DONE)
                .error_result("error_max_turns"),
        ]);
        let result = runner(&executor, temp.path().to_path_buf())
            .run_session(Role::Builder, "build", 1)
            .await
            .expect("session");

        assert_eq!(result.aggregated_text, format!("first {BUILDER_DONE}"));
        assert!(result.completion_signaled);
        assert!(result.result_error);
        assert!(result.had_error());
    }

    #[tokio::test]
    async fn builder_marker_does_not_complete_a_verifier() {
        let temp = tempfile::tempdir().expect("tempdir");
        let executor = ScriptedExecutor::new(vec![ScriptedSession::new().result(BUILDER_DONE)]);
        let result = runner(&executor, temp.path().to_path_buf())
            .run_session(Role::Verifier, "verify", 1)
            .await
            .expect("session");
        assert!(!result.completion_signaled);
        assert_eq!(result.verifier_report.as_deref(), Some(BUILDER_DONE));
    }

    #[tokio::test]
    async fn fault_stops_consumption_and_is_recorded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let executor = ScriptedExecutor::new(vec![
            ScriptedSession::new()
                .text(VERIFIER_DONE)
                .fault("connection reset")
                .text("never seen"),
        ]);
        let result = runner(&executor, temp.path().to_path_buf())
            .run_session(Role::Verifier, "verify", 2)
            .await
            .expect("session");

        assert!(result.execution_faulted);
        assert!(!result.completion_signaled);
        assert_eq!(result.fault.as_deref(), Some("connection reset"));
        assert_eq!(result.aggregated_text, VERIFIER_DONE);

        let lines = transcript_lines(&result.transcript_path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["error"], "connection reset");
        assert_eq!(lines[1]["kind"], "verifier");
    }

    #[tokio::test]
    async fn verifier_report_is_extracted_from_tags() {
        let temp = tempfile::tempdir().expect("tempdir");
        let executor = ScriptedExecutor::new(vec![ScriptedSession::new().result(
            "Checked.\n<verifier-report>\n1. tests fail\n</verifier-report>\nbye",
        )]);
        let result = runner(&executor, temp.path().to_path_buf())
            .run_session(Role::Verifier, "verify", 1)
            .await
            .expect("session");
        assert_eq!(result.verifier_report.as_deref(), Some("1. tests fail"));
    }

    #[tokio::test]
    async fn only_the_verifier_is_gated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let executor = ScriptedExecutor::new(vec![
            ScriptedSession::new().result("x"),
            ScriptedSession::new().result("y"),
        ]);
        let sessions = runner(&executor, temp.path().to_path_buf());
        sessions
            .run_session(Role::Builder, "b", 1)
            .await
            .expect("builder");
        sessions
            .run_session(Role::Verifier, "v", 1)
            .await
            .expect("verifier");

        let queries = executor.queries();
        assert_eq!(queries.len(), 2);
        assert!(!queries[0].gated);
        assert!(queries[1].gated);
    }
}
