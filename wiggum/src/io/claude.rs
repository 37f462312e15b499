//! Executor backed by the `claude` CLI in stream-json mode.
//!
//! The prompt is written to the child's stdin and every stdout line is parsed
//! as one JSON message. A spawn failure, an unparseable line or a non-zero exit
//! without a terminal result notice ends the stream with an error.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, anyhow};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::io::config::ExecutorConfig;
use crate::io::executor::{AgentEvent, AgentExecutor, AgentMessage, EventStream, QueryRequest};
use crate::io::process::read_stream_limited;

/// Longest stdout line echoed back in a parse error.
const LINE_PREVIEW_BYTES: usize = 200;

/// Executor that spawns `claude -p --output-format stream-json`.
#[derive(Debug, Clone)]
pub struct ClaudeCliExecutor {
    program: String,
    leading_args: Vec<String>,
    stderr_limit_bytes: usize,
    hook_exe: PathBuf,
}

impl ClaudeCliExecutor {
    /// `hook_exe` is the binary the verifier's `PreToolUse` hook calls back into.
    pub fn new(config: &ExecutorConfig, hook_exe: PathBuf) -> Self {
        Self {
            program: config.program.clone(),
            leading_args: config.args.clone(),
            stderr_limit_bytes: config.stderr_limit_bytes,
            hook_exe,
        }
    }

    /// Full argument list for `request` (excluding the program itself).
    pub fn args(&self, request: &QueryRequest) -> Vec<String> {
        let options = &request.options;
        let mut args = self.leading_args.clone();
        args.extend(
            ["-p", "--output-format", "stream-json", "--verbose"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push("--permission-mode".to_string());
        args.push(options.permission_mode.clone());
        if options.permission_mode == "bypassPermissions" {
            args.push("--dangerously-skip-permissions".to_string());
        }
        if !options.setting_sources.is_empty() {
            args.push("--setting-sources".to_string());
            args.push(options.setting_sources.join(","));
        }
        if let Some(model) = &options.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(hook) = &options.hook {
            args.push("--settings".to_string());
            args.push(hook.settings_json(&self.hook_exe).to_string());
        }
        args
    }

    fn command(&self, request: &QueryRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(request))
            .current_dir(&request.options.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl AgentExecutor for ClaudeCliExecutor {
    fn query(&self, request: QueryRequest) -> EventStream {
        let mut cmd = self.command(&request);
        let program = self.program.clone();
        let stderr_limit = self.stderr_limit_bytes;
        let gated = request.options.hook.is_some();
        let prompt = request.prompt;

        Box::pin(async_stream::try_stream! {
            info!(program = %program, gated, prompt_bytes = prompt.len(), "starting executor");
            let mut child = cmd
                .spawn()
                .with_context(|| format!("spawn {program}"))?;

            // Drain stderr before feeding stdin so a chatty child cannot stall the write.
            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| anyhow!("stderr was not piped"))?;
            let stderr_task = tokio::spawn(read_stream_limited(stderr, stderr_limit));

            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("write prompt to executor stdin")?;
            stdin.shutdown().await.context("close executor stdin")?;
            drop(stdin);

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| anyhow!("stdout was not piped"))?;

            let mut lines = BufReader::new(stdout).lines();
            let mut saw_result = false;
            while let Some(line) = lines.next_line().await.context("read executor stdout")? {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let raw: Value = serde_json::from_str(trimmed).with_context(|| {
                    format!("parse executor output line: {}", preview(trimmed))
                })?;
                let event = AgentEvent::from_value(raw);
                if matches!(event.message, AgentMessage::Result { .. }) {
                    saw_result = true;
                }
                yield event;
            }

            let status = child.wait().await.context("wait for executor")?;
            let stderr = stderr_task.await.context("join stderr reader")??;
            debug!(exit_code = ?status.code(), saw_result, "executor finished");
            if !status.success() && !saw_result {
                warn!(exit_code = ?status.code(), "executor failed");
                Err::<(), _>(anyhow!(
                    "{program} exited with status {:?}: {}{}",
                    status.code(),
                    stderr.text().trim(),
                    stderr.truncated_notice("stderr")
                ))?;
            }
        })
    }
}

fn preview(line: &str) -> &str {
    if line.len() <= LINE_PREVIEW_BYTES {
        return line;
    }
    let mut end = LINE_PREVIEW_BYTES;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::PolicyConfig;
    use crate::io::executor::QueryOptions;
    use crate::io::hook::VerifierHook;
    use futures::StreamExt;
    use std::sync::Arc;

    fn request(cwd: PathBuf, hook: Option<Arc<VerifierHook>>) -> QueryRequest {
        QueryRequest {
            prompt: "do the thing".to_string(),
            options: QueryOptions {
                cwd,
                setting_sources: vec!["user".to_string(), "project".to_string()],
                permission_mode: "bypassPermissions".to_string(),
                model: None,
                hook,
            },
        }
    }

    fn executor(program: &str, args: &[&str]) -> ClaudeCliExecutor {
        ClaudeCliExecutor::new(
            &ExecutorConfig {
                program: program.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
                ..ExecutorConfig::default()
            },
            PathBuf::from("/usr/local/bin/wiggum"),
        )
    }

    #[test]
    fn builder_args_have_no_settings() {
        let args = executor("claude", &[]).args(&request(PathBuf::from("."), None));
        assert_eq!(
            args,
            vec![
                "-p",
                "--output-format",
                "stream-json",
                "--verbose",
                "--permission-mode",
                "bypassPermissions",
                "--dangerously-skip-permissions",
                "--setting-sources",
                "user,project",
            ]
        );
    }

    #[test]
    fn verifier_args_register_hook() {
        let hook = VerifierHook::new(PolicyConfig {
            protected_paths: vec!["fixtures".to_string()],
            denied_commands: Vec::new(),
        })
        .expect("hook");
        let args = executor("claude", &[]).args(&request(PathBuf::from("."), Some(Arc::new(hook))));
        let idx = args
            .iter()
            .position(|a| a == "--settings")
            .expect("settings flag");
        let settings: Value = serde_json::from_str(&args[idx + 1]).expect("settings json");
        assert_eq!(
            settings["hooks"]["PreToolUse"][0]["hooks"][0]["command"],
            "/usr/local/bin/wiggum hook --protect fixtures"
        );
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let line = "é".repeat(150);
        let shown = preview(&line);
        assert!(shown.len() <= LINE_PREVIEW_BYTES);
        assert!(line.starts_with(shown));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streams_json_lines_from_child() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("fake-claude.sh");
        std::fs::write(
            &script,
            concat!(
                "cat > /dev/null\n",
                "echo '{\"type\":\"system\",\"subtype\":\"init\",\"model\":\"m\"}'\n",
                "echo ''\n",
                "echo '{\"type\":\"result\",\"subtype\":\"success\",\"result\":\"ok\"}'\n",
            ),
        )
        .expect("write script");
        let exec = executor("sh", &[script.to_str().expect("utf8 path")]);

        let events: Vec<_> = exec
            .query(request(temp.path().to_path_buf(), None))
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        let last = events[1].as_ref().expect("result event");
        assert_eq!(last.message.success_result(), Some("ok"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_child_ends_stream_with_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("broken.sh");
        std::fs::write(&script, "cat > /dev/null\necho 'no credentials' >&2\nexit 3\n")
            .expect("write script");
        let exec = executor("sh", &[script.to_str().expect("utf8 path")]);

        let events: Vec<_> = exec
            .query(request(temp.path().to_path_buf(), None))
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        let err = events[0].as_ref().expect_err("error");
        let message = format!("{err:#}");
        assert!(message.contains("no credentials"), "{message}");
        assert!(message.contains("Some(3)"), "{message}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn child_flooding_stderr_before_reading_stdin_does_not_stall() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("noisy.sh");
        std::fs::write(
            &script,
            concat!(
                "head -c 300000 /dev/zero | tr '\\0' x >&2\n",
                "cat > /dev/null\n",
                "echo '{\"type\":\"result\",\"subtype\":\"success\",\"result\":\"ok\"}'\n",
            ),
        )
        .expect("write script");
        let exec = executor("sh", &[script.to_str().expect("utf8 path")]);
        let mut req = request(temp.path().to_path_buf(), None);
        req.prompt = "p".repeat(300_000);

        let events: Vec<_> = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            exec.query(req).collect::<Vec<_>>(),
        )
        .await
        .expect("executor stalled");
        assert_eq!(events.len(), 1);
        let last = events[0].as_ref().expect("result event");
        assert_eq!(last.message.success_result(), Some("ok"));
    }

    #[tokio::test]
    async fn missing_program_is_a_stream_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let exec = executor("definitely-not-a-real-claude-binary", &[]);
        let events: Vec<_> = exec
            .query(request(temp.path().to_path_buf(), None))
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(format!("{:#}", events[0].as_ref().expect_err("error")).contains("spawn"));
    }
}
