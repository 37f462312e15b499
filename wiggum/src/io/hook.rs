//! Pre-execution hook for verifier shell commands.
//!
//! The verifier runs with the [`CommandPolicy`] attached as a `PreToolUse`
//! gate. The executor calls back into `wiggum hook` before each tool runs,
//! passing a JSON description of the tool call on stdin and reading the
//! decision from stdout. Only `Bash` tools are policed; every other tool is
//! allowed untouched.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::policy::{CommandPolicy, PolicyConfig};
use crate::core::types::CommandDecision;

pub const PRE_TOOL_USE: &str = "PreToolUse";
pub const SHELL_TOOL: &str = "Bash";

/// Hook payload as sent by the executor.
#[derive(Debug, Clone, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub hook_event_name: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
}

/// Command policy bound to the verifier role.
#[derive(Debug)]
pub struct VerifierHook {
    config: PolicyConfig,
    policy: CommandPolicy,
}

impl VerifierHook {
    pub fn new(config: PolicyConfig) -> Result<Self> {
        let policy = CommandPolicy::new(&config)?;
        Ok(Self { config, policy })
    }

    /// Decide on a tool invocation. Non-shell tools are always allowed.
    pub fn check_tool(&self, tool_name: &str, tool_input: &Value) -> CommandDecision {
        if tool_name != SHELL_TOOL {
            return CommandDecision::Allow;
        }
        let command = tool_input
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default();
        self.policy.evaluate(command)
    }

    /// Decide on a full hook payload. Events other than `PreToolUse` pass.
    pub fn check(&self, input: &HookInput) -> CommandDecision {
        if input.hook_event_name != PRE_TOOL_USE {
            return CommandDecision::Allow;
        }
        self.check_tool(&input.tool_name, &input.tool_input)
    }

    /// Shell command line that makes the executor call back into this binary.
    pub fn command_line(&self, exe: &Path) -> String {
        let mut args = vec![exe.display().to_string(), "hook".to_string()];
        for path in &self.config.protected_paths {
            args.push("--protect".to_string());
            args.push(path.clone());
        }
        for cmd in &self.config.denied_commands {
            args.push("--deny-command".to_string());
            args.push(cmd.clone());
        }
        shell_words::join(args)
    }

    /// Executor settings JSON registering this hook for `Bash` tool calls.
    pub fn settings_json(&self, exe: &Path) -> Value {
        json!({
            "hooks": {
                "PreToolUse": [{
                    "matcher": "Bash",
                    "hooks": [{"type": "command", "command": self.command_line(exe)}],
                }]
            }
        })
    }
}

/// Decision document written back to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookOutput {
    #[serde(rename = "hookSpecificOutput", skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    pub permission_decision: String,
    pub permission_decision_reason: String,
}

impl From<&CommandDecision> for HookOutput {
    fn from(decision: &CommandDecision) -> Self {
        let hook_specific_output = decision.reason().map(|reason| HookSpecificOutput {
            hook_event_name: PRE_TOOL_USE.to_string(),
            permission_decision: "deny".to_string(),
            permission_decision_reason: reason.to_string(),
        });
        Self {
            hook_specific_output,
        }
    }
}

/// Read one hook payload from `input`, write the decision to `output`.
pub fn answer_hook<R: Read, W: Write>(
    hook: &VerifierHook,
    mut input: R,
    mut output: W,
) -> Result<CommandDecision> {
    let mut raw = String::new();
    input.read_to_string(&mut raw).context("read hook input")?;
    let payload: HookInput = serde_json::from_str(&raw).context("parse hook input")?;
    let decision = hook.check(&payload);
    if let Some(reason) = decision.reason() {
        tracing::info!(tool = %payload.tool_name, reason, "verifier command denied");
    }
    let body =
        serde_json::to_string(&HookOutput::from(&decision)).context("serialize hook output")?;
    writeln!(output, "{body}").context("write hook output")?;
    output.flush().context("flush hook output")?;
    Ok(decision)
}
