//! Test-only scripted executor and event builders.
//!
//! [`ScriptedExecutor`] replays one [`ScriptedSession`] per query, in order,
//! without spawning anything. When a query carries the verifier hook, every
//! `Bash` tool call is run past it before the event is yielded, mirroring the
//! real executor asking the hook before it executes the command.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use serde_json::{Value, json};

use crate::core::signals::{REPORT_CLOSE, REPORT_OPEN};
use crate::core::types::{CommandDecision, Role};
use crate::io::executor::{
    AgentEvent, AgentExecutor, AgentMessage, EventStream, QueryOptions, QueryRequest, Segment,
};
use crate::io::hook::VerifierHook;

/// Query options suitable for scripted runs.
pub fn test_options() -> QueryOptions {
    QueryOptions {
        cwd: PathBuf::from("."),
        setting_sources: vec!["user".to_string(), "project".to_string()],
        permission_mode: "bypassPermissions".to_string(),
        model: None,
        hook: None,
    }
}

#[derive(Debug, Clone)]
enum ScriptedItem {
    Event(Value),
    Fault(String),
}

/// Events one query will produce.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSession {
    items: Vec<ScriptedItem>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw executor message.
    pub fn event(mut self, raw: Value) -> Self {
        self.items.push(ScriptedItem::Event(raw));
        self
    }

    pub fn init(self) -> Self {
        self.event(json!({
            "type": "system",
            "subtype": "init",
            "model": "scripted",
            "permissionMode": "bypassPermissions",
            "cwd": "."
        }))
    }

    pub fn text(self, text: &str) -> Self {
        self.event(json!({
            "type": "assistant",
            "message": {"content": [{"type": "text", "text": text}]}
        }))
    }

    /// Assistant message invoking the shell tool.
    pub fn bash(self, command: &str) -> Self {
        self.event(json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "tool_use", "id": "toolu_scripted", "name": "Bash", "input": {"command": command}}
            ]}
        }))
    }

    /// Successful terminal result carrying `result`.
    pub fn result(self, result: &str) -> Self {
        self.event(json!({
            "type": "result",
            "subtype": "success",
            "num_turns": 1,
            "is_error": false,
            "result": result
        }))
    }

    pub fn error_result(self, subtype: &str) -> Self {
        self.event(json!({
            "type": "result",
            "subtype": subtype,
            "num_turns": 1,
            "is_error": true
        }))
    }

    /// End the stream with an error; later items are never produced.
    pub fn fault(mut self, message: &str) -> Self {
        self.items.push(ScriptedItem::Fault(message.to_string()));
        self
    }

    /// A session that prints `role`'s completion marker.
    pub fn completing(role: Role) -> Self {
        Self::new()
            .init()
            .text("checked everything")
            .result(&format!("All good.\n{}", role.marker()))
    }

    /// A verifier session that rejects with `report` wrapped in report tags.
    pub fn rejecting(report: &str) -> Self {
        Self::new().init().result(&format!(
            "Found problems.\n{REPORT_OPEN}\n{report}\n{REPORT_CLOSE}"
        ))
    }
}

/// What one query asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedQuery {
    pub prompt: String,
    /// Whether the command hook was attached.
    pub gated: bool,
}

/// Hook verdict on one scripted shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub command: String,
    pub decision: CommandDecision,
}

/// Executor that replays scripted sessions.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    sessions: Mutex<VecDeque<ScriptedSession>>,
    queries: Mutex<Vec<CapturedQuery>>,
    decisions: Arc<Mutex<Vec<GateDecision>>>,
}

impl ScriptedExecutor {
    pub fn new(sessions: Vec<ScriptedSession>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<CapturedQuery> {
        self.queries.lock().expect("queries lock").clone()
    }

    pub fn decisions(&self) -> Vec<GateDecision> {
        self.decisions.lock().expect("decisions lock").clone()
    }

    /// Scripted sessions not yet consumed.
    pub fn remaining(&self) -> usize {
        self.sessions.lock().expect("sessions lock").len()
    }
}

impl AgentExecutor for ScriptedExecutor {
    fn query(&self, request: QueryRequest) -> EventStream {
        let hook = request.options.hook.clone();
        self.queries
            .lock()
            .expect("queries lock")
            .push(CapturedQuery {
                prompt: request.prompt,
                gated: hook.is_some(),
            });
        let session = self.sessions.lock().expect("sessions lock").pop_front();
        let decisions = Arc::clone(&self.decisions);

        Box::pin(async_stream::stream! {
            let items = match session {
                Some(session) => session.items,
                None => vec![ScriptedItem::Fault("no scripted session left".to_string())],
            };
            for item in items {
                match item {
                    ScriptedItem::Event(raw) => {
                        let event = AgentEvent::from_value(raw);
                        if let Some(hook) = &hook {
                            record_gate_decisions(hook, &event, &decisions);
                        }
                        yield Ok(event);
                    }
                    ScriptedItem::Fault(message) => {
                        yield Err(anyhow!(message));
                        break;
                    }
                }
            }
        })
    }
}

fn record_gate_decisions(
    hook: &VerifierHook,
    event: &AgentEvent,
    decisions: &Mutex<Vec<GateDecision>>,
) {
    let AgentMessage::Assistant { segments } = &event.message else {
        return;
    };
    for segment in segments {
        let (Segment::ToolUse { name, input }, Some(command)) = (segment, segment.bash_command())
        else {
            continue;
        };
        let decision = hook.check_tool(name, input);
        decisions.lock().expect("decisions lock").push(GateDecision {
            command: command.to_string(),
            decision,
        });
    }
}
