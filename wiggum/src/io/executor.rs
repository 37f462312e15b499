//! Executor abstraction for agent invocation.
//!
//! The [`AgentExecutor`] trait decouples session orchestration from the actual
//! agent backend (currently the `claude` CLI, see [`crate::io::claude`]). A
//! query yields a finite, ordered, non-restartable [`EventStream`] that is
//! consumed by exactly one session. Tests use scripted executors that replay
//! predetermined events without spawning processes.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::Value;

use crate::io::hook::VerifierHook;

/// Ordered event sequence produced by one query.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<AgentEvent>> + Send>>;

/// Options forwarded to the executor alongside the prompt.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Working directory for the agent.
    pub cwd: PathBuf,
    /// Settings scopes the agent loads (e.g. `user`, `project`).
    pub setting_sources: Vec<String>,
    /// Permission mode handed to the agent.
    pub permission_mode: String,
    /// Optional model override.
    pub model: Option<String>,
    /// Pre-execution gate for shell commands. Only set for the verifier.
    pub hook: Option<Arc<VerifierHook>>,
}

/// Parameters for one executor invocation.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub prompt: String,
    pub options: QueryOptions,
}

/// Abstraction over agent execution backends.
pub trait AgentExecutor {
    /// Submit `request` and return its event stream.
    ///
    /// Failures to start the agent surface as the first stream item rather
    /// than as an error from this call.
    fn query(&self, request: QueryRequest) -> EventStream;
}

/// One message emitted by the executor, kept alongside its raw JSON form.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentEvent {
    pub message: AgentMessage,
    pub raw: Value,
}

impl AgentEvent {
    /// Interpret a raw executor message. Unknown shapes become [`AgentMessage::Other`].
    pub fn from_value(raw: Value) -> Self {
        let message = match serde_json::from_value::<WireMessage>(raw.clone()) {
            Ok(wire) => AgentMessage::from(wire),
            Err(err) => {
                tracing::debug!(err = %err, "unrecognized executor message");
                AgentMessage::Other
            }
        };
        Self { message, raw }
    }

    /// Concatenated plain text of an assistant utterance; empty otherwise.
    pub fn assistant_text(&self) -> String {
        match &self.message {
            AgentMessage::Assistant { segments } => segments
                .iter()
                .filter_map(|segment| match segment {
                    Segment::Text(text) => Some(text.as_str()),
                    Segment::ToolUse { .. } => None,
                })
                .collect(),
            _ => String::new(),
        }
    }
}

/// Tagged executor message variants the loop cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    /// Session initialization notice.
    Init {
        model: Option<String>,
        permission_mode: Option<String>,
        cwd: Option<String>,
    },
    /// Assistant utterance with ordered segments.
    Assistant { segments: Vec<Segment> },
    /// Terminal result notice.
    Result {
        subtype: String,
        num_turns: u32,
        is_error: bool,
        result: Option<String>,
    },
    /// Anything else (tool results, other system notices).
    Other,
}

impl AgentMessage {
    /// Explicit result string of a successful terminal notice.
    pub fn success_result(&self) -> Option<&str> {
        match self {
            AgentMessage::Result {
                subtype,
                result: Some(text),
                ..
            } if subtype == "success" => Some(text),
            _ => None,
        }
    }
}

/// Part of an assistant utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    ToolUse { name: String, input: Value },
}

impl Segment {
    /// Command text when this is a shell-command invocation.
    pub fn bash_command(&self) -> Option<&str> {
        match self {
            Segment::ToolUse { name, input } if name == "Bash" => {
                input.get("command").and_then(Value::as_str)
            }
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default, rename = "permissionMode")]
        permission_mode: Option<String>,
        #[serde(default)]
        cwd: Option<String>,
    },
    Assistant {
        message: WireBody,
    },
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        num_turns: u32,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        result: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireBody {
    #[serde(default)]
    content: WireContent,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Blocks(Vec<WireBlock>),
}

impl Default for WireContent {
    fn default() -> Self {
        WireContent::Blocks(Vec::new())
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

impl From<WireMessage> for AgentMessage {
    fn from(wire: WireMessage) -> Self {
        match wire {
            WireMessage::System {
                subtype,
                model,
                permission_mode,
                cwd,
            } if subtype.as_deref() == Some("init") => AgentMessage::Init {
                model,
                permission_mode,
                cwd,
            },
            WireMessage::System { .. } | WireMessage::Other => AgentMessage::Other,
            WireMessage::Assistant { message } => {
                let segments = match message.content {
                    WireContent::Text(text) => vec![Segment::Text(text)],
                    WireContent::Blocks(blocks) => blocks
                        .into_iter()
                        .filter_map(|block| match block {
                            WireBlock::Text { text } => Some(Segment::Text(text)),
                            WireBlock::ToolUse { name, input } => {
                                Some(Segment::ToolUse { name, input })
                            }
                            WireBlock::Other => None,
                        })
                        .collect(),
                };
                AgentMessage::Assistant { segments }
            }
            WireMessage::Result {
                subtype,
                num_turns,
                is_error,
                result,
            } => AgentMessage::Result {
                subtype,
                num_turns,
                is_error,
                result,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_init_notice() {
        let event = AgentEvent::from_value(json!({
            "type": "system",
            "subtype": "init",
            "model": "claude-sonnet",
            "permissionMode": "bypassPermissions",
            "cwd": "/repo",
            "tools": ["Bash"],
        }));
        assert_eq!(
            event.message,
            AgentMessage::Init {
                model: Some("claude-sonnet".to_string()),
                permission_mode: Some("bypassPermissions".to_string()),
                cwd: Some("/repo".to_string()),
            }
        );
    }

    #[test]
    fn parses_assistant_segments_in_order() {
        let event = AgentEvent::from_value(json!({
            "type": "assistant",
            "message": {
                "content": [
                    {"type": "text", "text": "Checking. "},
                    {"type": "tool_use", "id": "t1", "name": "Bash", "input": {"command": "git status"}},
                    {"type": "thinking", "thinking": "hmm"},
                    {"type": "text", "text": "Done."}
                ]
            }
        }));
        let AgentMessage::Assistant { segments } = &event.message else {
            panic!("expected assistant message");
        };
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].bash_command(), Some("git status"));
        assert_eq!(event.assistant_text(), "Checking. Done.");
    }

    #[test]
    fn assistant_string_content_is_text() {
        let event = AgentEvent::from_value(json!({
            "type": "assistant",
            "message": {"content": "plain"}
        }));
        assert_eq!(event.assistant_text(), "plain");
    }

    #[test]
    fn parses_terminal_result() {
        let event = AgentEvent::from_value(json!({
            "type": "result",
            "subtype": "success",
            "num_turns": 4,
            "is_error": false,
            "result": "all good"
        }));
        assert_eq!(event.message.success_result(), Some("all good"));

        let failed = AgentEvent::from_value(json!({
            "type": "result",
            "subtype": "error_max_turns",
            "num_turns": 30,
            "is_error": true
        }));
        assert_eq!(failed.message.success_result(), None);
    }

    #[test]
    fn unknown_messages_keep_raw_payload() {
        let raw = json!({"type": "user", "message": {"content": []}});
        let event = AgentEvent::from_value(raw.clone());
        assert_eq!(event.message, AgentMessage::Other);
        assert_eq!(event.raw, raw);

        let malformed = AgentEvent::from_value(json!({"type": "assistant"}));
        assert_eq!(malformed.message, AgentMessage::Other);
    }
}
