//! Human-facing progress output on stdout.
//!
//! Diagnostics go through `tracing` on stderr; this module only prints what an
//! operator watching the loop wants to see.

use std::path::Path;

use serde_json::Value;

use crate::core::types::Role;
use crate::io::config::Settings;
use crate::io::executor::{AgentEvent, AgentMessage, Segment};

/// Longest tool input shown per tool call.
const TOOL_PREVIEW_CHARS: usize = 200;

pub fn banner(settings: &Settings, summary_log: &Path) {
    println!("wiggum builder/verifier loop");
    println!("  repo:      {}", settings.repo_root.display());
    println!("  plan:      {}", settings.plan_file().display());
    println!("  logs:      {}", settings.log_dir.display());
    println!("  summary:   {}", summary_log.display());
    println!(
        "  max loops: {}  cooldown: {}s{}",
        settings.max_loops,
        settings.cooldown.as_secs(),
        if settings.sanity_check {
            "  (sanity check)"
        } else {
            ""
        }
    );
    if !settings.policy.protected_paths.is_empty() {
        println!("  protected: {}", settings.policy.protected_paths.join(", "));
    }
}

pub fn iteration_start(iteration: u32, max_iterations: u32) {
    println!("\n===== loop {iteration}/{max_iterations} =====");
}

pub fn session_start(role: Role, iteration: u32, transcript: &Path) {
    println!(
        "\n--- {} session start (iter {iteration}) ---",
        role.as_str().to_uppercase()
    );
    println!("log:  {}", transcript.display());
    println!("tail: tail -f {:?} | jq .", transcript);
}

pub fn print_event(role: Role, event: &AgentEvent) {
    for line in event_lines(role, event) {
        println!("{line}");
    }
}

/// Lines `print_event` would emit for `event`.
pub fn event_lines(role: Role, event: &AgentEvent) -> Vec<String> {
    match &event.message {
        AgentMessage::Init {
            model,
            permission_mode,
            cwd,
        } => vec![format!(
            "[{role}] init: model={} permissionMode={} cwd={}",
            model.as_deref().unwrap_or("?"),
            permission_mode.as_deref().unwrap_or("?"),
            cwd.as_deref().unwrap_or("?"),
        )],
        AgentMessage::Assistant { segments } => segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Text(text) if text.trim().is_empty() => None,
                Segment::Text(text) => Some(text.clone()),
                Segment::ToolUse { name, input } => Some(format!(
                    "[{role}] tool -> {name}: {}",
                    tool_preview(segment.bash_command(), input)
                )),
            })
            .collect(),
        AgentMessage::Result {
            subtype,
            num_turns,
            is_error,
            ..
        } => vec![format!(
            "[{role}] done: {subtype} turns={num_turns} error={is_error}"
        )],
        AgentMessage::Other => Vec::new(),
    }
}

fn tool_preview(command: Option<&str>, input: &Value) -> String {
    let full = command.map_or_else(|| input.to_string(), str::to_string);
    full.chars().take(TOOL_PREVIEW_CHARS).collect()
}

pub fn builder_incomplete(cooldown_secs: u64) {
    println!("Builder did not signal completion; next loop in {cooldown_secs}s.");
}

pub fn verifier_rejected(has_report: bool, cooldown_secs: u64) {
    if has_report {
        println!("Verifier rejected the work; report handed to the next builder. Next loop in {cooldown_secs}s.");
    } else {
        println!("Verifier rejected the work without a report. Next loop in {cooldown_secs}s.");
    }
}

pub fn verified(iteration: u32) {
    println!("\nVERIFIED COMPLETE after {iteration} loop(s).");
}

pub fn exhausted(max_iterations: u32, summary_log: &Path) {
    println!(
        "\nEXHAUSTED: no verified completion after {max_iterations} loop(s). See {}",
        summary_log.display()
    );
}
