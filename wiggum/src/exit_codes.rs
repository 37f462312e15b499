//! Stable exit codes for wiggum CLI commands.

/// The verifier confirmed completion, or the command succeeded (`check`: allowed).
pub const OK: i32 = 0;
/// The loop exhausted its budget, a fatal error occurred, or `check` denied the command.
pub const FAILURE: i32 = 1;
/// `hook` could not read its input; the executor blocks the tool call.
pub const HOOK_BLOCK: i32 = 2;
