//! Builder/verifier agent loop harness.
//!
//! A builder agent works on a task until it claims completion; a verifier
//! agent, restricted to read-only shell commands, then tries to disprove the
//! claim. A rejected claim carries the verifier's report into the next
//! builder prompt. The loop ends when the verifier agrees or the iteration
//! budget runs out.
//!
//! - **[`core`]**: Pure logic (completion signals, report extraction, the
//!   verifier command policy). No I/O.
//! - **[`io`]**: Side effects (configuration, the agent executor, hooks,
//!   transcripts, the summary log, console output).
//!
//! [`session`], [`looping`] and [`startup`] coordinate the two.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod session;
pub mod startup;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
