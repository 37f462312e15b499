//! I/O adapters for the loop.

pub mod claude;
pub mod config;
pub mod console;
pub mod executor;
pub mod hook;
pub mod process;
pub mod prompt;
pub mod summary_log;
pub mod transcript;
