//! Deterministic, pure logic shared by the loop core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod policy;
pub mod signals;
pub mod types;
