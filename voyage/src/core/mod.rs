//! Deterministic, pure logic shared by the agent.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod describe;
pub mod error;
pub mod extract;
pub mod invariants;
pub mod items;
pub mod judgment;
pub mod resolver;
pub mod status;
pub mod trace;
