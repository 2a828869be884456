//! Side-effecting parts of the agent: files, processes, HTTP and prompts.

pub mod atomic;
pub mod bridge;
pub mod config;
pub mod init;
pub mod iteration_log;
pub mod ledger;
pub mod llm;
pub mod plan_store;
pub mod process;
pub mod prompt;
pub mod transport;
