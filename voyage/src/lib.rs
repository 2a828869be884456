//! Skill-learning agent for a Minecraft-like world.
//!
//! A declared plan of sub-goals is resolved into an executable order, then
//! each sub-goal is learned by synthesizing a program, executing it through
//! an external world worker and judging the outcome. Successful programs are
//! kept as reusable skills.
//!
//! - **[`core`]**: pure logic (plan resolution, readiness, trace and response
//!   parsing). No I/O.
//! - **[`io`]**: side effects (worker processes, HTTP, ledger files, config,
//!   prompts). Behind traits where tests need doubles.
//! - **[`agents`]**: the language-model collaborators.
//! - **[`learn`]** and **[`looping`]**: the per-sub-goal attempt sequence and
//!   the plan-level control loop.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod learn;
pub mod logging;
pub mod looping;
pub mod plan;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
