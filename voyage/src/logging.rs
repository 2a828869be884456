//! Development-time tracing for the agent.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted.
//!
//! - **Iteration logging (`io/iteration_log`)**: per-attempt artifacts in
//!   `<workdir>/iterations/`. Always written, unaffected by `RUST_LOG`.
//!
//! - **Worker logs (`io/process`)**: supervised process output in
//!   `<log_dir>/<name>/<timestamp>.log`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=voyage=debug voyage learn plan.json
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
