//! Stable exit codes for voyage CLI commands.

/// Command succeeded; for `learn`, every sub-goal is DONE.
pub const OK: i32 = 0;
/// Invalid config or plan, a construction error, or any other failure.
pub const INVALID: i32 = 1;
/// A sub-goal used up its attempts without a successful judgment.
pub const EXHAUSTED: i32 = 2;
/// A sub-goal kept failing on unexpected (usually protocol) errors.
pub const UNRECOVERABLE: i32 = 3;
/// Open sub-goals remain but none has its tools and materials available.
pub const BLOCKED: i32 = 4;
