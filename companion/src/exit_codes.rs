//! Stable exit codes for companion CLI commands.

/// Command succeeded (for `run`: the workflow finished or stopped at its step bound).
pub const OK: i32 = 0;
/// Invalid configuration, missing secrets, or another setup error.
pub const INVALID: i32 = 1;
/// The workflow stopped on an unrecoverable step failure; the checkpoint still
/// points at the failed step.
pub const FATAL: i32 = 2;
/// The oracle broke the tool-invocation contract.
pub const ORACLE_PROTOCOL: i32 = 3;
