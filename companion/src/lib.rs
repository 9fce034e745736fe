//! Unattended solver for daily calendar puzzles.
//!
//! The crate drives a resumable workflow: discover unsolved puzzles on the
//! calendar, fetch each puzzle and its input, let an oracle write code, run that
//! code under a hard deadline, and submit answers while honoring the site's
//! rate limits. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (parsing, rate-limit
//!   classification, the attempt ledger, routing). No I/O.
//! - **[`io`]**: Side-effecting adapters (HTTP, subprocesses, files, oracle
//!   and notification backends), each behind a trait so tests can script it.
//! - **[`workflow`]**: Steps and the checkpointed loop that ties the two
//!   together.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
