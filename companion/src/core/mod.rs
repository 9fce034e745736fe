//! Deterministic, pure logic shared by the workflow.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and markup strings and return deterministic outputs suitable for tests.

pub mod backoff;
pub mod ledger;
pub mod oracle_reply;
pub mod parser;
pub mod rate_limit;
pub mod routing;
pub mod state;
pub mod types;
