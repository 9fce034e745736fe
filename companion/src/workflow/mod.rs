//! Orchestration: one step at a time, or a checkpointed loop of steps.

pub mod looping;
pub mod session;
pub mod step;
