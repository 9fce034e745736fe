//! Multi-step driver with checkpointing, for `companion run` and `companion step`.

use std::ops::ControlFlow;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::state::WorkflowState;
use crate::io::checkpoint::CheckpointStore;
use crate::workflow::session::Session;
use crate::workflow::step::{StepOutcome, run_step};

/// How a loop invocation is bounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    pub workflow_id: String,
    /// Stop after this many steps in this invocation.
    pub max_steps: Option<u64>,
    /// Discard any checkpoint and start from the beginning.
    pub fresh: bool,
}

/// Reason why `run_workflow` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// The workflow reached its terminal node.
    Finished,
    /// `max_steps` steps were executed.
    MaxSteps,
    /// The `on_step` callback asked to stop.
    Interrupted,
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub steps_executed: u64,
    pub resumed: bool,
    pub stop: LoopStop,
    pub state: WorkflowState,
}

/// Snapshot to start from: the stored checkpoint unless it is missing,
/// finished, or `fresh` is requested.
pub fn initial_state(
    store: &dyn CheckpointStore,
    config: &LoopConfig,
) -> Result<(WorkflowState, bool)> {
    if config.fresh {
        store
            .clear(&config.workflow_id)
            .context("clear checkpoint")?;
        return Ok((WorkflowState::default(), false));
    }
    match store
        .load(&config.workflow_id)
        .context("load checkpoint")?
    {
        Some(state) if !state.is_finished() => Ok((state, true)),
        Some(_) => {
            debug!("previous run finished, starting over");
            Ok((WorkflowState::default(), false))
        }
        None => Ok((WorkflowState::default(), false)),
    }
}

/// Run steps until the workflow finishes, `max_steps` is reached, or
/// `on_step` breaks.
///
/// The checkpoint is written after every completed step, so a crash or a
/// failing step resumes at the step that did not complete. Step errors stop
/// the loop immediately.
pub fn run_workflow<F: FnMut(&StepOutcome) -> ControlFlow<()>>(
    session: &Session<'_>,
    store: &dyn CheckpointStore,
    config: &LoopConfig,
    mut on_step: F,
) -> Result<LoopOutcome> {
    let (mut state, resumed) = initial_state(store, config)?;
    if resumed {
        info!(next = %state.next, steps = state.steps_taken, "resuming from checkpoint");
    }

    let mut steps_executed = 0u64;
    let stop = loop {
        if state.is_finished() {
            break LoopStop::Finished;
        }
        if config.max_steps.is_some_and(|max| steps_executed >= max) {
            break LoopStop::MaxSteps;
        }

        let outcome = run_step(session, &state)?;
        store
            .save(&config.workflow_id, &outcome.state)
            .context("save checkpoint")?;
        steps_executed += 1;
        let flow = on_step(&outcome);
        state = outcome.state;
        if flow.is_break() {
            break LoopStop::Interrupted;
        }
    };

    info!(steps_executed, ?stop, "workflow loop stopped");
    Ok(LoopOutcome {
        steps_executed,
        resumed,
        stop,
        state,
    })
}
