//! Workflow nodes and the routing predicates between them.
//!
//! Routing is a pure function of the workflow state; notifications and logging
//! never influence which node runs next.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::ledger::Turn;

/// A step of the puzzle-solving workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowNode {
    #[default]
    Start,
    DiscoverPuzzles,
    TakePuzzle,
    DownloadInput,
    WriteCode,
    ExecuteCode,
    SubmitAnswer,
    CheckLeaderboard,
    End,
    /// Terminal: nothing left to run.
    Finished,
}

impl WorkflowNode {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowNode::Start => "start",
            WorkflowNode::DiscoverPuzzles => "discover_puzzles",
            WorkflowNode::TakePuzzle => "take_puzzle",
            WorkflowNode::DownloadInput => "download_input",
            WorkflowNode::WriteCode => "write_code",
            WorkflowNode::ExecuteCode => "execute_code",
            WorkflowNode::SubmitAnswer => "submit_answer",
            WorkflowNode::CheckLeaderboard => "check_leaderboard",
            WorkflowNode::End => "end",
            WorkflowNode::Finished => "finished",
        }
    }
}

impl fmt::Display for WorkflowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened in the submission step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Dedup guard stopped a repeat; no network call was made.
    Duplicate,
    /// The site judged the answer wrong.
    Rejected,
    /// The site judged the answer right.
    Accepted,
    /// The submission could not be delivered; the puzzle is dropped.
    Abandoned,
}

/// Have-puzzles: take the next queued puzzle, or wrap up.
pub fn route_have_puzzles(queue_len: usize) -> WorkflowNode {
    if queue_len > 0 {
        WorkflowNode::TakePuzzle
    } else {
        WorkflowNode::CheckLeaderboard
    }
}

/// Needs-execution: code turns run in the sandbox, answers go to submission.
pub fn route_needs_execution(last_oracle_turn: Option<&Turn>) -> WorkflowNode {
    match last_oracle_turn {
        Some(Turn::Code { .. }) => WorkflowNode::ExecuteCode,
        Some(Turn::Answer { .. }) => WorkflowNode::SubmitAnswer,
        _ => WorkflowNode::WriteCode,
    }
}

/// Answer-correctness: retry while allowed, otherwise advance.
///
/// A capped puzzle advances even if the last submission was a duplicate.
pub fn route_answer_correctness(
    outcome: SubmitOutcome,
    capped: bool,
    queue_len: usize,
) -> WorkflowNode {
    match outcome {
        SubmitOutcome::Accepted | SubmitOutcome::Abandoned => route_have_puzzles(queue_len),
        _ if capped => route_have_puzzles(queue_len),
        SubmitOutcome::Duplicate | SubmitOutcome::Rejected => WorkflowNode::WriteCode,
    }
}
