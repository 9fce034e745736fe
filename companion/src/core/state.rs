//! Serializable workflow snapshot.

use std::collections::VecDeque;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::ledger::Attempt;
use crate::core::routing::WorkflowNode;
use crate::core::types::PuzzleDetail;

/// Everything the workflow needs to continue after a restart.
///
/// `next` names the step that runs on resume; every other field is the state
/// that step reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub next: WorkflowNode,
    /// Locators still to be attempted, front first.
    pub queue: VecDeque<String>,
    pub current_puzzle: Option<PuzzleDetail>,
    pub input_file_path: Option<PathBuf>,
    pub attempt: Attempt,
    /// Human-readable summary of the most recent step.
    pub last_comment: String,
    pub steps_taken: u64,
}

impl WorkflowState {
    pub fn is_finished(&self) -> bool {
        self.next == WorkflowNode::Finished
    }

    /// Forget the current puzzle and its transcript.
    pub fn drop_puzzle(&mut self) {
        self.current_puzzle = None;
        self.input_file_path = None;
        self.attempt = Attempt::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::Turn;

    #[test]
    fn default_state_starts_at_start() {
        let state = WorkflowState::default();
        assert_eq!(state.next, WorkflowNode::Start);
        assert!(!state.is_finished());
        assert!(state.queue.is_empty());
    }

    #[test]
    fn drop_puzzle_clears_transcript_but_keeps_queue() {
        let mut state = WorkflowState {
            queue: VecDeque::from(["https://x/2024/day/2".to_string()]),
            input_file_path: Some(PathBuf::from("INPUT(x).txt")),
            ..WorkflowState::default()
        };
        state.attempt.push(Turn::Note {
            text: "n".to_string(),
        });
        state.drop_puzzle();
        assert!(state.attempt.turns().is_empty());
        assert!(state.input_file_path.is_none());
        assert_eq!(state.queue.len(), 1);
    }

    #[test]
    fn snapshot_json_uses_snake_case_nodes() {
        let state = WorkflowState {
            next: WorkflowNode::SubmitAnswer,
            ..WorkflowState::default()
        };
        let json = serde_json::to_value(&state).expect("serialize");
        assert_eq!(json["next"], "submit_answer");
        let back: WorkflowState = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, state);
    }
}
