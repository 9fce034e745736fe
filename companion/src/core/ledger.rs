//! Attempt ledger: the transcript of everything tried for the current puzzle.
//!
//! The ledger is append-only while a puzzle is in flight and replaced with an
//! empty one when the workflow moves to the next puzzle. Attempt caps and the
//! dedup guard are both answered from the answer/verdict history, never from
//! the shape of the surrounding transcript.

use serde::{Deserialize, Serialize};

use crate::core::types::ExecutionOutcome;

/// Submitted answers allowed per puzzle before it is abandoned.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Note appended when the oracle proposes an answer that was already rejected.
pub const ALREADY_TRIED_NOTE: &str =
    "This answer was already submitted and rejected. Do not repeat it; re-read the task and fix the code.";

/// Note appended after the site rejects an answer.
pub const WRONG_ANSWER_NOTE: &str =
    "The answer is wrong. There is a mistake somewhere: read the task again and rewrite the code.";

/// One entry in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "turn", rename_all = "snake_case")]
pub enum Turn {
    Code {
        source: String,
    },
    Execution {
        outcome: ExecutionOutcome,
    },
    Answer {
        answer: String,
    },
    Verdict {
        is_correct: bool,
        response: String,
    },
    /// Corrective message injected by the orchestrator.
    Note {
        text: String,
    },
}

impl Turn {
    /// Whether the oracle (rather than the orchestrator or a tool) produced this turn.
    pub fn is_oracle_turn(&self) -> bool {
        matches!(self, Turn::Code { .. } | Turn::Answer { .. })
    }
}

/// Outcome of checking a candidate answer against the submission history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Not seen before; carries the trimmed text to submit.
    Submit(String),
    /// Already submitted for this puzzle; must not be sent again.
    Duplicate(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    turns: Vec<Turn>,
}

impl Attempt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// True until the oracle has produced its first turn for this puzzle.
    pub fn is_first_oracle_turn(&self) -> bool {
        !self.turns.iter().any(Turn::is_oracle_turn)
    }

    /// Most recent oracle-produced turn.
    pub fn last_oracle_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|turn| turn.is_oracle_turn())
    }

    /// Source of the most recent code turn.
    pub fn last_code(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|turn| match turn {
            Turn::Code { source } => Some(source.as_str()),
            _ => None,
        })
    }

    /// Text of the most recent answer turn.
    pub fn last_answer(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|turn| match turn {
            Turn::Answer { answer } => Some(answer.as_str()),
            _ => None,
        })
    }

    /// Answers that were actually sent and judged, in submission order.
    ///
    /// An answer counts only once a verdict follows it; answers stopped by the
    /// dedup guard never receive one.
    pub fn submitted_answers(&self) -> Vec<&str> {
        let mut submitted = Vec::new();
        let mut pending: Option<&str> = None;
        for turn in &self.turns {
            match turn {
                Turn::Answer { answer } => pending = Some(answer.trim()),
                Turn::Verdict { .. } => {
                    if let Some(answer) = pending.take() {
                        submitted.push(answer);
                    }
                }
                _ => {}
            }
        }
        submitted
    }

    pub fn submitted_count(&self) -> u32 {
        u32::try_from(self.submitted_answers().len()).unwrap_or(u32::MAX)
    }

    /// Whether the submission cap has been reached.
    pub fn is_capped(&self, max_attempts: u32) -> bool {
        self.submitted_count() >= max_attempts
    }

    /// Dedup guard: compare the trimmed candidate against prior submissions.
    pub fn check_answer(&self, candidate: &str) -> GuardDecision {
        let candidate = candidate.trim();
        if self.submitted_answers().contains(&candidate) {
            GuardDecision::Duplicate(candidate.to_string())
        } else {
            GuardDecision::Submit(candidate.to_string())
        }
    }
}
