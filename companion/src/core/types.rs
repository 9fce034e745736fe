//! Shared deterministic types for the puzzle-solving core.
//!
//! These types define stable contracts between the parser, the ledger and the
//! orchestrator. They carry no I/O and serialize to stable JSON so workflow
//! snapshots survive restarts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Day number on the puzzle calendar.
pub type Day = u32;

/// Released/unreleased status of every day on the calendar.
///
/// The three solved-state maps partition the released days: a day appears in
/// at most one of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleCalendar {
    pub fully_solved: BTreeMap<Day, String>,
    pub partially_solved: BTreeMap<Day, String>,
    pub unsolved: BTreeMap<Day, String>,
    pub not_released: BTreeSet<Day>,
}

impl PuzzleCalendar {
    /// Whether `day` has already been placed in any bucket.
    pub fn contains(&self, day: Day) -> bool {
        self.fully_solved.contains_key(&day)
            || self.partially_solved.contains_key(&day)
            || self.unsolved.contains_key(&day)
            || self.not_released.contains(&day)
    }

    /// Locators still worth working on: unsolved days first, then days with
    /// only the first half solved. Each group is in day order.
    pub fn todo_locators(&self) -> Vec<String> {
        self.unsolved
            .values()
            .chain(self.partially_solved.values())
            .cloned()
            .collect()
    }
}

impl fmt::Display for PuzzleCalendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fully solved: {}, partially solved: {}, unsolved: {}, not released: {}",
            self.fully_solved.len(),
            self.partially_solved.len(),
            self.unsolved.len(),
            self.not_released.len()
        )
    }
}

/// One puzzle page, parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleDetail {
    pub name: String,
    pub description: String,
    pub question: String,
    /// Canonical day URL; the input and answer URLs are derived from it.
    pub locator: String,
    /// 1 = first half open, 2 = first half solved and second half open.
    pub level: u8,
}

impl PuzzleDetail {
    pub fn input_locator(&self) -> String {
        join_locator(&self.locator, "input")
    }

    pub fn submit_locator(&self) -> String {
        join_locator(&self.locator, "answer")
    }
}

impl fmt::Display for PuzzleDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: String = self.description.chars().take(100).collect();
        writeln!(f, "locator: {}", self.locator)?;
        writeln!(f, "name: {}", self.name)?;
        writeln!(f, "description: {preview:?}...")?;
        writeln!(f, "question: {}", self.question)?;
        write!(f, "level: {}", self.level)
    }
}

fn join_locator(base: &str, suffix: &str) -> String {
    format!("{}/{suffix}", base.trim_end_matches('/'))
}

/// The site's verdict on one submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub is_correct: bool,
    pub full_text: String,
}

/// One participant row of a private leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leader {
    pub name: String,
    pub rank: Option<u32>,
    pub score: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardResult {
    pub leaders: Vec<Leader>,
    pub my_rank: Option<u32>,
    pub my_score: Option<u64>,
}

impl fmt::Display for LeaderboardResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let top: Vec<String> = self
            .leaders
            .iter()
            .take(5)
            .map(|leader| match leader.rank {
                Some(rank) => format!("#{rank} {} ({})", leader.name, leader.score),
                None => format!("{} ({})", leader.name, leader.score),
            })
            .collect();
        write!(
            f,
            "top: {} | my rank: {} | my score: {}",
            top.join(", "),
            display_opt(self.my_rank),
            display_opt(self.my_score)
        )
    }
}

fn display_opt<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Result of running one code snippet in the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Output { output: String },
    TimedOut,
    Error { error: String },
}
