//! Scripted collaborators for exercising the workflow without network,
//! interpreter or model access.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::oracle_reply::ToolInvocation;
use crate::core::state::WorkflowState;
use crate::core::types::{
    Day, ExecutionOutcome, LeaderboardResult, PuzzleCalendar, PuzzleDetail, SubmissionResult,
};
use crate::io::checkpoint::CheckpointStore;
use crate::io::fetch::{FetchError, HttpRequest, HttpResponse, Sleeper, Transport};
use crate::io::notify::Notifier;
use crate::io::oracle::{Oracle, OracleRequest};
use crate::io::sandbox::CodeRunner;
use crate::io::site::PuzzleSite;

pub const BASE: &str = "https://adventofcode.com/2024";

pub fn locator(day: Day) -> String {
    format!("{BASE}/day/{day}")
}

/// Deterministic first-half puzzle for `day`.
pub fn puzzle(day: Day) -> PuzzleDetail {
    PuzzleDetail {
        name: format!("Day {day}: Fixture"),
        description: format!("--- Day {day}: Fixture ---\nAdd up the numbers."),
        question: "What is the sum?".to_string(),
        locator: locator(day),
        level: 1,
    }
}

/// Calendar with the given unsolved and half-solved days.
pub fn calendar(unsolved: &[Day], partially_solved: &[Day]) -> PuzzleCalendar {
    let bucket = |days: &[Day]| -> BTreeMap<Day, String> {
        days.iter().map(|&day| (day, locator(day))).collect()
    };
    PuzzleCalendar {
        unsolved: bucket(unsolved),
        partially_solved: bucket(partially_solved),
        ..PuzzleCalendar::default()
    }
}

/// Transport that replays queued responses and records every request.
pub struct ScriptedTransport {
    responses: RefCell<VecDeque<Result<HttpResponse>>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<HttpResponse>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted response for {}", request.url)))
    }
}

/// Sleeper that returns immediately and remembers what it was asked to wait.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

/// One recorded submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub locator: String,
    pub level: u8,
    pub answer: String,
}

fn unreachable_site(url: &str) -> anyhow::Error {
    FetchError::Exhausted {
        url: url.to_string(),
        attempts: 5,
        last_error: "HTTP status 500".to_string(),
    }
    .into()
}

/// In-memory puzzle site.
///
/// Puzzles advance from level 1 to level 2 when their first answer is
/// accepted, like the real site.
#[derive(Default)]
pub struct ScriptedSite {
    calendar: Option<PuzzleCalendar>,
    puzzles: HashMap<String, PuzzleDetail>,
    inputs: HashMap<String, Vec<u8>>,
    solutions: HashMap<(String, u8), String>,
    failing_submissions: HashSet<String>,
    leaderboard: Option<LeaderboardResult>,
    solved: RefCell<HashMap<String, u8>>,
    submissions: RefCell<Vec<Submission>>,
    puzzle_fetches: RefCell<Vec<String>>,
}

impl ScriptedSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_calendar(mut self, calendar: PuzzleCalendar) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Register a puzzle page and a default input for it.
    pub fn with_puzzle(mut self, puzzle: PuzzleDetail) -> Self {
        self.inputs
            .insert(puzzle.input_locator(), b"1\n2\n3\n".to_vec());
        self.puzzles.insert(puzzle.locator.clone(), puzzle);
        self
    }

    pub fn without_input(mut self, puzzle_locator: &str) -> Self {
        self.inputs
            .remove(&format!("{}/input", puzzle_locator.trim_end_matches('/')));
        self
    }

    pub fn with_solution(mut self, puzzle_locator: &str, level: u8, answer: &str) -> Self {
        self.solutions
            .insert((puzzle_locator.to_string(), level), answer.to_string());
        self
    }

    pub fn failing_submission(mut self, puzzle_locator: &str) -> Self {
        self.failing_submissions.insert(puzzle_locator.to_string());
        self
    }

    pub fn with_leaderboard(mut self, leaderboard: LeaderboardResult) -> Self {
        self.leaderboard = Some(leaderboard);
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.borrow().clone()
    }

    pub fn puzzle_fetches(&self) -> Vec<String> {
        self.puzzle_fetches.borrow().clone()
    }
}

impl PuzzleSite for ScriptedSite {
    fn calendar(&self) -> Result<PuzzleCalendar> {
        self.calendar
            .clone()
            .ok_or_else(|| unreachable_site(BASE))
    }

    fn puzzle(&self, locator: &str) -> Result<PuzzleDetail> {
        self.puzzle_fetches.borrow_mut().push(locator.to_string());
        let mut detail = self
            .puzzles
            .get(locator)
            .cloned()
            .ok_or_else(|| unreachable_site(locator))?;
        let solved = self.solved.borrow().get(locator).copied().unwrap_or(0);
        detail.level = (solved + 1).min(2);
        Ok(detail)
    }

    fn download_input(&self, puzzle: &PuzzleDetail) -> Result<Vec<u8>> {
        let url = puzzle.input_locator();
        self.inputs
            .get(&url)
            .cloned()
            .ok_or_else(|| unreachable_site(&url))
    }

    fn submit(&self, puzzle: &PuzzleDetail, answer: &str) -> Result<SubmissionResult> {
        if self.failing_submissions.contains(&puzzle.locator) {
            return Err(unreachable_site(&puzzle.submit_locator()));
        }
        self.submissions.borrow_mut().push(Submission {
            locator: puzzle.locator.clone(),
            level: puzzle.level,
            answer: answer.to_string(),
        });
        let expected = self.solutions.get(&(puzzle.locator.clone(), puzzle.level));
        if expected.is_some_and(|expected| expected == answer) {
            self.solved
                .borrow_mut()
                .insert(puzzle.locator.clone(), puzzle.level);
            Ok(SubmissionResult {
                is_correct: true,
                full_text: "That's the right answer! You are one gold star closer.".to_string(),
            })
        } else {
            Ok(SubmissionResult {
                is_correct: false,
                full_text: "That's not the right answer. Please wait one minute before trying again."
                    .to_string(),
            })
        }
    }

    fn leaderboard(&self, _leaderboard_id: u64) -> Result<LeaderboardResult> {
        self.leaderboard
            .clone()
            .ok_or_else(|| anyhow!("leaderboard unavailable"))
    }
}

/// What a [`ScriptedOracle`] saw for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub puzzle_locator: String,
    pub level: u8,
    pub transcript_len: usize,
    pub require_code: bool,
}

/// Oracle that replays queued replies.
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<Result<Vec<ToolInvocation>>>>,
    seen: RefCell<Vec<SeenRequest>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<Result<Vec<ToolInvocation>>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            seen: RefCell::new(Vec::new()),
        }
    }

    /// Replies that each contain exactly one invocation.
    pub fn single(invocations: Vec<ToolInvocation>) -> Self {
        Self::new(invocations.into_iter().map(|i| Ok(vec![i])).collect())
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl Oracle for ScriptedOracle {
    fn next_turn(&self, request: &OracleRequest<'_>) -> Result<Vec<ToolInvocation>> {
        self.seen.borrow_mut().push(SeenRequest {
            puzzle_locator: request.puzzle.locator.clone(),
            level: request.puzzle.level,
            transcript_len: request.transcript.len(),
            require_code: request.require_code,
        });
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("oracle script exhausted")))
    }
}

/// Code runner that prints a fixed answer per source text.
#[derive(Default)]
pub struct ScriptedRunner {
    outcomes: HashMap<String, ExecutionOutcome>,
    runs: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(mut self, source: &str, outcome: ExecutionOutcome) -> Self {
        self.outcomes.insert(source.to_string(), outcome);
        self
    }

    pub fn runs(&self) -> Vec<String> {
        self.runs.borrow().clone()
    }
}

impl CodeRunner for ScriptedRunner {
    fn run(&self, source: &str, _timeout: Duration) -> Result<ExecutionOutcome> {
        self.runs.borrow_mut().push(source.to_string());
        Ok(self
            .outcomes
            .get(source)
            .cloned()
            .unwrap_or(ExecutionOutcome::Output {
                output: String::new(),
            }))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: RefCell<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, text: &str) -> Result<()> {
        self.messages.borrow_mut().push(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCheckpointStore {
    states: RefCell<HashMap<String, WorkflowState>>,
    saves: RefCell<u32>,
}

impl MemoryCheckpointStore {
    pub fn saves(&self) -> u32 {
        *self.saves.borrow()
    }

    pub fn get(&self, workflow_id: &str) -> Option<WorkflowState> {
        self.states.borrow().get(workflow_id).cloned()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, workflow_id: &str, state: &WorkflowState) -> Result<()> {
        *self.saves.borrow_mut() += 1;
        self.states
            .borrow_mut()
            .insert(workflow_id.to_string(), state.clone());
        Ok(())
    }

    fn load(&self, workflow_id: &str) -> Result<Option<WorkflowState>> {
        Ok(self.get(workflow_id))
    }

    fn clear(&self, workflow_id: &str) -> Result<()> {
        self.states.borrow_mut().remove(workflow_id);
        Ok(())
    }
}
