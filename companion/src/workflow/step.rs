//! Execution of a single workflow step.
//!
//! A step reads the current snapshot, performs exactly one node's work, and
//! returns the next snapshot. Recoverable failures (unreachable pages, a
//! submission that cannot be delivered) are folded into the snapshot as a
//! comment plus a routing decision. Only oracle failures and runner failures
//! surface as `Err`, in which case the input snapshot is left untouched.

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::ledger::{ALREADY_TRIED_NOTE, GuardDecision, Turn, WRONG_ANSWER_NOTE};
use crate::core::oracle_reply::{OracleTurn, interpret};
use crate::core::routing::{
    SubmitOutcome, WorkflowNode, route_answer_correctness, route_have_puzzles,
    route_needs_execution,
};
use crate::core::state::WorkflowState;
use crate::core::types::{ExecutionOutcome, PuzzleDetail};
use crate::io::input_file::write_input_file;
use crate::io::notify::notify_best_effort;
use crate::io::oracle::OracleRequest;
use crate::workflow::session::Session;

/// Result of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Node that ran.
    pub node: WorkflowNode,
    /// Snapshot after the step; `state.next` is the node to run next.
    pub state: WorkflowState,
}

/// Run the node named by `state.next`.
#[instrument(skip_all, fields(node = %state.next, step = state.steps_taken + 1))]
pub fn run_step(session: &Session<'_>, state: &WorkflowState) -> Result<StepOutcome> {
    let node = state.next;
    let mut next = state.clone();
    let comment = match node {
        WorkflowNode::Start => start(&mut next),
        WorkflowNode::DiscoverPuzzles => discover_puzzles(session, &mut next),
        WorkflowNode::TakePuzzle => take_puzzle(session, &mut next),
        WorkflowNode::DownloadInput => download_input(session, &mut next)?,
        WorkflowNode::WriteCode => write_code(session, &mut next)?,
        WorkflowNode::ExecuteCode => execute_code(session, &mut next)?,
        WorkflowNode::SubmitAnswer => submit_answer(session, &mut next)?,
        WorkflowNode::CheckLeaderboard => check_leaderboard(session, &mut next),
        WorkflowNode::End => end(&mut next),
        WorkflowNode::Finished => return Err(anyhow!("workflow already finished")),
    };
    next.steps_taken += 1;
    info!(next = %next.next, comment = %comment, "step complete");
    publish(session, &mut next, comment);
    Ok(StepOutcome { node, state: next })
}

fn publish(session: &Session<'_>, state: &mut WorkflowState, comment: String) {
    notify_best_effort(session.notifier, &comment);
    state.last_comment = comment;
}

fn current_puzzle(state: &WorkflowState) -> Result<PuzzleDetail> {
    state
        .current_puzzle
        .clone()
        .ok_or_else(|| anyhow!("no current puzzle in state at {}", state.next))
}

/// Abandon the current puzzle and route to the next one.
fn skip_puzzle(state: &mut WorkflowState) {
    state.drop_puzzle();
    state.next = route_have_puzzles(state.queue.len());
}

fn start(state: &mut WorkflowState) -> String {
    state.next = WorkflowNode::DiscoverPuzzles;
    "Starting to solve puzzles".to_string()
}

fn discover_puzzles(session: &Session<'_>, state: &mut WorkflowState) -> String {
    let comment = match session.site.calendar() {
        Ok(calendar) => {
            state.queue = calendar.todo_locators().into();
            format!(
                "Found {} puzzles to solve ({calendar})",
                state.queue.len()
            )
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "calendar unavailable");
            state.queue.clear();
            format!("Could not load the calendar: {err:#}")
        }
    };
    state.next = route_have_puzzles(state.queue.len());
    comment
}

fn take_puzzle(session: &Session<'_>, state: &mut WorkflowState) -> String {
    state.drop_puzzle();
    let Some(locator) = state.queue.pop_front() else {
        state.next = route_have_puzzles(0);
        return "No puzzles left".to_string();
    };
    match session.site.puzzle(&locator) {
        Ok(puzzle) => {
            let comment = format!("Solving {} (part {})", puzzle.name, puzzle.level);
            state.current_puzzle = Some(puzzle);
            state.next = WorkflowNode::DownloadInput;
            comment
        }
        Err(err) => {
            warn!(%locator, error = %format!("{err:#}"), "puzzle unavailable, skipping");
            skip_puzzle(state);
            format!("Skipping {locator}: {err:#}")
        }
    }
}

fn download_input(session: &Session<'_>, state: &mut WorkflowState) -> Result<String> {
    let puzzle = current_puzzle(state)?;
    let written = session
        .site
        .download_input(&puzzle)
        .and_then(|raw| write_input_file(&session.settings.working_dir, &puzzle.name, &raw));
    Ok(match written {
        Ok(path) => {
            let comment = format!("Input saved to {}", path.display());
            state.input_file_path = Some(path);
            state.next = WorkflowNode::WriteCode;
            comment
        }
        Err(err) => {
            warn!(puzzle = %puzzle.name, error = %format!("{err:#}"), "input unavailable, skipping");
            skip_puzzle(state);
            format!("Skipping {}: could not get input: {err:#}", puzzle.name)
        }
    })
}

fn write_code(session: &Session<'_>, state: &mut WorkflowState) -> Result<String> {
    let puzzle = current_puzzle(state)?;
    let input_file_path = state
        .input_file_path
        .clone()
        .ok_or_else(|| anyhow!("no input file recorded for {}", puzzle.name))?;
    let first_turn = state.attempt.is_first_oracle_turn();
    let invocations = session
        .oracle
        .next_turn(&OracleRequest {
            puzzle: &puzzle,
            input_file_path: &input_file_path,
            transcript: state.attempt.turns(),
            require_code: first_turn,
        })
        .with_context(|| format!("ask oracle about {}", puzzle.name))?;

    let comment = match interpret(&invocations, first_turn) {
        Ok(OracleTurn::Code(source)) => {
            let comment = format!("Code written ({} lines)", source.lines().count());
            state.attempt.push(Turn::Code { source });
            comment
        }
        Ok(OracleTurn::Answer(answer)) => {
            let comment = format!("Proposed answer: {answer}");
            state.attempt.push(Turn::Answer { answer });
            comment
        }
        Err(err) => {
            let comment = format!("Stopping: the oracle broke protocol on {}: {err}", puzzle.name);
            warn!(error = %err, "oracle protocol violation");
            notify_best_effort(session.notifier, &comment);
            return Err(err).context(comment);
        }
    };
    state.next = route_needs_execution(state.attempt.last_oracle_turn());
    Ok(comment)
}

fn execute_code(session: &Session<'_>, state: &mut WorkflowState) -> Result<String> {
    let Some(source) = state.attempt.last_code().map(str::to_string) else {
        state.next = WorkflowNode::WriteCode;
        return Ok("No code to run".to_string());
    };
    let outcome = session
        .runner
        .run(&source, session.settings.exec_timeout)
        .context("run code")?;
    let comment = match &outcome {
        ExecutionOutcome::Output { output } => format!("Code printed: {}", preview(output)),
        ExecutionOutcome::TimedOut => format!(
            "Code timed out after {}s",
            session.settings.exec_timeout.as_secs()
        ),
        ExecutionOutcome::Error { error } => format!("Code failed: {}", preview(error)),
    };
    state.attempt.push(Turn::Execution { outcome });
    state.next = WorkflowNode::WriteCode;
    Ok(comment)
}

fn submit_answer(session: &Session<'_>, state: &mut WorkflowState) -> Result<String> {
    let puzzle = current_puzzle(state)?;
    let Some(candidate) = state.attempt.last_answer().map(str::to_string) else {
        state.next = WorkflowNode::WriteCode;
        return Ok("No answer to submit".to_string());
    };

    let (outcome, mut comment) = match state.attempt.check_answer(&candidate) {
        GuardDecision::Duplicate(answer) => {
            info!(%answer, "answer already rejected, not resubmitting");
            state.attempt.push(Turn::Note {
                text: ALREADY_TRIED_NOTE.to_string(),
            });
            (
                SubmitOutcome::Duplicate,
                format!("Answer {answer} was already tried"),
            )
        }
        GuardDecision::Submit(answer) => match session.site.submit(&puzzle, &answer) {
            Ok(result) => {
                let is_correct = result.is_correct;
                state.attempt.push(Turn::Verdict {
                    is_correct,
                    response: result.full_text.clone(),
                });
                if is_correct {
                    if puzzle.level == 1 && session.settings.follow_up_part_two {
                        state.queue.push_front(puzzle.locator.clone());
                    }
                    (
                        SubmitOutcome::Accepted,
                        format!("{} part {}: {answer} is correct", puzzle.name, puzzle.level),
                    )
                } else {
                    state.attempt.push(Turn::Note {
                        text: WRONG_ANSWER_NOTE.to_string(),
                    });
                    (
                        SubmitOutcome::Rejected,
                        format!("{}: {answer} is wrong: {}", puzzle.name, result.full_text),
                    )
                }
            }
            Err(err) => {
                warn!(puzzle = %puzzle.name, error = %format!("{err:#}"), "submission failed, abandoning puzzle");
                (
                    SubmitOutcome::Abandoned,
                    format!("Could not submit {answer} for {}: {err:#}", puzzle.name),
                )
            }
        },
    };

    let capped = state.attempt.is_capped(session.settings.max_attempts);
    state.next = route_answer_correctness(outcome, capped, state.queue.len());
    if state.next != WorkflowNode::WriteCode {
        if capped && outcome != SubmitOutcome::Accepted {
            comment.push_str(&format!(
                "; giving up after {} attempts",
                state.attempt.submitted_count()
            ));
        }
        state.drop_puzzle();
    }
    Ok(comment)
}

fn check_leaderboard(session: &Session<'_>, state: &mut WorkflowState) -> String {
    state.next = WorkflowNode::End;
    let Some(id) = session.settings.leaderboard_id else {
        return "No leaderboard configured".to_string();
    };
    match session.site.leaderboard(id) {
        Ok(board) => format!("Leaderboard: {board}"),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "leaderboard unavailable");
            format!("Leaderboard unavailable: {err:#}")
        }
    }
}

fn end(state: &mut WorkflowState) -> String {
    state.next = WorkflowNode::Finished;
    let previous = state.last_comment.trim();
    if previous.is_empty() {
        "Finished solving puzzles".to_string()
    } else {
        format!("Finished solving puzzles. {previous}")
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{head}...")
    }
}
