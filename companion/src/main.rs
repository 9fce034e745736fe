//! Command-line entry point for the puzzle companion.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

use companion::core::oracle_reply::OracleProtocolError;
use companion::exit_codes;
use companion::io::checkpoint::{CheckpointStore, FileCheckpointStore};
use companion::io::config::{CompanionConfig, DEFAULT_CONFIG_FILE, load_config, write_config};
use companion::logging;
use companion::workflow::looping::{LoopConfig, LoopStop, run_workflow};
use companion::workflow::session::{
    Session, Settings, build_notifier, build_oracle, build_runner, build_site,
};

#[derive(Parser)]
#[command(
    name = "companion",
    version,
    about = "Solve daily calendar puzzles with an oracle, a sandbox and a resumable workflow"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the workflow until it finishes, resuming from the last checkpoint.
    Run {
        /// Ignore any checkpoint and start from the beginning.
        #[arg(long)]
        fresh: bool,
        /// Stop after this many steps.
        #[arg(long)]
        max_steps: Option<u64>,
    },
    /// Run exactly one workflow step.
    Step,
    /// Show the stored checkpoint.
    Status,
    /// Print the calendar classification.
    Calendar,
    /// Print a private leaderboard.
    Leaderboard {
        /// Leaderboard id; defaults to the configured one.
        #[arg(long)]
        id: Option<u64>,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run { fresh, max_steps } => cmd_run(&cli.config, fresh, max_steps),
        Command::Step => cmd_run(&cli.config, false, Some(1)),
        Command::Status => cmd_status(&cli.config),
        Command::Calendar => cmd_calendar(&cli.config),
        Command::Leaderboard { id } => cmd_leaderboard(&cli.config, id),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &CompanionConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(path: &Path, fresh: bool, max_steps: Option<u64>) -> Result<i32> {
    let cfg = load_config(path)?;
    let site = build_site(&cfg)?;
    let oracle = build_oracle(&cfg)?;
    let runner = build_runner(&cfg);
    let notifier = build_notifier(&cfg);
    let session = Session {
        site: site.as_ref(),
        oracle: oracle.as_ref(),
        runner: runner.as_ref(),
        notifier: notifier.as_ref(),
        settings: Settings::from_config(&cfg),
    };
    let store = FileCheckpointStore::new(&cfg.state_dir);
    let loop_config = LoopConfig {
        workflow_id: cfg.workflow_id.clone(),
        max_steps,
        fresh,
    };

    let result = run_workflow(&session, &store, &loop_config, |step| {
        println!("[{}] {}", step.node, step.state.last_comment);
        ControlFlow::Continue(())
    });
    match result {
        Ok(outcome) => {
            if outcome.stop != LoopStop::Finished {
                println!(
                    "paused before {} after {} steps; run again to continue",
                    outcome.state.next, outcome.steps_executed
                );
            }
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("{err:#}");
            if err.downcast_ref::<OracleProtocolError>().is_some() {
                Ok(exit_codes::ORACLE_PROTOCOL)
            } else {
                Ok(exit_codes::FATAL)
            }
        }
    }
}

fn cmd_status(path: &Path) -> Result<i32> {
    let cfg = load_config(path)?;
    let store = FileCheckpointStore::new(&cfg.state_dir);
    let Some(state) = store.load(&cfg.workflow_id)? else {
        println!("no checkpoint for workflow {}", cfg.workflow_id);
        return Ok(exit_codes::OK);
    };
    println!("workflow: {}", cfg.workflow_id);
    println!("next: {}", state.next);
    println!("steps taken: {}", state.steps_taken);
    println!("queued puzzles: {}", state.queue.len());
    if let Some(puzzle) = &state.current_puzzle {
        println!(
            "current puzzle: {} (part {}), {} answers submitted",
            puzzle.name,
            puzzle.level,
            state.attempt.submitted_count()
        );
    }
    println!("last comment: {}", state.last_comment);
    Ok(exit_codes::OK)
}

fn cmd_calendar(path: &Path) -> Result<i32> {
    let cfg = load_config(path)?;
    let calendar = build_site(&cfg)?.calendar()?;
    println!("{calendar}");
    for locator in calendar.todo_locators() {
        println!("  todo: {locator}");
    }
    Ok(exit_codes::OK)
}

fn cmd_leaderboard(path: &Path, id: Option<u64>) -> Result<i32> {
    let cfg = load_config(path)?;
    let Some(id) = id.or(cfg.leaderboard_id) else {
        bail!("no leaderboard id given and none configured");
    };
    let board = build_site(&cfg)?.leaderboard(id)?;
    for leader in &board.leaders {
        let rank = leader.rank.map_or_else(|| "-".to_string(), |r| r.to_string());
        println!("{rank:>4} {:>6} {}", leader.score, leader.name);
    }
    println!("{board}");
    Ok(exit_codes::OK)
}
