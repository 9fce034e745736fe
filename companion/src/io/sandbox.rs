//! Time-bounded execution of oracle-written code.
//!
//! Each snippet runs in a fresh interpreter process started in an empty scratch
//! directory, so it sees none of the caller's state. The deadline is enforced
//! from outside the process: when it passes, the process group is killed and
//! reaped before `run` returns. This defends against runaway loops only, not
//! against hostile code.

use std::fs;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::types::ExecutionOutcome;
use crate::io::process::run_command_with_timeout;

pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 100_000;

/// Abstraction over code execution backends.
pub trait CodeRunner {
    /// Run `source` to completion or until `timeout` elapses.
    ///
    /// Faults in the snippet are outcomes, not errors; `Err` means the runner
    /// itself could not work (e.g. the interpreter is missing).
    fn run(&self, source: &str, timeout: Duration) -> Result<ExecutionOutcome>;
}

/// Runs snippets with a Python 3 interpreter in isolated mode.
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    interpreter: String,
    output_limit_bytes: usize,
}

impl PythonSandbox {
    pub fn new(interpreter: impl Into<String>, output_limit_bytes: usize) -> Self {
        Self {
            interpreter: interpreter.into(),
            output_limit_bytes,
        }
    }
}

impl Default for PythonSandbox {
    fn default() -> Self {
        Self::new("python3", DEFAULT_OUTPUT_LIMIT_BYTES)
    }
}

impl CodeRunner for PythonSandbox {
    #[instrument(skip_all, fields(interpreter = %self.interpreter, timeout_secs = timeout.as_secs()))]
    fn run(&self, source: &str, timeout: Duration) -> Result<ExecutionOutcome> {
        let scratch = tempfile::Builder::new()
            .prefix("companion-snippet-")
            .tempdir()
            .context("create scratch dir")?;
        let script = scratch.path().join("snippet.py");
        fs::write(&script, source).with_context(|| format!("write {}", script.display()))?;

        let mut cmd = Command::new(&self.interpreter);
        // -I: isolated mode (no user site, no env vars); -B: no bytecode files.
        cmd.arg("-I")
            .arg("-B")
            .arg(&script)
            .current_dir(scratch.path());

        let output = run_command_with_timeout(cmd, None, timeout, self.output_limit_bytes)
            .with_context(|| format!("run snippet with {}", self.interpreter))?;

        if output.timed_out {
            info!("snippet timed out");
            return Ok(ExecutionOutcome::TimedOut);
        }
        if output.status.success() {
            let text = output.stdout_lossy();
            debug!(bytes = text.len(), "snippet finished");
            return Ok(ExecutionOutcome::Output {
                output: trim_output(&text),
            });
        }

        let stderr = trim_output(&output.stderr_lossy());
        warn!(exit_code = ?output.status.code(), "snippet failed");
        let error = if stderr.is_empty() {
            format!("process exited with status {:?}", output.status.code())
        } else {
            stderr
        };
        Ok(ExecutionOutcome::Error { error })
    }
}

fn trim_output(text: &str) -> String {
    text.trim_matches(|c| c == ' ' || c == '\n' || c == '\r')
        .to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn python() -> Option<PythonSandbox> {
        let available = Command::new("python3")
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false);
        if !available {
            eprintln!("python3 not found; skipping sandbox test");
        }
        available.then(PythonSandbox::default)
    }

    #[test]
    fn captures_printed_output() {
        let Some(sandbox) = python() else { return };
        let outcome = sandbox
            .run("print(sum(range(10)))\n", Duration::from_secs(10))
            .expect("run");
        assert_eq!(
            outcome,
            ExecutionOutcome::Output {
                output: "45".to_string()
            }
        );
    }

    #[test]
    fn snippet_reads_input_written_under_relative_working_dir() {
        let Some(sandbox) = python() else { return };
        let temp = tempfile::tempdir_in(".").expect("tempdir");
        let relative = std::path::Path::new(".").join(temp.path().file_name().expect("dir name"));
        let path = crate::io::input_file::write_input_file(&relative, "Day 99: Relative", b"1\n2\n3\n")
            .expect("write");

        let source = format!(
            "print(sum(int(x) for x in open({:?}).read().split()))\n",
            path.display().to_string()
        );
        let outcome = sandbox.run(&source, Duration::from_secs(10)).expect("run");
        assert_eq!(
            outcome,
            ExecutionOutcome::Output {
                output: "6".to_string()
            }
        );
    }

    #[test]
    fn snippet_sees_no_caller_bindings() {
        let Some(sandbox) = python() else { return };
        sandbox
            .run("secret = 1\n", Duration::from_secs(10))
            .expect("first run");
        let outcome = sandbox
            .run("print(secret)\n", Duration::from_secs(10))
            .expect("second run");
        match outcome {
            ExecutionOutcome::Error { error } => assert!(error.contains("NameError")),
            other => panic!("expected NameError, got {other:?}"),
        }
    }

    #[test]
    fn runtime_errors_become_error_text() {
        let Some(sandbox) = python() else { return };
        let outcome = sandbox
            .run("print('partial')\n1 / 0\n", Duration::from_secs(10))
            .expect("run");
        match outcome {
            ExecutionOutcome::Error { error } => assert!(error.contains("ZeroDivisionError")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn infinite_loop_is_killed_at_deadline() {
        let Some(sandbox) = python() else { return };
        let started = Instant::now();
        let outcome = sandbox
            .run("for i in range(10**9): pass\n", Duration::from_secs(1))
            .expect("run");
        assert_eq!(outcome, ExecutionOutcome::TimedOut);
        assert!(
            started.elapsed() <= Duration::from_secs(2),
            "took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn killed_snippet_leaves_no_worker_behind() {
        let Some(sandbox) = python() else { return };
        let scratch = tempfile::tempdir().expect("tempdir");
        let marker = scratch.path().join("alive");
        let source = format!(
            "import subprocess, time\n\
             subprocess.Popen(['sh', '-c', 'sleep 2; touch {}'])\n\
             while True: time.sleep(0.1)\n",
            marker.display()
        );
        let outcome = sandbox
            .run(&source, Duration::from_millis(500))
            .expect("run");
        assert_eq!(outcome, ExecutionOutcome::TimedOut);
        std::thread::sleep(Duration::from_secs(3));
        assert!(!marker.exists(), "grandchild survived the deadline");
    }
}
