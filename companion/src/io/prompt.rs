//! Prompt rendering for oracle requests.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::types::ExecutionOutcome;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const TASK_TEMPLATE: &str = include_str!("prompts/task.md");

/// Puzzle facts the task prompt is rendered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPrompt<'a> {
    pub task_description: &'a str,
    pub input_file_path: &'a str,
    pub question: &'a str,
    /// First turn of a puzzle: the oracle must start with code.
    pub require_code: bool,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("system template")?;
        env.add_template("task", TASK_TEMPLATE)
            .context("task template")?;
        Ok(Self { env })
    }

    pub fn render_system(&self) -> Result<String> {
        let template = self.env.get_template("system")?;
        Ok(template.render(context! {})?.trim().to_string())
    }

    pub fn render_task(&self, task: &TaskPrompt<'_>) -> Result<String> {
        let template = self.env.get_template("task")?;
        let rendered = template.render(context! {
            task_description => task.task_description.trim(),
            input_file_path => task.input_file_path,
            question => task.question.trim(),
            require_code => task.require_code,
        })?;
        Ok(rendered.trim().to_string())
    }
}

/// Text the oracle sees as the result of running its code.
pub fn execution_report(outcome: &ExecutionOutcome) -> String {
    match outcome {
        ExecutionOutcome::Output { output } if output.is_empty() => {
            "The program printed nothing.".to_string()
        }
        ExecutionOutcome::Output { output } => output.clone(),
        ExecutionOutcome::TimedOut => {
            "Execution timed out. The program is too slow; find a faster algorithm.".to_string()
        }
        ExecutionOutcome::Error { error } => format!("Execution failed:\n{error}"),
    }
}
