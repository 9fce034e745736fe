//! Interpretation of oracle replies into exactly one next turn.
//!
//! The oracle answers with tool invocations. Anything other than a single,
//! well-formed `python_repl` or `task_answer` invocation breaks the contract
//! and stops the run instead of guessing intent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Tool that asks the workflow to run a code snippet.
pub const PYTHON_TOOL: &str = "python_repl";
/// Tool that hands the workflow a final answer to submit.
pub const ANSWER_TOOL: &str = "task_answer";

/// One tool call as reported by an oracle backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolInvocation {
    pub fn code(source: &str) -> Self {
        Self {
            name: PYTHON_TOOL.to_string(),
            arguments: serde_json::json!({ "query": source }),
        }
    }

    pub fn answer(answer: &str) -> Self {
        Self {
            name: ANSWER_TOOL.to_string(),
            arguments: serde_json::json!({ "answer": answer }),
        }
    }
}

/// The oracle's next move, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleTurn {
    Code(String),
    Answer(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OracleProtocolError {
    #[error("oracle reply has no tool invocation")]
    NoInvocation,
    #[error("oracle reply has {0} simultaneous tool invocations")]
    MultipleInvocations(usize),
    #[error("oracle invoked unknown tool {0:?}")]
    UnknownTool(String),
    #[error("oracle invocation of {tool} lacks string argument {argument:?}")]
    MissingArgument {
        tool: &'static str,
        argument: &'static str,
    },
    #[error("oracle answered before writing any code")]
    AnswerOnFirstTurn,
}

/// Validate a reply. `first_turn` enforces that a puzzle starts with code.
pub fn interpret(
    invocations: &[ToolInvocation],
    first_turn: bool,
) -> Result<OracleTurn, OracleProtocolError> {
    let invocation = match invocations {
        [] => return Err(OracleProtocolError::NoInvocation),
        [single] => single,
        many => return Err(OracleProtocolError::MultipleInvocations(many.len())),
    };
    match invocation.name.as_str() {
        PYTHON_TOOL => string_argument(invocation, PYTHON_TOOL, "query").map(OracleTurn::Code),
        ANSWER_TOOL if first_turn => Err(OracleProtocolError::AnswerOnFirstTurn),
        ANSWER_TOOL => string_argument(invocation, ANSWER_TOOL, "answer").map(OracleTurn::Answer),
        other => Err(OracleProtocolError::UnknownTool(other.to_string())),
    }
}

fn string_argument(
    invocation: &ToolInvocation,
    tool: &'static str,
    argument: &'static str,
) -> Result<String, OracleProtocolError> {
    match invocation.arguments.get(argument) {
        Some(Value::String(text)) => Ok(text.clone()),
        // Models occasionally emit numeric answers unquoted.
        Some(Value::Number(number)) if tool == ANSWER_TOOL => Ok(number.to_string()),
        _ => Err(OracleProtocolError::MissingArgument { tool, argument }),
    }
}
