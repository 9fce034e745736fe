//! Oracle backends: whatever writes code and proposes answers.
//!
//! A backend returns the raw tool invocations of one reply. Validation of the
//! reply happens in [`crate::core::oracle_reply::interpret`], so every backend
//! is held to the same contract.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::core::ledger::Turn;
use crate::core::oracle_reply::{ANSWER_TOOL, PYTHON_TOOL, ToolInvocation};
use crate::core::types::PuzzleDetail;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::{PromptEngine, TaskPrompt, execution_report};

/// Everything an oracle sees when asked for its next move.
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    pub puzzle: &'a PuzzleDetail,
    pub input_file_path: &'a Path,
    /// Turns so far for this puzzle, oldest first.
    pub transcript: &'a [Turn],
    /// No code has been written yet, so an answer would be premature.
    pub require_code: bool,
}

impl OracleRequest<'_> {
    fn task_prompt<'b>(&'b self, input_file_path: &'b str) -> TaskPrompt<'b> {
        TaskPrompt {
            task_description: &self.puzzle.description,
            input_file_path,
            question: &self.puzzle.question,
            require_code: self.require_code,
        }
    }
}

pub trait Oracle {
    /// One reply's tool invocations. `Err` means the oracle could not be
    /// reached; a malformed reply is returned as-is for the caller to reject.
    fn next_turn(&self, request: &OracleRequest<'_>) -> Result<Vec<ToolInvocation>>;
}

fn tool_definitions() -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": PYTHON_TOOL,
                "description": "Run a complete Python 3 program and return what it printed.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Full program source." }
                    },
                    "required": ["query"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": ANSWER_TOOL,
                "description": "Submit the final answer to the puzzle.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "answer": { "type": "string", "description": "The exact answer value." }
                    },
                    "required": ["answer"]
                }
            }
        }
    ])
}

/// Render system prompt, task prompt and transcript as chat-completions messages.
///
/// Oracle turns become assistant tool calls; execution results, verdicts and
/// notes answer the pending call. A note with no pending call is a user message.
fn chat_messages(system: &str, task: &str, transcript: &[Turn]) -> Vec<Value> {
    let mut messages = vec![
        json!({ "role": "system", "content": system }),
        json!({ "role": "user", "content": task }),
    ];
    let mut pending: Option<String> = None;
    for (index, turn) in transcript.iter().enumerate() {
        let reply = match turn {
            Turn::Code { source } => {
                close_pending(&mut messages, &mut pending);
                let id = format!("call_{index}");
                messages.push(tool_call(&id, PYTHON_TOOL, json!({ "query": source })));
                pending = Some(id);
                continue;
            }
            Turn::Answer { answer } => {
                close_pending(&mut messages, &mut pending);
                let id = format!("call_{index}");
                messages.push(tool_call(&id, ANSWER_TOOL, json!({ "answer": answer })));
                pending = Some(id);
                continue;
            }
            Turn::Execution { outcome } => execution_report(outcome),
            Turn::Verdict { response, .. } => response.clone(),
            Turn::Note { text } => text.clone(),
        };
        match pending.take() {
            Some(id) => messages.push(tool_result(&id, &reply)),
            None => messages.push(json!({ "role": "user", "content": reply })),
        }
    }
    close_pending(&mut messages, &mut pending);
    messages
}

fn tool_call(id: &str, name: &str, arguments: Value) -> Value {
    json!({
        "role": "assistant",
        "content": Value::Null,
        "tool_calls": [{
            "id": id,
            "type": "function",
            "function": { "name": name, "arguments": arguments.to_string() }
        }]
    })
}

fn tool_result(id: &str, content: &str) -> Value {
    json!({ "role": "tool", "tool_call_id": id, "content": content })
}

// The API rejects a tool call without a reply.
fn close_pending(messages: &mut Vec<Value>, pending: &mut Option<String>) {
    if let Some(id) = pending.take() {
        messages.push(tool_result(&id, "No result was recorded."));
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    function: ChatFunction,
}

#[derive(Debug, Deserialize)]
struct ChatFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl ChatToolCall {
    fn into_invocation(self) -> ToolInvocation {
        // Unparseable arguments stay visible to the validator as a bare string.
        let arguments = serde_json::from_str(&self.function.arguments)
            .unwrap_or(Value::String(self.function.arguments));
        ToolInvocation {
            name: self.function.name,
            arguments,
        }
    }
}

/// OpenAI-compatible chat-completions backend.
pub struct OpenAiOracle {
    client: Client,
    endpoint: String,
    model: String,
    prompts: PromptEngine,
}

impl OpenAiOracle {
    pub fn new(api_base: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .context("api key is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("build oracle http client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            model: model.to_string(),
            prompts: PromptEngine::new()?,
        })
    }

    fn request_body(&self, request: &OracleRequest<'_>) -> Result<Value> {
        let input_path = request.input_file_path.display().to_string();
        let system = self.prompts.render_system()?;
        let task = self.prompts.render_task(&request.task_prompt(&input_path))?;
        let tool_choice = if request.require_code {
            json!({ "type": "function", "function": { "name": PYTHON_TOOL } })
        } else {
            json!("required")
        };
        Ok(json!({
            "model": self.model,
            "messages": chat_messages(&system, &task, request.transcript),
            "tools": tool_definitions(),
            "tool_choice": tool_choice,
            // One invocation per reply; several would be a protocol violation.
            "parallel_tool_calls": false,
        }))
    }
}

impl Oracle for OpenAiOracle {
    #[instrument(skip_all, fields(model = %self.model, turns = request.transcript.len()))]
    fn next_turn(&self, request: &OracleRequest<'_>) -> Result<Vec<ToolInvocation>> {
        let body = self.request_body(request)?;
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .with_context(|| format!("send {}", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(anyhow!("oracle returned {status}: {text}"));
        }
        let parsed: ChatResponse = response.json().context("parse oracle response")?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("oracle response has no choices"))?;
        let invocations: Vec<ToolInvocation> = choice
            .message
            .tool_calls
            .into_iter()
            .map(ChatToolCall::into_invocation)
            .collect();
        info!(count = invocations.len(), "oracle replied");
        Ok(invocations)
    }
}

/// Request document piped to a command oracle.
#[derive(Debug, Serialize)]
struct CommandRequest<'a> {
    system: String,
    task: String,
    transcript: &'a [Turn],
    require_code: bool,
    tools: [&'static str; 2],
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandReply {
    Invocations(Vec<ToolInvocation>),
    Wrapped { tool_calls: Vec<ToolInvocation> },
}

/// Backend that delegates to an external program.
///
/// The program receives a JSON request on stdin and prints either a JSON array
/// of `{name, arguments}` objects or `{"tool_calls": [...]}` on stdout.
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    prompts: PromptEngine,
}

impl CommandOracle {
    pub fn new(program: &str, args: &[String], timeout: Duration) -> Result<Self> {
        Ok(Self {
            program: program.to_string(),
            args: args.to_vec(),
            timeout,
            output_limit_bytes: 1_000_000,
            prompts: PromptEngine::new()?,
        })
    }
}

impl Oracle for CommandOracle {
    #[instrument(skip_all, fields(program = %self.program, turns = request.transcript.len()))]
    fn next_turn(&self, request: &OracleRequest<'_>) -> Result<Vec<ToolInvocation>> {
        let input_path = request.input_file_path.display().to_string();
        let document = CommandRequest {
            system: self.prompts.render_system()?,
            task: self.prompts.render_task(&request.task_prompt(&input_path))?,
            transcript: request.transcript,
            require_code: request.require_code,
            tools: [PYTHON_TOOL, ANSWER_TOOL],
        };
        let stdin = serde_json::to_vec(&document).context("serialize oracle request")?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        let output =
            run_command_with_timeout(cmd, Some(&stdin), self.timeout, self.output_limit_bytes)
                .with_context(|| format!("run oracle command {}", self.program))?;
        if output.timed_out {
            return Err(anyhow!(
                "oracle command timed out after {}s",
                self.timeout.as_secs()
            ));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "oracle command exited with {:?}: {}",
                output.status.code(),
                output.stderr_lossy().trim()
            ));
        }
        let stdout = output.stdout_lossy();
        debug!(bytes = stdout.len(), "oracle command finished");
        let reply: CommandReply = serde_json::from_str(stdout.trim())
            .with_context(|| format!("parse oracle command output {:?}", stdout.trim()))?;
        Ok(match reply {
            CommandReply::Invocations(invocations)
            | CommandReply::Wrapped {
                tool_calls: invocations,
            } => invocations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ExecutionOutcome;
    use pretty_assertions::assert_eq;

    #[test]
    fn transcript_renders_as_paired_tool_calls() {
        let transcript = vec![
            Turn::Code {
                source: "print(1)".to_string(),
            },
            Turn::Execution {
                outcome: ExecutionOutcome::Output {
                    output: "1".to_string(),
                },
            },
            Turn::Answer {
                answer: "1".to_string(),
            },
            Turn::Verdict {
                is_correct: false,
                response: "That's not the right answer.".to_string(),
            },
            Turn::Note {
                text: "Try again.".to_string(),
            },
        ];
        let messages = chat_messages("sys", "task", &transcript);
        let roles: Vec<&str> = messages
            .iter()
            .map(|m| m["role"].as_str().unwrap_or_default())
            .collect();
        assert_eq!(
            roles,
            vec!["system", "user", "assistant", "tool", "assistant", "tool", "user"]
        );
        assert_eq!(messages[2]["tool_calls"][0]["id"], "call_0");
        assert_eq!(messages[3]["tool_call_id"], "call_0");
        assert_eq!(messages[3]["content"], "1");
        assert_eq!(
            messages[4]["tool_calls"][0]["function"]["arguments"],
            r#"{"answer":"1"}"#
        );
        assert_eq!(messages[5]["tool_call_id"], "call_2");
    }

    #[test]
    fn request_body_asks_for_a_single_tool_call() {
        let oracle = OpenAiOracle::new("http://localhost:9/v1", "sk-test", "m", Duration::from_secs(1))
            .expect("oracle");
        let puzzle = PuzzleDetail {
            name: "Day 3".to_string(),
            description: String::new(),
            question: String::new(),
            locator: "https://adventofcode.com/2024/day/3".to_string(),
            level: 2,
        };
        let body = oracle
            .request_body(&OracleRequest {
                puzzle: &puzzle,
                input_file_path: Path::new("/work/in.txt"),
                transcript: &[],
                require_code: false,
            })
            .expect("body");
        assert_eq!(body["parallel_tool_calls"], json!(false));
        assert_eq!(body["tool_choice"], json!("required"));
    }

    #[test]
    fn duplicate_note_answers_the_pending_call() {
        let transcript = vec![
            Turn::Answer {
                answer: "7".to_string(),
            },
            Turn::Note {
                text: "already tried".to_string(),
            },
        ];
        let messages = chat_messages("s", "t", &transcript);
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["content"], "already tried");
    }

    #[test]
    fn dangling_call_is_closed() {
        let transcript = vec![Turn::Code {
            source: "print(1)".to_string(),
        }];
        let messages = chat_messages("s", "t", &transcript);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3]["role"], "tool");
    }

    #[test]
    fn malformed_arguments_survive_as_string() {
        let call = ChatToolCall {
            function: ChatFunction {
                name: PYTHON_TOOL.to_string(),
                arguments: "not json".to_string(),
            },
        };
        let invocation = call.into_invocation();
        assert_eq!(invocation.arguments, Value::String("not json".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn command_oracle_reads_wrapped_reply() {
        let oracle = CommandOracle::new(
            "sh",
            &[
                "-c".to_string(),
                r#"cat > /dev/null; echo '{"tool_calls":[{"name":"python_repl","arguments":{"query":"print(2)"}}]}'"#
                    .to_string(),
            ],
            Duration::from_secs(10),
        )
        .expect("oracle");
        let puzzle = PuzzleDetail {
            name: "Day 1".to_string(),
            description: "d".to_string(),
            question: "q".to_string(),
            locator: "https://x/2024/day/1".to_string(),
            level: 1,
        };
        let invocations = oracle
            .next_turn(&OracleRequest {
                puzzle: &puzzle,
                input_file_path: Path::new("INPUT(Day 1).txt"),
                transcript: &[],
                require_code: true,
            })
            .expect("reply");
        assert_eq!(invocations, vec![ToolInvocation::code("print(2)")]);
    }

    #[cfg(unix)]
    #[test]
    fn command_oracle_failure_is_an_error() {
        let oracle = CommandOracle::new(
            "sh",
            &["-c".to_string(), "exit 3".to_string()],
            Duration::from_secs(10),
        )
        .expect("oracle");
        let puzzle = PuzzleDetail {
            name: "Day 1".to_string(),
            description: "d".to_string(),
            question: "q".to_string(),
            locator: "https://x/2024/day/1".to_string(),
            level: 1,
        };
        let err = oracle
            .next_turn(&OracleRequest {
                puzzle: &puzzle,
                input_file_path: Path::new("in.txt"),
                transcript: &[],
                require_code: true,
            })
            .unwrap_err();
        assert!(err.to_string().contains("exited with Some(3)"));
    }
}
