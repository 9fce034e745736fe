//! HTTP-level tests for the real transport, oracle and notifier clients.
//!
//! The clients are blocking, so each test owns a small tokio runtime that
//! serves the mock while the test thread makes blocking calls.

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use companion::core::oracle_reply::ToolInvocation;
use companion::core::types::PuzzleDetail;
use companion::io::fetch::{FetchClient, FetchPolicy, ReqwestTransport, TransportConfig};
use companion::io::notify::{Notifier, TelegramNotifier};
use companion::io::oracle::{OpenAiOracle, Oracle, OracleRequest};
use companion::io::site::{AocSite, PuzzleSite};
use companion::test_support::RecordingSleeper;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("runtime")
}

fn site(server: &MockServer) -> AocSite<ReqwestTransport, RecordingSleeper> {
    let transport = ReqwestTransport::new(&TransportConfig {
        session_token: "abc123".to_string(),
        user_agent: "companion-test".to_string(),
        timeout: Duration::from_secs(5),
    })
    .expect("transport");
    AocSite::new(
        FetchClient::new(transport, RecordingSleeper::default(), FetchPolicy::default()),
        Url::parse(&server.uri()).expect("url"),
        2024,
    )
}

#[test]
fn calendar_request_carries_session_cookie() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/2024/"))
            .and(header("cookie", "session=abc123"))
            .and(header("user-agent", "companion-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<main><pre class="calendar">
                   <a href="/2024/day/1" class="calendar-day1 calendar-verycomplete"><span class="calendar-day"> 1</span></a>
                   <a href="/2024/day/2" class="calendar-day2"><span class="calendar-day"> 2</span></a>
                   </pre></main>"#,
            ))
            .expect(1)
            .mount(&server),
    );

    let calendar = site(&server).calendar().expect("calendar");
    assert_eq!(calendar.fully_solved.len(), 1);
    assert_eq!(
        calendar.unsolved.get(&2).map(String::as_str),
        Some(format!("{}/2024/day/2", server.uri()).as_str())
    );
    rt.block_on(server.verify());
}

#[test]
fn submission_posts_form_and_retries_server_errors() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/2024/day/7/answer"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server),
    );
    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/2024/day/7/answer"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("level=1"))
            .and(body_string_contains("answer=3749"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<main><article><p>That's the right answer! You are one gold star closer.</p></article></main>",
            ))
            .mount(&server),
    );

    let site = site(&server);
    let puzzle = PuzzleDetail {
        name: "Day 7: Bridge Repair".to_string(),
        description: String::new(),
        question: String::new(),
        locator: format!("{}/2024/day/7", server.uri()),
        level: 1,
    };
    let result = site.submit(&puzzle, "3749").expect("submit");
    assert!(result.is_correct);
}

#[test]
fn openai_oracle_forces_code_on_first_turn() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "tool_choice": { "type": "function", "function": { "name": "python_repl" } },
                "parallel_tool_calls": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_abc",
                            "type": "function",
                            "function": {
                                "name": "python_repl",
                                "arguments": "{\"query\": \"print(11)\"}"
                            }
                        }]
                    }
                }]
            })))
            .expect(1)
            .mount(&server),
    );

    let oracle = OpenAiOracle::new(
        &format!("{}/v1", server.uri()),
        "sk-test",
        "test-model",
        Duration::from_secs(5),
    )
    .expect("oracle");
    let puzzle = PuzzleDetail {
        name: "Day 1: Historian Hysteria".to_string(),
        description: "Pair up the smallest numbers.".to_string(),
        question: "What is the total distance between your lists?".to_string(),
        locator: "https://adventofcode.com/2024/day/1".to_string(),
        level: 1,
    };
    let invocations = oracle
        .next_turn(&OracleRequest {
            puzzle: &puzzle,
            input_file_path: Path::new("/work/INPUT(Day 1: Historian Hysteria).txt"),
            transcript: &[],
            require_code: true,
        })
        .expect("reply");
    assert_eq!(invocations, vec![ToolInvocation::code("print(11)")]);
    rt.block_on(server.verify());
}

#[test]
fn openai_oracle_surfaces_http_errors() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server),
    );

    let oracle = OpenAiOracle::new(
        &format!("{}/v1/", server.uri()),
        "sk-test",
        "test-model",
        Duration::from_secs(5),
    )
    .expect("oracle");
    let puzzle = PuzzleDetail {
        name: "Day 1".to_string(),
        description: String::new(),
        question: String::new(),
        locator: "https://adventofcode.com/2024/day/1".to_string(),
        level: 1,
    };
    let err = oracle
        .next_turn(&OracleRequest {
            puzzle: &puzzle,
            input_file_path: Path::new("in.txt"),
            transcript: &[],
            require_code: false,
        })
        .unwrap_err();
    assert!(err.to_string().contains("429"));
}

#[test]
fn telegram_notifier_posts_chat_message() {
    let rt = runtime();
    let server = rt.block_on(MockServer::start());
    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": "42", "text": "Solving Day 1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server),
    );
    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/botBAD/sendMessage"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server),
    );

    let ok = TelegramNotifier::new(&server.uri(), "TOKEN", "42").expect("notifier");
    ok.notify("Solving Day 1").expect("notify");

    let bad = TelegramNotifier::new(&server.uri(), "BAD", "42").expect("notifier");
    let err = bad.notify("Solving Day 1").unwrap_err();
    assert!(err.to_string().contains("401"));
    rt.block_on(server.verify());
}
