//! Resilient HTTP client for the puzzle site.
//!
//! Two independent retry layers:
//!
//! - **Transient failures** (transport errors, non-2xx statuses) are retried with
//!   exponential backoff up to [`MAX_FETCH_ATTEMPTS`] attempts, then surface as
//!   [`FetchError::Exhausted`].
//! - **Rate limits** arrive as successful responses whose article text asks the
//!   client to wait. The client sleeps for the requested time plus a buffer and
//!   re-issues the identical request. This is a loop, not recursion; the number of
//!   consecutive waits is bounded by [`FetchPolicy::max_rate_limit_waits`].
//!
//! Callers must treat every call as potentially blocking for tens of minutes.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::backoff::{MAX_FETCH_ATTEMPTS, backoff};
use crate::core::parser::article_text;
use crate::core::rate_limit::classify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One HTTP request; re-issued verbatim on retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub form: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: &str) -> Self {
        Self {
            method: Method::Get,
            url: url.to_string(),
            form: Vec::new(),
        }
    }

    pub fn post_form(url: &str, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            url: url.to_string(),
            form,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Abstraction over the wire. Errors are transport failures; any status code
/// the server returns is a response.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Abstraction over waiting, so backoff and rate-limit delays are testable.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url}: giving up after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
    #[error("{url}: still rate limited after {waits} waits")]
    RateLimited { url: String, waits: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Attempts per request for transient failures (first try included).
    pub max_attempts: u32,
    /// Consecutive rate-limit waits before giving up on a request.
    pub max_rate_limit_waits: u32,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_FETCH_ATTEMPTS,
            max_rate_limit_waits: 20,
        }
    }
}

pub struct FetchClient<T, S> {
    transport: T,
    sleeper: S,
    policy: FetchPolicy,
}

impl<T: Transport, S: Sleeper> FetchClient<T, S> {
    pub fn new(transport: T, sleeper: S, policy: FetchPolicy) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// GET a page as text.
    pub fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.execute(&HttpRequest::get(url))
            .map(|response| response.text())
    }

    /// GET raw bytes (puzzle input).
    pub fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.execute(&HttpRequest::get(url))
            .map(|response| response.body)
    }

    /// POST a form and return the response page.
    pub fn submit(&self, url: &str, form: Vec<(String, String)>) -> Result<String, FetchError> {
        self.execute(&HttpRequest::post_form(url, form))
            .map(|response| response.text())
    }

    /// Issue `request`, retrying transient failures and waiting out rate limits.
    #[instrument(skip_all, fields(url = %request.url, method = ?request.method))]
    pub fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let mut waits = 0u32;
        loop {
            let response = self.send_with_retry(request)?;
            let Some(limit) = rate_limit_in(&response) else {
                return Ok(response);
            };
            if waits >= self.policy.max_rate_limit_waits {
                warn!(waits, "rate limit persists, giving up");
                return Err(FetchError::RateLimited {
                    url: request.url.clone(),
                    waits,
                });
            }
            waits += 1;
            let wait = limit.wait();
            info!(wait_secs = wait.as_secs(), waits, "rate limited, waiting before re-issuing");
            self.sleeper.sleep(wait);
        }
    }

    fn send_with_retry(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 0..attempts {
            match self.transport.send(request) {
                Ok(response) if response.is_success() => {
                    debug!(attempt, status = response.status, "request succeeded");
                    return Ok(response);
                }
                Ok(response) => {
                    last_error = format!("HTTP status {}", response.status);
                }
                Err(err) => {
                    last_error = format!("{err:#}");
                }
            }
            if attempt + 1 < attempts {
                let delay = backoff(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %last_error, "transient failure, backing off");
                self.sleeper.sleep(delay);
            }
        }
        Err(FetchError::Exhausted {
            url: request.url.clone(),
            attempts,
            last_error,
        })
    }
}

/// Rate-limit instruction carried by an HTML response's article, if any.
fn rate_limit_in(response: &HttpResponse) -> Option<crate::core::rate_limit::RateLimit> {
    let body = response.text();
    if !body.contains("<article") {
        return None;
    }
    article_text(&body).as_deref().and_then(classify)
}

/// Connection settings for [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub session_token: String,
    pub user_agent: String,
    pub timeout: Duration,
}

/// Blocking `reqwest` transport that authenticates with the session cookie.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut cookie = HeaderValue::from_str(&format!("session={}", config.session_token))
            .context("session token is not a valid header value")?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("invalid user agent")?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url).form(&request.form),
        };
        let response = builder
            .send()
            .with_context(|| format!("send {}", request.url))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .with_context(|| format!("read body of {}", request.url))?
            .to_vec();
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingSleeper, ScriptedTransport};
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;

    fn page(article: &str) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            body: format!("<html><main><article><p>{article}</p></article></main></html>")
                .into_bytes(),
        })
    }

    fn status(code: u16) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: code,
            body: Vec::new(),
        })
    }

    fn client(
        responses: Vec<Result<HttpResponse>>,
    ) -> FetchClient<ScriptedTransport, RecordingSleeper> {
        FetchClient::new(
            ScriptedTransport::new(responses),
            RecordingSleeper::default(),
            FetchPolicy::default(),
        )
    }

    #[test]
    fn countdown_rate_limit_sleeps_then_reissues_same_request() {
        let client = client(vec![
            page("You gave an answer too recently; you have to wait after submitting an answer before trying again. You have 2m 5s left to wait."),
            page("That's the right answer!"),
        ]);
        let form = vec![
            ("level".to_string(), "1".to_string()),
            ("answer".to_string(), "42".to_string()),
        ];
        let body = client
            .submit("https://x/2024/day/3/answer", form)
            .expect("submit");
        assert!(body.contains("right answer"));
        assert_eq!(client.sleeper().slept(), vec![Duration::from_secs(155)]);

        let sent = client.transport().requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
    }

    #[test]
    fn ten_minute_rate_limit_waits_630_seconds() {
        let client = client(vec![
            page("Because you have guessed incorrectly 5 times on this puzzle, please wait 10 minutes before trying again."),
            page("That's not the right answer."),
        ]);
        client.fetch("https://x/2024/day/3/answer").expect("fetch");
        assert_eq!(client.sleeper().slept(), vec![Duration::from_secs(630)]);
    }

    #[test]
    fn transient_failures_back_off_exponentially() {
        let client = client(vec![
            Err(anyhow!("connection reset")),
            status(500),
            status(502),
            page("ok"),
        ]);
        client.fetch("https://x/2024").expect("fetch");
        assert_eq!(
            client.sleeper().slept(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn transient_failures_surface_after_five_attempts() {
        let client = client((0..6).map(|_| status(503)).collect());
        let err = client.fetch("https://x/2024").unwrap_err();
        match err {
            FetchError::Exhausted {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 5);
                assert_eq!(last_error, "HTTP status 503");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(client.transport().requests().len(), 5);
        assert_eq!(client.sleeper().slept().len(), 4);
    }

    #[test]
    fn rate_limit_waits_are_bounded() {
        let too_recent = "You gave an answer too recently. You have 1s left to wait.";
        let client = FetchClient::new(
            ScriptedTransport::new((0..4).map(|_| page(too_recent)).collect()),
            RecordingSleeper::default(),
            FetchPolicy {
                max_rate_limit_waits: 2,
                ..FetchPolicy::default()
            },
        );
        let err = client.fetch("https://x/answer").unwrap_err();
        assert!(matches!(err, FetchError::RateLimited { waits: 2, .. }));
        assert_eq!(client.sleeper().slept().len(), 2);
    }

    #[test]
    fn plain_bodies_are_never_rate_limits() {
        let client = client(vec![Ok(HttpResponse {
            status: 200,
            body: b"please wait 10 minutes\n1 2 3\n".to_vec(),
        })]);
        let bytes = client.download("https://x/input").expect("download");
        assert_eq!(bytes, b"please wait 10 minutes\n1 2 3\n");
        assert!(client.sleeper().slept().is_empty());
    }
}
