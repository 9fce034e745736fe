//! Classification of the site's two rate-limit response phrasings.
//!
//! A rate-limited response is still a successful HTTP response; only its
//! article text tells the client to wait and re-issue the request.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// Fixed safety margin added on top of every server-requested wait.
pub const WAIT_BUFFER: Duration = Duration::from_secs(30);

const TOO_RECENT_PREFIX: &str = "You gave an answer too recently";
const TEN_MINUTES_MARKER: &str = "please wait 10 minutes";

static COUNTDOWN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:(\d+)m\s+)?(\d+)s").expect("countdown regex is valid"));

/// A rate-limit instruction found in a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimit {
    /// "answer too recently" with an embedded countdown.
    Countdown(Duration),
    /// "please wait 10 minutes".
    Cooldown,
}

impl RateLimit {
    /// How long to sleep before re-issuing the request, buffer included.
    pub fn wait(self) -> Duration {
        match self {
            RateLimit::Countdown(remaining) => remaining + WAIT_BUFFER,
            RateLimit::Cooldown => Duration::from_secs(10 * 60) + WAIT_BUFFER,
        }
    }
}

/// Detect a rate-limit instruction in article text.
///
/// A "too recently" message without a readable countdown falls back to the
/// ten-minute cooldown rather than being mistaken for a verdict.
pub fn classify(text: &str) -> Option<RateLimit> {
    let text = text.trim();
    if text.starts_with(TOO_RECENT_PREFIX) {
        return Some(countdown(text).map_or(RateLimit::Cooldown, RateLimit::Countdown));
    }
    if text.contains(TEN_MINUTES_MARKER) {
        return Some(RateLimit::Cooldown);
    }
    None
}

fn countdown(text: &str) -> Option<Duration> {
    let caps = COUNTDOWN_RE.captures(text)?;
    let minutes: u64 = caps
        .get(1)
        .map_or(Ok(0), |m| m.as_str().parse())
        .ok()?;
    let seconds: u64 = caps.get(2)?.as_str().parse().ok()?;
    Some(Duration::from_secs(minutes * 60 + seconds))
}
