//! Puzzle-site client: fetch client plus markup parser.
//!
//! The [`PuzzleSite`] trait is the seam the workflow talks to; tests replace it
//! with scripted sites that never touch the network.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};
use url::Url;

use crate::core::parser::{parse_calendar, parse_leaderboard, parse_puzzle_detail, parse_submission};
use crate::core::types::{LeaderboardResult, PuzzleCalendar, PuzzleDetail, SubmissionResult};
use crate::io::fetch::{FetchClient, Sleeper, Transport};

/// Operations the workflow needs from the puzzle site.
///
/// Errors keep their typed source ([`crate::io::fetch::FetchError`] or
/// [`crate::core::parser::ParseError`]) so callers can tell them apart.
pub trait PuzzleSite {
    fn calendar(&self) -> Result<PuzzleCalendar>;
    fn puzzle(&self, locator: &str) -> Result<PuzzleDetail>;
    fn download_input(&self, puzzle: &PuzzleDetail) -> Result<Vec<u8>>;
    fn submit(&self, puzzle: &PuzzleDetail, answer: &str) -> Result<SubmissionResult>;
    fn leaderboard(&self, leaderboard_id: u64) -> Result<LeaderboardResult>;
}

/// The real site for one event year.
pub struct AocSite<T, S> {
    client: FetchClient<T, S>,
    base_url: Url,
    year: i32,
}

impl<T: Transport, S: Sleeper> AocSite<T, S> {
    pub fn new(client: FetchClient<T, S>, base_url: Url, year: i32) -> Self {
        Self {
            client,
            base_url,
            year,
        }
    }

    fn url(&self, path: &str) -> Result<String> {
        Ok(self
            .base_url
            .join(path)
            .with_context(|| format!("join {path} onto {}", self.base_url))?
            .to_string())
    }
}

impl<T: Transport, S: Sleeper> PuzzleSite for AocSite<T, S> {
    #[instrument(skip_all, fields(year = self.year))]
    fn calendar(&self) -> Result<PuzzleCalendar> {
        let url = self.url(&format!("/{}/", self.year))?;
        let html = self.client.fetch(&url)?;
        let calendar = parse_calendar(&html, &self.base_url)?;
        info!(%calendar, "calendar parsed");
        Ok(calendar)
    }

    #[instrument(skip(self))]
    fn puzzle(&self, locator: &str) -> Result<PuzzleDetail> {
        let html = self.client.fetch(locator)?;
        let detail = parse_puzzle_detail(&html, locator)?;
        debug!(name = %detail.name, level = detail.level, "puzzle parsed");
        Ok(detail)
    }

    #[instrument(skip_all, fields(puzzle = %puzzle.name))]
    fn download_input(&self, puzzle: &PuzzleDetail) -> Result<Vec<u8>> {
        Ok(self.client.download(&puzzle.input_locator())?)
    }

    #[instrument(skip_all, fields(puzzle = %puzzle.name, level = puzzle.level))]
    fn submit(&self, puzzle: &PuzzleDetail, answer: &str) -> Result<SubmissionResult> {
        let form = vec![
            ("level".to_string(), puzzle.level.to_string()),
            ("answer".to_string(), answer.to_string()),
        ];
        let html = self.client.submit(&puzzle.submit_locator(), form)?;
        let result = parse_submission(&html);
        info!(is_correct = result.is_correct, "answer judged");
        Ok(result)
    }

    #[instrument(skip(self))]
    fn leaderboard(&self, leaderboard_id: u64) -> Result<LeaderboardResult> {
        let url = self.url(&format!(
            "/{}/leaderboard/private/view/{leaderboard_id}",
            self.year
        ))?;
        let html = self.client.fetch(&url)?;
        Ok(parse_leaderboard(&html)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::ParseError;
    use crate::io::fetch::{FetchPolicy, HttpResponse, Method};
    use crate::test_support::{RecordingSleeper, ScriptedTransport};

    fn ok(body: &str) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            body: body.as_bytes().to_vec(),
        })
    }

    fn site(responses: Vec<Result<HttpResponse>>) -> AocSite<ScriptedTransport, RecordingSleeper> {
        AocSite::new(
            FetchClient::new(
                ScriptedTransport::new(responses),
                RecordingSleeper::default(),
                FetchPolicy::default(),
            ),
            Url::parse("https://adventofcode.com").expect("url"),
            2024,
        )
    }

    fn puzzle() -> PuzzleDetail {
        PuzzleDetail {
            name: "Day 3: Mull It Over".to_string(),
            description: String::new(),
            question: String::new(),
            locator: "https://adventofcode.com/2024/day/3".to_string(),
            level: 2,
        }
    }

    #[test]
    fn calendar_fetches_year_page() {
        let site = site(vec![ok(
            r#"<pre class="calendar"><a href="/2024/day/1" class="calendar-day1"><span class="calendar-day">1</span></a></pre>"#,
        )]);
        let calendar = site.calendar().expect("calendar");
        assert_eq!(calendar.unsolved.len(), 1);
        let sent = site.client.transport().requests();
        assert_eq!(sent[0].url, "https://adventofcode.com/2024/");
    }

    #[test]
    fn submit_posts_level_and_answer() {
        let site = site(vec![ok(
            "<article><p>That's the right answer!</p></article>",
        )]);
        let result = site.submit(&puzzle(), "161").expect("submit");
        assert!(result.is_correct);
        let sent = site.client.transport().requests();
        assert_eq!(sent[0].method, Method::Post);
        assert_eq!(sent[0].url, "https://adventofcode.com/2024/day/3/answer");
        assert_eq!(
            sent[0].form,
            vec![
                ("level".to_string(), "2".to_string()),
                ("answer".to_string(), "161".to_string())
            ]
        );
    }

    #[test]
    fn parse_errors_stay_typed() {
        let site = site(vec![ok("<html>maintenance</html>")]);
        let err = site.puzzle("https://adventofcode.com/2024/day/3").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ParseError>(),
            Some(&ParseError::MissingElement("article.day-desc"))
        );
    }
}
