//! Markup parsing for calendar, puzzle, leaderboard and submission pages.
//!
//! Every function here is pure: it takes already-fetched markup and returns
//! structured records. Fetching lives in `io::site`.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::core::types::{
    Day, Leader, LeaderboardResult, PuzzleCalendar, PuzzleDetail, SubmissionResult,
};

const FIRST_HALF_MARKER: &str = "The first half of this puzzle is complete!";
const BOTH_HALVES_MARKER: &str = "Both parts of this puzzle are complete!";
const CORRECT_MARKER: &str = "That's the right answer!";

/// Markup did not have the structure the parser relies on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing `{0}` element")]
    MissingElement(&'static str),
    #[error("leaderboard is unavailable or you are not a member")]
    LeaderboardUnavailable,
    #[error("invalid locator {href:?}: {reason}")]
    InvalidLocator { href: String, reason: String },
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|err| panic!("selector {css:?} is invalid: {err}"))
}

static CALENDAR: LazyLock<Selector> = LazyLock::new(|| selector("pre.calendar"));
static CALENDAR_CELL: LazyLock<Selector> = LazyLock::new(|| selector("a, span"));
static DAY_DESC: LazyLock<Selector> = LazyLock::new(|| selector("article.day-desc"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("h2"));
static EMPHASIS: LazyLock<Selector> = LazyLock::new(|| selector("em"));
static DAY_SUCCESS: LazyLock<Selector> = LazyLock::new(|| selector("p.day-success"));
static ARTICLE: LazyLock<Selector> = LazyLock::new(|| selector("article"));
static USER: LazyLock<Selector> = LazyLock::new(|| selector("div.user"));
static BOARD_ROW: LazyLock<Selector> = LazyLock::new(|| selector("div.privboard-row"));
static BOARD_NAME: LazyLock<Selector> = LazyLock::new(|| selector("span.privboard-name"));
static BOARD_POSITION: LazyLock<Selector> =
    LazyLock::new(|| selector("span.privboard-position"));
static JOIN_FORM: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"form[action$="/leaderboard/private/join"]"#));

/// Classify every day cell of the calendar grid.
///
/// Anchors are released days (bucketed by completion class); plain spans are
/// days not released yet. A day seen twice keeps its first classification.
pub fn parse_calendar(html: &str, base_url: &Url) -> Result<PuzzleCalendar, ParseError> {
    let doc = Html::parse_document(html);
    let grid = doc
        .select(&CALENDAR)
        .next()
        .ok_or(ParseError::MissingElement("pre.calendar"))?;

    let mut calendar = PuzzleCalendar::default();
    for cell in grid.select(&CALENDAR_CELL) {
        let Some(day) = day_number(cell) else {
            continue;
        };
        if calendar.contains(day) {
            continue;
        }
        if cell.value().name() != "a" {
            calendar.not_released.insert(day);
            continue;
        }
        let href = cell.value().attr("href").unwrap_or_default();
        let locator = base_url
            .join(href)
            .map_err(|err| ParseError::InvalidLocator {
                href: href.to_string(),
                reason: err.to_string(),
            })?
            .to_string();
        if has_class(cell, "calendar-verycomplete") {
            calendar.fully_solved.insert(day, locator);
        } else if has_class(cell, "calendar-complete") {
            calendar.partially_solved.insert(day, locator);
        } else {
            calendar.unsolved.insert(day, locator);
        }
    }
    Ok(calendar)
}

/// Day number from the nested `span.calendar-day` of a cell (not the cell itself).
fn day_number(cell: ElementRef<'_>) -> Option<Day> {
    let label = cell
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "span" && has_class(*el, "calendar-day"))?;
    let text = stripped_text(label);
    match text.parse() {
        Ok(day) => Some(day),
        Err(_) => {
            warn!(label = %text, "calendar day label is not a number");
            None
        }
    }
}

/// Parse a puzzle page into its description, question and open level.
pub fn parse_puzzle_detail(html: &str, locator: &str) -> Result<PuzzleDetail, ParseError> {
    let doc = Html::parse_document(html);
    let blocks: Vec<ElementRef<'_>> = doc.select(&DAY_DESC).collect();
    if blocks.is_empty() {
        return Err(ParseError::MissingElement("article.day-desc"));
    }

    let mut name = String::new();
    let mut question = String::new();
    let mut sections = Vec::with_capacity(blocks.len());
    for block in &blocks {
        if name.is_empty()
            && let Some(title) = block.select(&TITLE).next()
        {
            name = clean_title(&stripped_text(title));
        }
        if let Some(em) = block.select(&EMPHASIS).last() {
            question = stripped_text(em);
        }
        sections.push(block_text(*block));
    }

    let first_half = doc
        .select(&DAY_SUCCESS)
        .any(|p| stripped_text(p).starts_with(FIRST_HALF_MARKER));
    let both_halves = doc
        .select(&DAY_SUCCESS)
        .any(|p| stripped_text(p).starts_with(BOTH_HALVES_MARKER));
    let raw_level = 1 + u8::from(first_half) + u8::from(both_halves);
    let level = if raw_level > 2 {
        warn!(
            locator,
            raw_level, "both completion markers present; clamping level to 2"
        );
        2
    } else {
        raw_level
    };

    Ok(PuzzleDetail {
        name,
        description: sections.join("\n\n"),
        question,
        locator: locator.to_string(),
        level,
    })
}

/// `--- Day 3: Mull It Over ---` becomes `Day 3: Mull It Over`.
fn clean_title(raw: &str) -> String {
    raw.trim_matches(|c: char| c == '-' || c.is_whitespace())
        .to_string()
}

/// Text of one description block: one line per direct child.
fn block_text(block: ElementRef<'_>) -> String {
    let mut lines = Vec::new();
    for child in block.children() {
        let line = match child.value() {
            Node::Text(text) => text.trim().to_string(),
            Node::Element(_) => ElementRef::wrap(child).map(stripped_text).unwrap_or_default(),
            _ => String::new(),
        };
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// Parse a private leaderboard page.
///
/// Rows that cannot be read are skipped; only a missing membership fails the
/// whole parse.
pub fn parse_leaderboard(html: &str) -> Result<LeaderboardResult, ParseError> {
    let doc = Html::parse_document(html);
    if doc.select(&JOIN_FORM).next().is_some() {
        return Err(ParseError::LeaderboardUnavailable);
    }

    let my_name = doc.select(&USER).next().map(own_text);
    let mut result = LeaderboardResult::default();
    for row in doc.select(&BOARD_ROW) {
        let leader = match parse_board_row(row) {
            Ok(Some(leader)) => leader,
            Ok(None) => continue,
            Err(reason) => {
                warn!(%reason, "skipping leaderboard row");
                continue;
            }
        };
        if let Some(me) = my_name.as_deref()
            && !me.is_empty()
            && leader.name.to_lowercase() == me.to_lowercase()
        {
            result.my_rank = leader.rank;
            result.my_score = Some(leader.score);
        }
        result.leaders.push(leader);
    }
    Ok(result)
}

fn parse_board_row(row: ElementRef<'_>) -> Result<Option<Leader>, String> {
    let Some(name_tag) = row.select(&BOARD_NAME).next() else {
        return Ok(None);
    };
    let name = stripped_text(name_tag);

    let rank = row.select(&BOARD_POSITION).next().and_then(|tag| {
        let raw = stripped_text(tag).replace(')', "");
        match raw.trim().parse() {
            Ok(rank) => Some(rank),
            Err(_) => {
                warn!(position = %raw, "leaderboard position is not a number");
                None
            }
        }
    });

    let score_text = row
        .text()
        .map(str::trim)
        .find(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .ok_or_else(|| format!("no score for {name}"))?;
    let score = score_text
        .parse()
        .map_err(|err| format!("score {score_text:?} for {name}: {err}"))?;

    Ok(Some(Leader { name, rank, score }))
}

/// Parse the page returned after posting an answer.
pub fn parse_submission(html: &str) -> SubmissionResult {
    let full_text = article_text(html).unwrap_or_else(|| "no response received".to_string());
    SubmissionResult {
        is_correct: full_text.starts_with(CORRECT_MARKER),
        full_text,
    }
}

/// Stripped text of the first `article`, if the page has one.
pub fn article_text(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&ARTICLE).next().map(stripped_text)
}

fn stripped_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text nodes directly under `el`, ignoring nested elements.
fn own_text(el: ElementRef<'_>) -> String {
    el.children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(text.to_string()),
            _ => None,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}
