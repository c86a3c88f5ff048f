//! Record extraction from fetched pages
//!
//! Pure functions from a page body to typed records. Rows that lack their
//! primary field are skipped and counted as warnings; only an API envelope
//! that is not valid JSON or reports a failure fails the whole page.

use crate::model::{
    ordered_set, ContestRecord, Locator, ProblemRecord, Record, SubmissionRecord, Unit, UnitKind,
    UserProfileRecord,
};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::sync::OnceLock;
use thiserror::Error;

/// Page-level extraction failure
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("API call failed with status {status}: {comment}")]
    Envelope { status: String, comment: String },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Records extracted from one page
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<Record>,
    /// True when the next page of the same listing may hold more records
    pub continuation: bool,
    /// Rows skipped because a required field was missing
    pub warnings: usize,
}

impl Extraction {
    fn empty() -> Self {
        Self::default()
    }
}

/// Extracts the records of `body`, fetched for `unit`
pub fn extract(body: &str, unit: &Unit) -> Result<Extraction, ExtractError> {
    let extraction = match unit.kind {
        UnitKind::ContestList => extract_contests(&Html::parse_document(body)),
        UnitKind::ProblemSet => extract_problems(&Html::parse_document(body)),
        UnitKind::SubmissionPage => {
            let contest_id = match &unit.locator {
                Locator::ContestPage { contest_id, .. } => contest_id.to_string(),
                _ => String::new(),
            };
            extract_submissions(&Html::parse_document(body), &contest_id)
        }
        UnitKind::UserProfile => {
            let username = match &unit.locator {
                Locator::Username(name) => name.as_str(),
                _ => "",
            };
            extract_profile(&Html::parse_document(body), username)
        }
        UnitKind::RatedUsers => extract_rated_users(body)?,
    };

    if extraction.warnings > 0 {
        tracing::warn!(
            "{}: skipped {} malformed rows",
            unit,
            extraction.warnings
        );
    }
    if extraction.records.is_empty() {
        tracing::info!("{}: no records on page", unit);
    }

    Ok(extraction)
}

fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => scope.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    select_all(scope, css).into_iter().next()
}

/// Trimmed text fragments joined by single spaces
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_link_text(element: ElementRef<'_>) -> String {
    select_first(element, "a").map(text_of).unwrap_or_default()
}

/// Reads the leading run of digits of the trimmed text
pub fn leading_number<T: std::str::FromStr>(text: &str) -> Option<T> {
    let trimmed = text.trim();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

fn none_if_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

fn extract_contests(document: &Html) -> Extraction {
    let mut extraction = Extraction::empty();

    // The listing tables carry no class, or an empty one
    for table in select_all(
        document.root_element(),
        "table:not([class]), table[class=\"\"]",
    ) {
        for row in select_all(table, "tr") {
            let cells = select_all(row, "td");
            if cells.is_empty() {
                continue;
            }
            match contest_from_cells(&cells) {
                Some(contest) => extraction.records.push(Record::Contest(contest)),
                None => extraction.warnings += 1,
            }
        }
    }

    extraction.continuation = !extraction.records.is_empty();
    extraction
}

fn contest_from_cells(cells: &[ElementRef<'_>]) -> Option<ContestRecord> {
    let name_cell = cells
        .iter()
        .find(|cell| cell.value().attr("class").is_none())?;
    let name = none_if_empty(text_of(*name_cell))?;

    let contest_id = select_first(*name_cell, "a")
        .and_then(|link| link.value().attr("href"))
        .and_then(|href| href.trim_end_matches('/').rsplit('/').next())
        .filter(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string);

    let writers = cells
        .get(1)
        .map(|cell| ordered_set(select_all(*cell, "a").into_iter().map(text_of)))
        .unwrap_or_default();

    Some(ContestRecord {
        contest_id,
        name,
        writers,
        start_time: cells.get(2).map(|c| text_of(*c)).unwrap_or_default(),
        length: cells.get(3).map(|c| text_of(*c)).unwrap_or_default(),
    })
}

fn extract_problems(document: &Html) -> Extraction {
    let mut extraction = Extraction::empty();

    for row in select_all(document.root_element(), "table.problems tr") {
        let cells = select_all(row, "td");
        if cells.is_empty() {
            continue;
        }
        match problem_from_row(row, &cells) {
            Some(problem) => extraction.records.push(Record::Problem(problem)),
            None => extraction.warnings += 1,
        }
    }

    extraction.continuation = !extraction.records.is_empty();
    extraction
}

fn problem_from_row(row: ElementRef<'_>, cells: &[ElementRef<'_>]) -> Option<ProblemRecord> {
    let problem_id = none_if_empty(first_link_text(*cells.first()?))?;
    let details = *cells.get(1)?;
    let title = none_if_empty(select_first(details, "div").map(text_of).unwrap_or_default())?;

    let tags = ordered_set(select_all(details, "a.notice").into_iter().map(text_of));
    let difficulty = select_first(row, "span.ProblemRating")
        .and_then(|span| leading_number(&text_of(span)));

    Some(ProblemRecord {
        problem_id,
        title,
        tags,
        difficulty,
    })
}

fn extract_submissions(document: &Html, contest_id: &str) -> Extraction {
    let mut extraction = Extraction::empty();

    for row in select_all(document.root_element(), "table.status-frame-datatable tr") {
        let cells = select_all(row, "td");
        if cells.is_empty() {
            continue;
        }
        match submission_from_cells(&cells, contest_id) {
            Some(submission) => extraction.records.push(Record::Submission(submission)),
            None => extraction.warnings += 1,
        }
    }

    let has_next = select_first(document.root_element(), "div.pagination span.next").is_some();
    extraction.continuation = !extraction.records.is_empty() && has_next;
    extraction
}

fn submission_from_cells(cells: &[ElementRef<'_>], contest_id: &str) -> Option<SubmissionRecord> {
    if cells.len() < 8 {
        return None;
    }
    let submission_id = none_if_empty(text_of(cells[0]))?;

    let verdict = select_first(cells[5], "span.verdict-accepted")
        .map(text_of)
        .unwrap_or_else(|| text_of(cells[5]));

    Some(SubmissionRecord {
        submission_id,
        contest_id: contest_id.to_string(),
        submitted_at: text_of(cells[1]),
        problem_id: first_link_text(cells[3]),
        language: text_of(cells[4]),
        verdict,
        time_ms: leading_number(&text_of(cells[6])),
        memory_kb: leading_number(&text_of(cells[7])),
        username: first_link_text(cells[2]),
    })
}

static DAYS_IN_A_ROW: OnceLock<Regex> = OnceLock::new();
static PROBLEMS_SOLVED: OnceLock<Regex> = OnceLock::new();

fn capture_number(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn extract_profile(document: &Html, username: &str) -> Extraction {
    let text = text_of(document.root_element());

    let days_in_a_row = DAYS_IN_A_ROW.get_or_init(|| {
        Regex::new(r"(\d+)\s+days\s+in\s+a\s+row\s+max\.")
            .expect("static streak pattern is valid")
    });
    let problems_solved_re = PROBLEMS_SOLVED.get_or_init(|| {
        Regex::new(r"(\d+)\s+problems\s+solved\s+for\s+all\s+time")
            .expect("static solved-count pattern is valid")
    });

    let max_streak = capture_number(days_in_a_row, &text);
    let problems_solved = capture_number(problems_solved_re, &text);

    if username.is_empty() || (max_streak.is_none() && problems_solved.is_none()) {
        tracing::warn!("No profile statistics found for '{}'", username);
        return Extraction::empty();
    }

    let mut profile = UserProfileRecord::new(username);
    profile.max_streak = max_streak;
    profile.problems_solved = problems_solved;

    Extraction {
        records: vec![Record::User(profile)],
        continuation: false,
        warnings: 0,
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    status: String,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    result: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUser {
    handle: Option<String>,
    rating: Option<i64>,
    rank: Option<String>,
    max_rating: Option<i64>,
    contribution: Option<i64>,
    organization: Option<String>,
    friend_of_count: Option<u64>,
    registration_time_seconds: Option<i64>,
    city: Option<String>,
    country: Option<String>,
}

impl ApiUser {
    fn into_record(self) -> Option<UserProfileRecord> {
        let username = none_if_empty(self.handle?)?;
        let registration_date = self
            .registration_time_seconds
            .and_then(|secs| chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0))
            .map(|at| at.format("%Y-%m-%d").to_string());

        Some(UserProfileRecord {
            username,
            rating: self.rating,
            rank: self.rank.and_then(none_if_empty),
            max_rating: self.max_rating,
            contribution: self.contribution,
            organization: self.organization.and_then(none_if_empty),
            friend_count: self.friend_of_count,
            registration_date,
            city: self.city.and_then(none_if_empty),
            country: self.country.and_then(none_if_empty),
            max_streak: None,
            problems_solved: None,
        })
    }
}

fn extract_rated_users(body: &str) -> Result<Extraction, ExtractError> {
    let envelope: ApiEnvelope = serde_json::from_str(body)?;
    if envelope.status != "OK" {
        return Err(ExtractError::Envelope {
            status: envelope.status,
            comment: envelope.comment.unwrap_or_default(),
        });
    }

    let mut extraction = Extraction::empty();
    for value in envelope.result {
        match serde_json::from_value::<ApiUser>(value)
            .ok()
            .and_then(ApiUser::into_record)
        {
            Some(user) => extraction.records.push(Record::User(user)),
            None => extraction.warnings += 1,
        }
    }
    Ok(extraction)
}
