//! Canonical CSV files: one per record kind
//!
//! Writing uses a fixed header per kind. Reading is tolerant so that raw
//! files from older harvests can be cleaned: unknown columns are ignored,
//! rows without the primary field are skipped and ids are normalized.

use crate::merge::normalize_id;
use crate::model::{
    ContestRecord, ProblemRecord, Record, RecordKind, SubmissionRecord, UserProfileRecord,
};
use crate::Result;
use csv::{ReaderBuilder, StringRecord, Writer};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

/// Separator for multi-valued fields (writers, tags)
pub const LIST_SEPARATOR: &str = ", ";

/// Column names of the canonical CSV of a kind
pub fn header(kind: RecordKind) -> &'static [&'static str] {
    match kind {
        RecordKind::Contest => &["contest_id", "contest_name", "writers", "start_time", "length"],
        RecordKind::Problem => &["problem_id", "title", "tags", "difficulty"],
        RecordKind::Submission => &[
            "submission_id",
            "contest_id",
            "submission_time",
            "problem_id",
            "language",
            "verdict",
            "time",
            "memory",
            "username",
        ],
        RecordKind::User => &[
            "username",
            "rating",
            "rank",
            "max_rating",
            "contribution",
            "organization",
            "friend_count",
            "registration_date",
            "city",
            "country",
            "max_streak",
            "problems_solved",
        ],
    }
}

/// Column that must be present for a row to be kept
fn primary_field(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Contest => "contest_name",
        RecordKind::Problem => "problem_id",
        RecordKind::Submission => "submission_id",
        RecordKind::User => "username",
    }
}

/// Guesses the record kind of a CSV from its header row
pub fn detect_kind(headers: &StringRecord) -> Option<RecordKind> {
    let has = |name: &str| headers.iter().any(|h| h.trim() == name);
    // Submission files also carry problem_id and username columns
    [
        RecordKind::Submission,
        RecordKind::Contest,
        RecordKind::Problem,
        RecordKind::User,
    ]
    .into_iter()
    .find(|kind| has(primary_field(*kind)))
}

/// Writes records of `kind` to `path`, replacing the file
///
/// Records of other kinds are ignored. Returns the number of rows written.
pub fn write_records<'a>(
    path: &Path,
    kind: RecordKind,
    records: impl IntoIterator<Item = &'a Record>,
) -> Result<usize> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(header(kind))?;

    let mut written = 0;
    for record in records.into_iter().filter(|r| r.kind() == kind) {
        writer.write_record(to_row(record))?;
        written += 1;
    }
    writer.flush()?;

    Ok(written)
}

fn to_row(record: &Record) -> Vec<String> {
    fn opt<T: ToString>(value: &Option<T>) -> String {
        value.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    match record {
        Record::Contest(c) => vec![
            c.contest_id.as_deref().map(normalize_id).unwrap_or_default(),
            c.name.clone(),
            c.writers.join(LIST_SEPARATOR),
            c.start_time.clone(),
            c.length.clone(),
        ],
        Record::Problem(p) => vec![
            normalize_id(&p.problem_id),
            p.title.clone(),
            p.tags.join(LIST_SEPARATOR),
            opt(&p.difficulty),
        ],
        Record::Submission(s) => vec![
            normalize_id(&s.submission_id),
            normalize_id(&s.contest_id),
            s.submitted_at.clone(),
            s.problem_id.clone(),
            s.language.clone(),
            s.verdict.clone(),
            opt(&s.time_ms),
            opt(&s.memory_kb),
            s.username.clone(),
        ],
        Record::User(u) => vec![
            u.username.clone(),
            opt(&u.rating),
            opt(&u.rank),
            opt(&u.max_rating),
            opt(&u.contribution),
            opt(&u.organization),
            opt(&u.friend_count),
            opt(&u.registration_date),
            opt(&u.city),
            opt(&u.country),
            opt(&u.max_streak),
            opt(&u.problems_solved),
        ],
    }
}

/// A CSV row addressed by column name
struct Row<'a> {
    columns: &'a HashMap<String, usize>,
    values: &'a StringRecord,
}

impl Row<'_> {
    /// Trimmed value of a column; missing columns and blank cells are `None`
    fn get(&self, name: &str) -> Option<String> {
        let index = *self.columns.get(name)?;
        let value = self.values.get(index)?.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    fn text(&self, name: &str) -> String {
        self.get(name).unwrap_or_default()
    }

    /// Numeric value; float-formatted integers such as `"1200.0"` are accepted
    fn number<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| normalize_id(&v).parse().ok())
    }

    fn list(&self, name: &str) -> Vec<String> {
        crate::model::ordered_set(
            self.text(name)
                .split(',')
                .map(str::to_string)
                .collect::<Vec<_>>(),
        )
    }
}

/// Reads every usable record of `kind` from a CSV file
pub fn read_records(path: &Path, kind: RecordKind) -> Result<Vec<Record>> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);

    let columns: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(index, name)| (name.trim().to_string(), index))
        .collect();

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for result in reader.records() {
        let values = result?;
        let row = Row {
            columns: &columns,
            values: &values,
        };
        match from_row(&row, kind) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(
            "Skipped {} rows of {} without {}",
            skipped,
            path.display(),
            primary_field(kind)
        );
    }
    tracing::debug!("Read {} {} records from {}", records.len(), kind, path.display());

    Ok(records)
}

fn from_row(row: &Row<'_>, kind: RecordKind) -> Option<Record> {
    let primary = row.get(primary_field(kind))?;

    let record = match kind {
        RecordKind::Contest => Record::Contest(ContestRecord {
            contest_id: row.get("contest_id").map(|id| normalize_id(&id)),
            name: primary,
            writers: row.list("writers"),
            start_time: row.text("start_time"),
            length: row.text("length"),
        }),
        RecordKind::Problem => Record::Problem(ProblemRecord {
            problem_id: normalize_id(&primary),
            title: row.text("title"),
            tags: row.list("tags"),
            difficulty: row.number("difficulty"),
        }),
        RecordKind::Submission => Record::Submission(SubmissionRecord {
            submission_id: normalize_id(&primary),
            contest_id: normalize_id(&row.text("contest_id")),
            submitted_at: row.text("submission_time"),
            problem_id: row.text("problem_id"),
            language: row.text("language"),
            verdict: row.text("verdict"),
            time_ms: row.number("time"),
            memory_kb: row.number("memory"),
            username: row.text("username"),
        }),
        RecordKind::User => Record::User(UserProfileRecord {
            username: primary,
            rating: row.number("rating"),
            rank: row.get("rank"),
            max_rating: row.number("max_rating"),
            contribution: row.number("contribution"),
            organization: row.get("organization"),
            friend_count: row.number("friend_count"),
            registration_date: row.get("registration_date"),
            city: row.get("city"),
            country: row.get("country"),
            max_streak: row.number("max_streak"),
            problems_solved: row.number("problems_solved"),
        }),
    };

    Some(record)
}
