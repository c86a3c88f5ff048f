//! Typed records produced by the extractor
//!
//! Each record kind exposes a natural key. Numeric keys order the canonical
//! dataset; text keys (alphanumeric ids, or a contest name standing in for a
//! missing id) keep first-seen order.

use crate::merge::normalize_id;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The entity kinds the harvester produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Contest,
    Problem,
    Submission,
    User,
}

impl RecordKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Contest => "contest",
            Self::Problem => "problem",
            Self::Submission => "submission",
            Self::User => "user",
        }
    }

    /// File name of the canonical CSV for this kind
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Contest => "contests.csv",
            Self::Problem => "problems.csv",
            Self::Submission => "submissions.csv",
            Self::User => "users.csv",
        }
    }

    pub fn all() -> [Self; 4] {
        [Self::Contest, Self::Problem, Self::Submission, Self::User]
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Natural key of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    /// Integer id
    Numeric(u64),
    /// Non-numeric id, e.g. a problem id like `1850A` or a username
    Text(String),
    /// Fallback key for records without an id (contest name)
    Secondary(String),
}

impl RecordKey {
    /// Builds a key from a raw id, cleaning up float-formatted integers first
    pub fn from_id(id: &str) -> Self {
        let id = normalize_id(id);
        match id.parse::<u64>() {
            Ok(n) => Self::Numeric(n),
            Err(_) => Self::Text(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestRecord {
    pub contest_id: Option<String>,
    pub name: String,
    /// Writer handles, in page order without duplicates
    pub writers: Vec<String>,
    pub start_time: String,
    pub length: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemRecord {
    pub problem_id: String,
    pub title: String,
    /// Tags, in page order without duplicates
    pub tags: Vec<String>,
    pub difficulty: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submission_id: String,
    pub contest_id: String,
    pub submitted_at: String,
    pub problem_id: String,
    pub language: String,
    pub verdict: String,
    pub time_ms: Option<u64>,
    pub memory_kb: Option<u64>,
    pub username: String,
}

/// A user, enriched incrementally from the rated-users API and profile pages
///
/// Everything except the username is optional; see [`UserProfileRecord::absorb`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfileRecord {
    pub username: String,
    pub rating: Option<i64>,
    pub rank: Option<String>,
    pub max_rating: Option<i64>,
    pub contribution: Option<i64>,
    pub organization: Option<String>,
    pub friend_count: Option<u64>,
    pub registration_date: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub max_streak: Option<u32>,
    pub problems_solved: Option<u32>,
}

impl UserProfileRecord {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Field-level merge: present fields of `newer` overwrite, absent ones never erase
    pub fn absorb(&mut self, newer: UserProfileRecord) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        fill(&mut self.rating, newer.rating);
        fill(&mut self.rank, newer.rank);
        fill(&mut self.max_rating, newer.max_rating);
        fill(&mut self.contribution, newer.contribution);
        fill(&mut self.organization, newer.organization);
        fill(&mut self.friend_count, newer.friend_count);
        fill(&mut self.registration_date, newer.registration_date);
        fill(&mut self.city, newer.city);
        fill(&mut self.country, newer.country);
        fill(&mut self.max_streak, newer.max_streak);
        fill(&mut self.problems_solved, newer.problems_solved);
    }
}

/// A harvested record of any kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Contest(ContestRecord),
    Problem(ProblemRecord),
    Submission(SubmissionRecord),
    User(UserProfileRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Contest(_) => RecordKind::Contest,
            Self::Problem(_) => RecordKind::Problem,
            Self::Submission(_) => RecordKind::Submission,
            Self::User(_) => RecordKind::User,
        }
    }

    pub fn natural_key(&self) -> RecordKey {
        match self {
            Self::Contest(c) => match c.contest_id.as_deref().filter(|id| !id.is_empty()) {
                Some(id) => RecordKey::from_id(id),
                None => RecordKey::Secondary(c.name.clone()),
            },
            Self::Problem(p) => RecordKey::from_id(&p.problem_id),
            Self::Submission(s) => RecordKey::from_id(&s.submission_id),
            Self::User(u) => RecordKey::Text(u.username.clone()),
        }
    }
}

/// Removes blanks and repeats while keeping first-seen order
pub fn ordered_set(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let value = value.trim().to_string();
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}
