/// Unit definitions: one page-fetch task per unit
use crate::model::RecordKind;
use std::fmt;

/// The kind of page a unit fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// One page of the contest listing
    ContestList,
    /// One page of the problem set
    ProblemSet,
    /// One status page of a contest's submissions
    SubmissionPage,
    /// A single user's profile page
    UserProfile,
    /// The rated-users list from the JSON API
    RatedUsers,
}

impl UnitKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::ContestList => "contest-list",
            Self::ProblemSet => "problem-set",
            Self::SubmissionPage => "submission-page",
            Self::UserProfile => "user-profile",
            Self::RatedUsers => "rated-users",
        }
    }

    /// The kind of record pages of this kind produce
    pub fn record_kind(&self) -> RecordKind {
        match self {
            Self::ContestList => RecordKind::Contest,
            Self::ProblemSet => RecordKind::Problem,
            Self::SubmissionPage => RecordKind::Submission,
            Self::UserProfile | Self::RatedUsers => RecordKind::User,
        }
    }

    /// Returns true for JSON API endpoints, which use their own pacing
    pub fn is_api(&self) -> bool {
        matches!(self, Self::RatedUsers)
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Identifies which page of a kind a unit fetches
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Page number of a listing
    Page(u32),
    /// Status page of one contest
    ContestPage { contest_id: u64, page: u32 },
    /// Profile handle
    Username(String),
    /// API method name
    Method(String),
}

impl Locator {
    pub fn to_db_string(&self) -> String {
        match self {
            Self::Page(page) => format!("page:{}", page),
            Self::ContestPage { contest_id, page } => format!("{}:{}", contest_id, page),
            Self::Username(name) => name.clone(),
            Self::Method(method) => method.clone(),
        }
    }

    /// Parses a locator back, using the unit kind to pick the shape
    pub fn from_db_string(kind: UnitKind, s: &str) -> Option<Self> {
        match kind {
            UnitKind::ContestList | UnitKind::ProblemSet => s
                .strip_prefix("page:")
                .and_then(|n| n.parse().ok())
                .map(Self::Page),
            UnitKind::SubmissionPage => {
                let (contest, page) = s.split_once(':')?;
                Some(Self::ContestPage {
                    contest_id: contest.parse().ok()?,
                    page: page.parse().ok()?,
                })
            }
            UnitKind::UserProfile if !s.is_empty() => Some(Self::Username(s.to_string())),
            UnitKind::RatedUsers if !s.is_empty() => Some(Self::Method(s.to_string())),
            _ => None,
        }
    }
}

/// One page-fetch task
///
/// Units are created once per run by the planner and never mutated. The
/// `sequence` orders units inside a run; sequential scans rely on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Unit {
    pub kind: UnitKind,
    pub locator: Locator,
    pub sequence: u64,
}

impl Unit {
    pub fn new(kind: UnitKind, locator: Locator, sequence: u64) -> Self {
        Self {
            kind,
            locator,
            sequence,
        }
    }

    /// Stable identity used by the checkpoint store, e.g. `submission-page:1850:2`
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind.to_db_string(), self.locator.to_db_string())
    }

    /// Page number within its listing, when the unit is paginated
    pub fn page(&self) -> Option<u32> {
        match self.locator {
            Locator::Page(page) | Locator::ContestPage { page, .. } => Some(page),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
