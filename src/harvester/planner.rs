//! Unit planning: turns the configuration into the units of one source

use crate::config::{validate_username, Config, ScanMode};
use crate::harvester::SourceKind;
use crate::model::{Locator, Unit, UnitKind};

/// API method behind the rated-users unit
pub const RATED_USERS_METHOD: &str = "user.ratedList";

/// Generates the units of `source`, numbered in generation order
///
/// `known_usernames` extends the profile list (usernames already present in
/// the canonical users CSV); it is ignored by every other source. Usernames
/// from the CSV that are not valid handles are skipped with a warning.
pub fn plan_units(config: &Config, source: SourceKind, known_usernames: &[String]) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut push = |kind: UnitKind, locator: Locator| {
        let sequence = units.len() as u64;
        units.push(Unit::new(kind, locator, sequence));
    };

    match source {
        SourceKind::Contests => {
            for page in config.contests.first_page..=config.contests.last_page {
                push(UnitKind::ContestList, Locator::Page(page));
            }
        }
        SourceKind::Problems => {
            for page in config.problems.first_page..=config.problems.last_page {
                push(UnitKind::ProblemSet, Locator::Page(page));
            }
        }
        SourceKind::Submissions => {
            let mut seen = Vec::new();
            for &contest_id in &config.submissions.contest_ids {
                if seen.contains(&contest_id) {
                    continue;
                }
                seen.push(contest_id);
                for page in 1..=config.submissions.max_pages {
                    push(
                        UnitKind::SubmissionPage,
                        Locator::ContestPage { contest_id, page },
                    );
                }
            }
        }
        SourceKind::Users => {
            push(
                UnitKind::RatedUsers,
                Locator::Method(RATED_USERS_METHOD.to_string()),
            );
        }
        SourceKind::Profiles => {
            let mut seen: Vec<&str> = Vec::new();
            let from_csv: &[String] = if config.profiles.from_users_csv {
                known_usernames
            } else {
                &[]
            };
            for username in config.profiles.usernames.iter().chain(from_csv) {
                let username = username.trim();
                if username.is_empty() || seen.contains(&username) {
                    continue;
                }
                if let Err(e) = validate_username(username) {
                    tracing::warn!("Skipping profile: {}", e);
                    continue;
                }
                seen.push(username);
                push(
                    UnitKind::UserProfile,
                    Locator::Username(username.to_string()),
                );
            }
        }
    }

    units
}

/// Scan mode used for a source
///
/// Submission pages are always scanned sequentially per contest; the status
/// listing of a contest has no known length.
pub fn scan_mode_for(config: &Config, source: SourceKind) -> ScanMode {
    match source {
        SourceKind::Contests => config.contests.scan_mode,
        SourceKind::Problems => config.problems.scan_mode,
        SourceKind::Submissions => ScanMode::Sequential,
        SourceKind::Users | SourceKind::Profiles => ScanMode::FixedRange,
    }
}

/// Groups units into lanes, each sorted by sequence
///
/// Fixed-range scans put every unit in its own lane. Sequential scans use
/// one lane per contest for submission pages and one lane per kind otherwise.
pub fn lanes(units: Vec<Unit>, mode: ScanMode) -> Vec<Vec<Unit>> {
    match mode {
        ScanMode::FixedRange => units.into_iter().map(|unit| vec![unit]).collect(),
        ScanMode::Sequential => {
            let mut lanes: Vec<(String, Vec<Unit>)> = Vec::new();
            for unit in units {
                let lane_key = match &unit.locator {
                    Locator::ContestPage { contest_id, .. } => {
                        format!("{}:{}", unit.kind, contest_id)
                    }
                    _ => unit.kind.to_string(),
                };
                match lanes.iter_mut().find(|(key, _)| *key == lane_key) {
                    Some((_, lane)) => lane.push(unit),
                    None => lanes.push((lane_key, vec![unit])),
                }
            }
            lanes
                .into_iter()
                .map(|(_, mut lane)| {
                    lane.sort_by_key(|unit| unit.sequence);
                    lane
                })
                .collect()
        }
    }
}
