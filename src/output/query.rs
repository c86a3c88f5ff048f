//! Read-only lookups over a canonical dataset

use crate::config::OutputConfig;
use crate::merge::{merge, CanonicalDataset};
use crate::model::{ContestRecord, Record, RecordKey, RecordKind, SubmissionRecord, UserProfileRecord};
use crate::output::csv_output;
use crate::Result;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Numeric user fields that can rank users
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserMetric {
    Rating,
    MaxStreak,
    ProblemsSolved,
    Contribution,
}

impl UserMetric {
    pub fn value(&self, user: &UserProfileRecord) -> Option<i64> {
        match self {
            Self::Rating => user.rating,
            Self::MaxStreak => user.max_streak.map(i64::from),
            Self::ProblemsSolved => user.problems_solved.map(i64::from),
            Self::Contribution => user.contribution,
        }
    }
}

/// Average rating of an organization's rated users
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationRating {
    pub organization: String,
    pub average_rating: f64,
    pub users: usize,
}

/// Queries over contests, submissions and users
pub struct DatasetQuery {
    dataset: CanonicalDataset,
}

impl DatasetQuery {
    pub fn new(dataset: CanonicalDataset) -> Self {
        Self { dataset }
    }

    /// Loads every canonical CSV present in the output directory
    pub fn load(output: &OutputConfig) -> Result<Self> {
        let mut records = Vec::new();
        for kind in RecordKind::all() {
            let path = output.path_for(kind.file_name());
            if path.exists() {
                records.extend(csv_output::read_records(&path, kind)?);
            }
        }
        Ok(Self::new(merge(records, Vec::new())))
    }

    pub fn dataset(&self) -> &CanonicalDataset {
        &self.dataset
    }

    fn users(&self) -> impl Iterator<Item = &UserProfileRecord> {
        self.dataset.of_kind(RecordKind::User).filter_map(|r| match r {
            Record::User(user) => Some(user),
            _ => None,
        })
    }

    pub fn user(&self, username: &str) -> Option<&UserProfileRecord> {
        match self
            .dataset
            .get(RecordKind::User, &RecordKey::Text(username.to_string()))
        {
            Some(Record::User(user)) => Some(user),
            _ => None,
        }
    }

    /// Users whose country matches, case-insensitively
    pub fn users_in_country(&self, country: &str) -> Vec<&UserProfileRecord> {
        self.users()
            .filter(|u| {
                u.country
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(country))
            })
            .collect()
    }

    /// The `n` best users by `metric`, highest first
    ///
    /// Users without a value are left out; equal values are ordered by username.
    pub fn top_users(&self, metric: UserMetric, n: usize) -> Vec<(&UserProfileRecord, i64)> {
        rank(self.users(), metric, n)
    }

    /// The `n` best users of an organization by `metric`
    pub fn top_users_in_organization(
        &self,
        organization: &str,
        metric: UserMetric,
        n: usize,
    ) -> Vec<(&UserProfileRecord, i64)> {
        rank(
            self.users()
                .filter(|u| u.organization.as_deref() == Some(organization)),
            metric,
            n,
        )
    }

    /// Organizations of a country ranked by the average rating of their users
    ///
    /// Users without a rating count as 0; users without an organization are ignored.
    pub fn top_organizations(&self, country: &str, n: usize) -> Vec<OrganizationRating> {
        let mut totals: HashMap<&str, (i64, usize)> = HashMap::new();
        for user in self.users_in_country(country) {
            let Some(organization) = user.organization.as_deref() else {
                continue;
            };
            let entry = totals.entry(organization).or_insert((0, 0));
            entry.0 += user.rating.unwrap_or(0);
            entry.1 += 1;
        }

        let mut ranked: Vec<OrganizationRating> = totals
            .into_iter()
            .map(|(organization, (total, users))| OrganizationRating {
                organization: organization.to_string(),
                average_rating: total as f64 / users as f64,
                users,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.average_rating
                .partial_cmp(&a.average_rating)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.organization.cmp(&b.organization))
        });
        ranked.truncate(n);
        ranked
    }

    /// Contests listing `handle` among their writers, in canonical order
    pub fn contests_written_by(&self, handle: &str) -> Vec<&ContestRecord> {
        self.dataset
            .of_kind(RecordKind::Contest)
            .filter_map(|r| match r {
                Record::Contest(contest) if contest.writers.iter().any(|w| w == handle) => {
                    Some(contest)
                }
                _ => None,
            })
            .collect()
    }

    /// Submissions made by `username`, newest first
    pub fn submissions_by(&self, username: &str) -> Vec<&SubmissionRecord> {
        self.dataset
            .of_kind(RecordKind::Submission)
            .filter_map(|r| match r {
                Record::Submission(s) if s.username == username => Some(s),
                _ => None,
            })
            .collect()
    }
}

fn rank<'a>(
    users: impl Iterator<Item = &'a UserProfileRecord>,
    metric: UserMetric,
    n: usize,
) -> Vec<(&'a UserProfileRecord, i64)> {
    let mut ranked: Vec<_> = users
        .filter_map(|u| metric.value(u).map(|value| (u, value)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.username.cmp(&b.0.username)));
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(
        username: &str,
        rating: Option<i64>,
        country: Option<&str>,
        organization: Option<&str>,
    ) -> Record {
        let mut user = UserProfileRecord::new(username);
        user.rating = rating;
        user.country = country.map(str::to_string);
        user.organization = organization.map(str::to_string);
        Record::User(user)
    }

    fn query() -> DatasetQuery {
        let mut streaky = UserProfileRecord::new("streaky");
        streaky.max_streak = Some(400);

        let records = vec![
            user("tourist", Some(3800), Some("Belarus"), Some("ITMO University")),
            user("jiangly", Some(3800), Some("China"), Some("Peking University")),
            user("Benq", Some(3700), Some("United States"), Some("MIT")),
            user("newbie", None, Some("China"), Some("Peking University")),
            user("orz", Some(2000), Some("china"), Some("Tsinghua University")),
            Record::User(streaky),
            Record::Contest(ContestRecord {
                contest_id: Some("1850".to_string()),
                name: "Codeforces Round 886 (Div. 4)".to_string(),
                writers: vec!["Vladosiya".to_string(), "mesanu".to_string()],
                start_time: String::new(),
                length: String::new(),
            }),
            Record::Contest(ContestRecord {
                contest_id: Some("1851".to_string()),
                name: "Codeforces Round 888 (Div. 3)".to_string(),
                writers: vec!["Vladosiya".to_string()],
                start_time: String::new(),
                length: String::new(),
            }),
            Record::Submission(SubmissionRecord {
                submission_id: "215000001".to_string(),
                contest_id: "1850".to_string(),
                submitted_at: String::new(),
                problem_id: "1850A".to_string(),
                language: "Rust 2021".to_string(),
                verdict: "Accepted".to_string(),
                time_ms: Some(15),
                memory_kb: Some(0),
                username: "tourist".to_string(),
            }),
        ];
        DatasetQuery::new(merge(records, Vec::new()))
    }

    #[test]
    fn test_user_lookup() {
        let query = query();
        assert_eq!(query.user("tourist").and_then(|u| u.rating), Some(3800));
        assert!(query.user("nobody").is_none());
    }

    #[test]
    fn test_users_in_country_ignores_case() {
        let query = query();
        let names: Vec<_> = query
            .users_in_country("China")
            .iter()
            .map(|u| u.username.as_str())
            .collect();
        assert_eq!(names, vec!["jiangly", "newbie", "orz"]);
    }

    #[test]
    fn test_top_users_excludes_absent_and_breaks_ties_by_name() {
        let query = query();
        let top: Vec<_> = query
            .top_users(UserMetric::Rating, 3)
            .into_iter()
            .map(|(u, value)| (u.username.as_str(), value))
            .collect();
        assert_eq!(
            top,
            vec![("jiangly", 3800), ("tourist", 3800), ("Benq", 3700)]
        );

        let all = query.top_users(UserMetric::Rating, 100);
        assert_eq!(all.len(), 4);

        let streaks = query.top_users(UserMetric::MaxStreak, 10);
        assert_eq!(streaks.len(), 1);
        assert_eq!(streaks[0].0.username, "streaky");
    }

    #[test]
    fn test_top_organizations() {
        let query = query();
        let orgs = query.top_organizations("China", 5);
        assert_eq!(orgs.len(), 2);
        assert_eq!(orgs[0].organization, "Tsinghua University");
        assert_eq!(orgs[0].average_rating, 2000.0);
        assert_eq!(orgs[1].organization, "Peking University");
        assert_eq!(orgs[1].users, 2);
        assert_eq!(orgs[1].average_rating, 1900.0);
    }

    #[test]
    fn test_top_users_in_organization() {
        let query = query();
        let top = query.top_users_in_organization("Peking University", UserMetric::Rating, 10);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0.username, "jiangly");
    }

    #[test]
    fn test_contests_and_submissions() {
        let query = query();
        let written: Vec<_> = query
            .contests_written_by("Vladosiya")
            .iter()
            .map(|c| c.contest_id.as_deref())
            .collect();
        assert_eq!(written, vec![Some("1851"), Some("1850")]);
        assert_eq!(query.contests_written_by("mesanu").len(), 1);

        assert_eq!(query.submissions_by("tourist").len(), 1);
        assert!(query.submissions_by("jiangly").is_empty());
    }

    #[test]
    fn test_load_from_output_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let output = OutputConfig {
            directory: temp.path().to_string_lossy().to_string(),
        };
        std::fs::write(
            output.path_for("users.csv"),
            "username,rating,country\ntourist,3800,Belarus\n",
        )
        .unwrap();

        let query = DatasetQuery::load(&output).unwrap();
        assert_eq!(query.dataset().len(), 1);
        assert_eq!(query.users_in_country("Belarus").len(), 1);
    }
}
