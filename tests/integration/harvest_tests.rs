//! Integration tests for the harvester
//!
//! These tests use wiremock to create mock HTTP servers and run complete
//! harvests of a source end-to-end, with the checkpoint database and the
//! output directory in temporary directories.

use cf_harvest::checkpoint::{
    open_checkpoint, CheckpointError, CheckpointResult, CheckpointStore, RunRecord, RunStatus,
    SqliteCheckpoint, StoredRecord,
};
use cf_harvest::config::{
    ApiPacingConfig, Config, FetcherConfig, HarvestConfig, IdentityConfig, OutputConfig,
    PageRangeConfig, ProfilesConfig, ScanMode, SourceConfig, SubmissionsConfig,
};
use cf_harvest::model::{ContestRecord, Locator, ProgressEntry, RecordKey, UserProfileRecord};
use cf_harvest::output::read_records;
use cf_harvest::{
    harvest_source, HarvestError, ProgressState, Record, RecordKind, SourceKind, Unit, UnitKind,
};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, temp: &TempDir) -> Config {
    Config {
        harvest: HarvestConfig {
            concurrency: Some(4),
            batch_size: 2,
            checkpoint_path: temp.path().join("harvest.db").to_string_lossy().to_string(),
        },
        fetcher: FetcherConfig {
            min_interval_ms: 10, // Very short for testing
            jitter_ms: 0,
            timeout_secs: 5,
            max_attempts: 3,
            backoff_base_ms: 10,
            backoff_max_ms: 50,
            throttle_cooldown_secs: 1,
        },
        api: ApiPacingConfig {
            min_interval_ms: 10,
            jitter_ms: 0,
        },
        identity: IdentityConfig {
            user_agent: "cf-harvest-test/1.0".to_string(),
            accept_language: None,
        },
        source: SourceConfig {
            base_url: base_url.to_string(),
            api_url: format!("{}/api", base_url),
        },
        output: OutputConfig {
            directory: temp.path().join("data").to_string_lossy().to_string(),
        },
        contests: PageRangeConfig {
            first_page: 1,
            last_page: 2,
            scan_mode: ScanMode::FixedRange,
        },
        problems: PageRangeConfig {
            first_page: 1,
            last_page: 1,
            scan_mode: ScanMode::FixedRange,
        },
        submissions: SubmissionsConfig {
            contest_ids: vec![],
            max_pages: 3,
        },
        profiles: ProfilesConfig {
            usernames: vec![],
            from_users_csv: true,
        },
    }
}

/// A contest listing page with one row per (id, name)
fn contest_page(contests: &[(u64, &str)]) -> String {
    let rows: String = contests
        .iter()
        .map(|(id, name)| {
            format!(
                r#"<tr><td><a href="/contest/{id}">{name}</a></td><td><a href="/profile/writer{id}">writer{id}</a></td><td>Jul/21/2023 17:35</td><td>02:15</td></tr>"#
            )
        })
        .collect();
    format!(
        "<html><body><div class=\"datatable\"><table><tr><th>Name</th><th>Writers</th><th>Start</th><th>Length</th></tr>{}</table></div></body></html>",
        rows
    )
}

fn submission_page(ids: &[u64], has_next: bool) -> String {
    let rows: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<tr><td>{id}</td><td>Jul/21/2023 17:40</td><td><a href="/profile/tourist">tourist</a></td><td><a href="/contest/1850/problem/A">A - To My Critics</a></td><td>GNU C++17</td><td><span class="verdict-accepted">Accepted</span></td><td>15 ms</td><td>0 KB</td></tr>"#
            )
        })
        .collect();
    let pagination = if has_next {
        r#"<div class="pagination"><span class="next">&rarr;</span></div>"#
    } else {
        ""
    };
    format!(
        "<html><body><table class=\"status-frame-datatable\"><tr><th>#</th></tr>{}</table>{}</body></html>",
        rows, pagination
    )
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

fn contest_ids(path: &Path) -> Vec<String> {
    read_records(path, RecordKind::Contest)
        .expect("Failed to read contests CSV")
        .into_iter()
        .filter_map(|record| match record {
            Record::Contest(c) => c.contest_id,
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_listing_harvest_sorted_descending() {
    let mock_server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/contests/page/1"))
        .respond_with(html(contest_page(&[
            (1850, "Round 886"),
            (1900, "Round 911"),
            (1875, "Round 900"),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    // The page after the last one renders an empty table
    Mock::given(method("GET"))
        .and(path("/contests/page/2"))
        .respond_with(html(contest_page(&[])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), &temp);
    let mut store = open_checkpoint(Path::new(&config.harvest.checkpoint_path))
        .expect("Failed to open checkpoint");

    let report = harvest_source(
        &config,
        SourceKind::Contests,
        &mut store,
        "hash-1",
        false,
        std::future::pending(),
    )
    .await
    .expect("Harvest failed");

    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.failed, 0);
    assert_eq!(report.summary.records, 3);
    assert_eq!(report.dataset.len(), 3);

    let keys: Vec<RecordKey> = report.dataset.records().iter().map(Record::natural_key).collect();
    assert_eq!(
        keys,
        vec![
            RecordKey::Numeric(1900),
            RecordKey::Numeric(1875),
            RecordKey::Numeric(1850)
        ]
    );

    let csv_path = config.output.path_for("contests.csv");
    assert_eq!(contest_ids(&csv_path), vec!["1900", "1875", "1850"]);

    let run = store
        .get_latest_run("contests")
        .expect("Failed to query runs")
        .expect("Run not recorded");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        store
            .count_progress_by_state(UnitKind::ContestList, ProgressState::Done)
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn test_resume_skips_done_units() {
    let mock_server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    // Page 1 finished in an earlier run and must not be fetched again
    Mock::given(method("GET"))
        .and(path("/contests/page/1"))
        .respond_with(html(contest_page(&[(1, "never fetched")])))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/contests/page/2"))
        .respond_with(html(contest_page(&[(20, "Round 20")])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/contests/page/3"))
        .respond_with(html(contest_page(&[(30, "Round 30")])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri(), &temp);
    config.contests.last_page = 3;

    let mut store = open_checkpoint(Path::new(&config.harvest.checkpoint_path))
        .expect("Failed to open checkpoint");

    // Simulate an earlier interrupted run: {1: Done, 2: Failed, 3: Pending}
    let run_id = store.create_run("contests", "hash-1").unwrap();
    store
        .update_run_status(run_id, RunStatus::Interrupted)
        .unwrap();

    let page = |n: u32| Unit::new(UnitKind::ContestList, Locator::Page(n), u64::from(n - 1));
    let mut done = ProgressEntry::new(page(1));
    done.mark_in_flight().unwrap();
    done.mark_done(1).unwrap();
    let mut failed = ProgressEntry::new(page(2));
    failed.mark_in_flight().unwrap();
    failed
        .mark_failed(3, "server returned 503".to_string())
        .unwrap();
    let pending = ProgressEntry::new(page(3));

    let earlier = StoredRecord {
        unit_key: page(1).key(),
        record: Record::Contest(ContestRecord {
            contest_id: Some("10".to_string()),
            name: "Round 10".to_string(),
            writers: vec![],
            start_time: String::new(),
            length: String::new(),
        }),
    };
    store.flush(&[done, failed, pending], &[earlier]).unwrap();

    let report = harvest_source(
        &config,
        SourceKind::Contests,
        &mut store,
        "hash-1",
        false,
        std::future::pending(),
    )
    .await
    .expect("Harvest failed");

    assert_eq!(report.run_id, run_id);
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.already_done, 1);
    assert_eq!(report.summary.succeeded, 2);

    // Records of the earlier run are part of the final dataset
    let csv_path = config.output.path_for("contests.csv");
    assert_eq!(contest_ids(&csv_path), vec!["30", "20", "10"]);

    let failed_entry = store
        .load_progress(UnitKind::ContestList)
        .unwrap()
        .into_iter()
        .find(|entry| entry.unit.page() == Some(2))
        .expect("Page 2 missing from checkpoint");
    assert_eq!(failed_entry.state, ProgressState::Done);
    assert_eq!(failed_entry.attempts, 4);
    assert!(failed_entry.last_error.is_none());
}

#[tokio::test]
async fn test_retry_budget_then_failed() {
    let mock_server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/contests/page/1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri(), &temp);
    config.contests.last_page = 1;

    let mut store = open_checkpoint(Path::new(&config.harvest.checkpoint_path))
        .expect("Failed to open checkpoint");

    let report = harvest_source(
        &config,
        SourceKind::Contests,
        &mut store,
        "hash-1",
        false,
        std::future::pending(),
    )
    .await
    .expect("A failed unit must not fail the run");

    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.succeeded, 0);
    assert!(report.dataset.is_empty());

    let entries = store.load_progress(UnitKind::ContestList).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].state, ProgressState::Failed);
    assert_eq!(entries[0].attempts, 3);
    assert!(entries[0].last_error.is_some());
}

#[tokio::test]
async fn test_throttled_page_waits_cooldown_then_fails() {
    let mock_server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/contests/page/1"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri(), &temp);
    config.contests.last_page = 1;
    config.fetcher.max_attempts = 2;
    config.fetcher.throttle_cooldown_secs = 1;

    let mut store = open_checkpoint(Path::new(&config.harvest.checkpoint_path))
        .expect("Failed to open checkpoint");

    let started = Instant::now();
    let report = harvest_source(
        &config,
        SourceKind::Contests,
        &mut store,
        "hash-1",
        false,
        std::future::pending(),
    )
    .await
    .expect("A throttled unit must not fail the run");
    let elapsed = started.elapsed();

    // The cooldown is far longer than the 10-50ms backoff ladder
    assert!(
        elapsed >= Duration::from_secs(1),
        "finished after {:?}, before the cooldown",
        elapsed
    );
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.succeeded, 0);

    let entries = store.load_progress(UnitKind::ContestList).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].state, ProgressState::Failed);
    assert_eq!(entries[0].attempts, 2);
    let error = entries[0].last_error.as_deref().unwrap_or_default();
    assert!(error.contains("throttled"), "unexpected error: {}", error);
}

#[tokio::test]
async fn test_timeouts_use_the_same_budget() {
    let mock_server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/contests/page/1"))
        .respond_with(html(contest_page(&[(1, "late")])).set_delay(Duration::from_secs(3)))
        .expect(2)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri(), &temp);
    config.contests.last_page = 1;
    config.fetcher.timeout_secs = 1;
    config.fetcher.max_attempts = 2;

    let mut store = open_checkpoint(Path::new(&config.harvest.checkpoint_path))
        .expect("Failed to open checkpoint");

    let report = harvest_source(
        &config,
        SourceKind::Contests,
        &mut store,
        "hash-1",
        false,
        std::future::pending(),
    )
    .await
    .expect("Harvest failed");

    assert_eq!(report.summary.failed, 1);
    assert_eq!(
        store
            .count_progress_by_state(UnitKind::ContestList, ProgressState::Failed)
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_submission_lane_stops_at_last_page() {
    let mock_server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/contest/1850/status/page/1"))
        .respond_with(html(submission_page(&[215000003, 215000002], true)))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/contest/1850/status/page/2"))
        .respond_with(html(submission_page(&[215000001], false)))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/contest/1850/status/page/3"))
        .respond_with(html(submission_page(&[], false)))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri(), &temp);
    config.submissions.contest_ids = vec![1850];

    let mut store = open_checkpoint(Path::new(&config.harvest.checkpoint_path))
        .expect("Failed to open checkpoint");

    let report = harvest_source(
        &config,
        SourceKind::Submissions,
        &mut store,
        "hash-1",
        false,
        std::future::pending(),
    )
    .await
    .expect("Harvest failed");

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.skipped, 1);
    assert_eq!(report.dataset.len(), 3);

    let first = &report.dataset.records()[0];
    match first {
        Record::Submission(s) => {
            assert_eq!(s.submission_id, "215000003");
            assert_eq!(s.contest_id, "1850");
            assert_eq!(s.problem_id, "A - To My Critics");
            assert_eq!(s.verdict, "Accepted");
            assert_eq!(s.time_ms, Some(15));
            assert_eq!(s.username, "tourist");
        }
        other => panic!("Unexpected record: {:?}", other),
    }

    // The page never reached stays pending for the next run
    assert_eq!(
        store
            .count_progress_by_state(UnitKind::SubmissionPage, ProgressState::Pending)
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_rated_users_then_profile_enrichment() {
    let mock_server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/api/user.ratedList"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"status":"OK","result":[
                {"handle":"tourist","rating":3800,"maxRating":4000,"rank":"legendary grandmaster","country":"Belarus","contribution":100,"friendOfCount":70000,"registrationTimeSeconds":1265987288},
                {"handle":"jiangly","rating":3700,"country":"China"}
            ]}"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/profile/tourist"))
        .respond_with(html(
            "<html><body><div>2000 problems solved for all time</div><div>10 days in a row max.</div></body></html>"
                .to_string(),
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    // Empty profile page: no statistics, no record
    Mock::given(method("GET"))
        .and(path("/profile/jiangly"))
        .respond_with(html("<html><body></body></html>".to_string()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), &temp);
    let mut store = open_checkpoint(Path::new(&config.harvest.checkpoint_path))
        .expect("Failed to open checkpoint");

    let users = harvest_source(
        &config,
        SourceKind::Users,
        &mut store,
        "hash-1",
        false,
        std::future::pending(),
    )
    .await
    .expect("Users harvest failed");
    assert_eq!(users.dataset.len(), 2);

    let profiles = harvest_source(
        &config,
        SourceKind::Profiles,
        &mut store,
        "hash-1",
        false,
        std::future::pending(),
    )
    .await
    .expect("Profiles harvest failed");
    assert_eq!(profiles.summary.total, 2);
    assert_eq!(profiles.summary.succeeded, 2);

    let users_csv = config.output.path_for("users.csv");
    let records = read_records(&users_csv, RecordKind::User).unwrap();
    assert_eq!(records.len(), 2);

    let expected = UserProfileRecord {
        username: "tourist".to_string(),
        rating: Some(3800),
        rank: Some("legendary grandmaster".to_string()),
        max_rating: Some(4000),
        contribution: Some(100),
        organization: None,
        friend_count: Some(70000),
        registration_date: Some("2010-02-12".to_string()),
        city: None,
        country: Some("Belarus".to_string()),
        max_streak: Some(10),
        problems_solved: Some(2000),
    };
    assert_eq!(records[0], Record::User(expected));

    match &records[1] {
        Record::User(user) => {
            assert_eq!(user.username, "jiangly");
            assert_eq!(user.rating, Some(3700));
            assert_eq!(user.max_streak, None);
        }
        other => panic!("Unexpected record: {:?}", other),
    }
}

#[tokio::test]
async fn test_interrupt_keeps_progress() {
    let mock_server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/contests/page/1"))
        .respond_with(html(contest_page(&[(1, "slow")])).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri(), &temp);
    config.contests.last_page = 1;

    let mut store = open_checkpoint(Path::new(&config.harvest.checkpoint_path))
        .expect("Failed to open checkpoint");

    let result = harvest_source(
        &config,
        SourceKind::Contests,
        &mut store,
        "hash-1",
        false,
        tokio::time::sleep(Duration::from_millis(300)),
    )
    .await;

    assert!(matches!(result, Err(HarvestError::Interrupted { completed: 0 })));

    let run = store.get_latest_run("contests").unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Interrupted);

    // An interrupted unit is dispatched again by the next run
    let entries = store.load_progress(UnitKind::ContestList).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].state, ProgressState::Pending);
}

/// SQLite store whose flush number `fail_on` (1-based) returns an IO error
struct FailingFlushStore {
    inner: SqliteCheckpoint,
    flushes: usize,
    fail_on: usize,
}

impl CheckpointStore for FailingFlushStore {
    fn create_run(&mut self, source: &str, config_hash: &str) -> CheckpointResult<i64> {
        self.inner.create_run(source, config_hash)
    }

    fn get_run(&self, run_id: i64) -> CheckpointResult<RunRecord> {
        self.inner.get_run(run_id)
    }

    fn get_latest_run(&self, source: &str) -> CheckpointResult<Option<RunRecord>> {
        self.inner.get_latest_run(source)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> CheckpointResult<()> {
        self.inner.update_run_status(run_id, status)
    }

    fn complete_run(&mut self, run_id: i64) -> CheckpointResult<()> {
        self.inner.complete_run(run_id)
    }

    fn load_progress(&self, kind: UnitKind) -> CheckpointResult<Vec<ProgressEntry>> {
        self.inner.load_progress(kind)
    }

    fn flush(
        &mut self,
        entries: &[ProgressEntry],
        records: &[StoredRecord],
    ) -> CheckpointResult<()> {
        self.flushes += 1;
        if self.flushes == self.fail_on {
            return Err(CheckpointError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.flush(entries, records)
    }

    fn reset(&mut self, kind: UnitKind) -> CheckpointResult<()> {
        self.inner.reset(kind)
    }

    fn load_records(&self, kind: RecordKind) -> CheckpointResult<Vec<Record>> {
        self.inner.load_records(kind)
    }

    fn count_progress_by_state(
        &self,
        kind: UnitKind,
        state: ProgressState,
    ) -> CheckpointResult<u64> {
        self.inner.count_progress_by_state(kind, state)
    }

    fn count_records(&self, kind: RecordKind) -> CheckpointResult<u64> {
        self.inner.count_records(kind)
    }
}

#[tokio::test]
async fn test_failed_flush_aborts_run_and_keeps_earlier_batches() {
    let mock_server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    for page in 1..=5u64 {
        Mock::given(method("GET"))
            .and(path(format!("/contests/page/{}", page)))
            .respond_with(html(contest_page(&[(page * 10, "Round")])))
            .mount(&mock_server)
            .await;
    }

    let mut config = create_test_config(&mock_server.uri(), &temp);
    config.contests.last_page = 5;
    config.harvest.concurrency = Some(1);
    config.harvest.batch_size = 2;

    let inner = open_checkpoint(Path::new(&config.harvest.checkpoint_path))
        .expect("Failed to open checkpoint");
    // Flush 1 persists the planned units, flush 2 the first batch
    let mut store = FailingFlushStore {
        inner,
        flushes: 0,
        fail_on: 3,
    };

    let result = harvest_source(
        &config,
        SourceKind::Contests,
        &mut store,
        "hash-1",
        false,
        std::future::pending(),
    )
    .await;

    match result {
        Err(HarvestError::Checkpoint(e)) => assert!(e.to_string().contains("disk full")),
        other => panic!("expected a checkpoint error, got {:?}", other.map(|r| r.summary)),
    }

    let run = store
        .get_latest_run("contests")
        .unwrap()
        .expect("Run missing from checkpoint");
    assert_eq!(run.status, RunStatus::Failed);

    assert_eq!(
        store
            .count_progress_by_state(UnitKind::ContestList, ProgressState::Done)
            .unwrap(),
        2
    );
    assert_eq!(store.count_records(RecordKind::Contest).unwrap(), 2);
    assert!(!config.output.path_for("contests.csv").exists());
}
