//! Output module for canonical datasets
//!
//! This module handles:
//! - Writing the canonical CSV of each record kind
//! - Cleaning raw CSV files from earlier harvests
//! - Querying a canonical dataset
//! - Reporting checkpoint statistics and run summaries

pub mod csv_output;
pub mod query;
pub mod stats;

pub use csv_output::{detect_kind, read_records, write_records};
pub use query::{DatasetQuery, OrganizationRating, UserMetric};
pub use stats::{load_statistics, print_statistics, print_summary, SourceStatistics};

use crate::config::OutputConfig;
use crate::merge::{merge, CanonicalDataset};
use crate::model::{Record, RecordKind};
use crate::{ConfigError, HarvestError, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Usernames of an existing users CSV, in file order
///
/// A missing file yields no usernames.
pub fn read_usernames(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        tracing::debug!("No users file at {}", path.display());
        return Ok(Vec::new());
    }

    let usernames = read_records(path, RecordKind::User)?
        .into_iter()
        .filter_map(|record| match record {
            Record::User(user) => Some(user.username),
            _ => None,
        })
        .collect();
    Ok(usernames)
}

/// Writes the canonical CSV of `kind` into the output directory
///
/// User records are merged field by field into the existing `users.csv`
/// first, so profile enrichment never drops users or values already there.
pub fn write_canonical(
    output: &OutputConfig,
    kind: RecordKind,
    dataset: &CanonicalDataset,
) -> Result<PathBuf> {
    fs::create_dir_all(&output.directory)?;
    let path = output.path_for(kind.file_name());

    let written = if kind == RecordKind::User && path.exists() {
        let existing = read_records(&path, kind)?;
        let incoming: Vec<Record> = dataset.of_kind(kind).cloned().collect();
        let enriched = merge(existing, incoming);
        write_records(&path, kind, enriched.records())?
    } else {
        write_records(&path, kind, dataset.of_kind(kind))?
    };

    tracing::debug!("Wrote {} rows to {}", written, path.display());
    Ok(path)
}

/// Cleans a raw CSV: normalizes ids, removes duplicates, writes the canonical file
///
/// The kind is detected from the header row. Returns the kind and the path written.
pub fn clean_csv(input: &Path, output: &OutputConfig) -> Result<(RecordKind, PathBuf)> {
    let mut reader = csv::Reader::from_reader(File::open(input)?);
    let kind = detect_kind(reader.headers()?).ok_or_else(|| {
        HarvestError::Config(ConfigError::Validation(format!(
            "cannot tell the record kind of {} from its header",
            input.display()
        )))
    })?;

    let records = read_records(input, kind)?;
    let raw_rows = records.len();
    let dataset = merge(records, Vec::new());

    fs::create_dir_all(&output.directory)?;
    let path = output.path_for(kind.file_name());
    write_records(&path, kind, dataset.records())?;

    tracing::info!(
        "Cleaned {}: {} rows, {} unique {} records",
        input.display(),
        raw_rows,
        dataset.len(),
        kind
    );
    Ok((kind, path))
}
