//! Deduplication and merging of harvested records
//!
//! Records from every run of a source are folded into one canonical dataset
//! with exactly one record per natural key. Numeric keys come first in
//! descending order; text keys follow in first-seen order.

use crate::model::{Record, RecordKey, RecordKind};
use std::collections::HashMap;

/// The deduplicated result of a merge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalDataset {
    records: Vec<Record>,
    index: HashMap<(RecordKind, RecordKey), usize>,
}

impl CanonicalDataset {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks up the canonical record for a natural key
    pub fn get(&self, kind: RecordKind, key: &RecordKey) -> Option<&Record> {
        self.index
            .get(&(kind, key.clone()))
            .map(|&position| &self.records[position])
    }

    /// Records of one kind, in canonical order
    pub fn of_kind(&self, kind: RecordKind) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(move |r| r.kind() == kind)
    }

    fn from_records(records: Vec<Record>) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(position, record)| ((record.kind(), record.natural_key()), position))
            .collect();
        Self { records, index }
    }
}

/// Normalizes an id: a float-formatted integer such as `"1234.0"` becomes `"1234"`
///
/// Anything else is returned trimmed but otherwise unchanged.
pub fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some((whole, fraction)) = trimmed.split_once('.') {
        let integral = !whole.is_empty() && whole.bytes().all(|b| b.is_ascii_digit());
        let zero_fraction = !fraction.is_empty() && fraction.bytes().all(|b| b == b'0');
        if integral && zero_fraction {
            return whole.to_string();
        }
    }
    trimmed.to_string()
}

/// Merges an existing dataset with newly harvested records
///
/// - Numeric keys: the later occurrence wins (harvest order is the tie-break)
/// - Text and secondary keys: the first occurrence wins
/// - User records are combined field by field, so a later partial record
///   never erases a known value
///
/// `merge(merge(a, b), b) == merge(a, b)`.
pub fn merge(existing: Vec<Record>, incoming: Vec<Record>) -> CanonicalDataset {
    let mut numeric: HashMap<(RecordKind, u64), Record> = HashMap::new();
    let mut textual: Vec<Record> = Vec::new();
    let mut text_positions: HashMap<(RecordKind, RecordKey), usize> = HashMap::new();

    for record in existing.into_iter().chain(incoming) {
        let kind = record.kind();
        match (record.natural_key(), record) {
            (key, Record::User(user)) => match text_positions.get(&(kind, key.clone())) {
                Some(&position) => {
                    if let Record::User(stored) = &mut textual[position] {
                        stored.absorb(user);
                    }
                }
                None => {
                    text_positions.insert((kind, key), textual.len());
                    textual.push(Record::User(user));
                }
            },
            (RecordKey::Numeric(id), record) => {
                numeric.insert((kind, id), record);
            }
            (key, record) => {
                if !text_positions.contains_key(&(kind, key.clone())) {
                    text_positions.insert((kind, key), textual.len());
                    textual.push(record);
                }
            }
        }
    }

    let mut ordered: Vec<((RecordKind, u64), Record)> = numeric.into_iter().collect();
    ordered.sort_by(|a, b| {
        kind_rank(a.0 .0)
            .cmp(&kind_rank(b.0 .0))
            .then_with(|| b.0 .1.cmp(&a.0 .1))
    });

    let mut records: Vec<Record> = ordered.into_iter().map(|(_, record)| record).collect();
    records.extend(textual);

    tracing::debug!("Merged into {} canonical records", records.len());
    CanonicalDataset::from_records(records)
}

fn kind_rank(kind: RecordKind) -> usize {
    RecordKind::all()
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(usize::MAX)
}
