//! Core data model: units of work, their progress, and harvested records

mod progress;
mod record;
mod unit;

pub use progress::{ProgressEntry, ProgressState};
pub use record::{
    ordered_set, ContestRecord, ProblemRecord, Record, RecordKey, RecordKind, SubmissionRecord,
    UserProfileRecord,
};
pub use unit::{Locator, Unit, UnitKind};
