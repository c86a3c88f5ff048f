/// Progress state definitions for tracking harvest units
///
/// This module defines the states a unit moves through and the per-unit
/// progress entry kept by the orchestrator and the checkpoint store.
use crate::model::Unit;
use crate::HarvestError;
use std::fmt;

/// Represents the processing state of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressState {
    /// Not yet dispatched in any run
    Pending,

    /// Dispatched to a worker; completion not yet recorded
    InFlight,

    /// Fetched and extracted; its records are in the store
    Done,

    /// Retry budget exhausted or page could not be parsed
    Failed,
}

impl ProgressState {
    /// Returns true if a run should dispatch a unit in this state
    ///
    /// Failed units are retried in later runs; InFlight units never had their
    /// completion recorded, so they are dispatched again too.
    pub fn needs_dispatch(&self) -> bool {
        !matches!(self, Self::Done)
    }

    /// Returns true if the state machine allows moving to `next`
    pub fn can_transition_to(&self, next: ProgressState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::Failed, Self::InFlight)
                | (Self::InFlight, Self::Done)
                | (Self::InFlight, Self::Failed)
        )
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_flight" => Some(Self::InFlight),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn all_states() -> Vec<Self> {
        vec![Self::Pending, Self::InFlight, Self::Done, Self::Failed]
    }
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Per-unit progress, mutated only by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEntry {
    pub unit: Unit,
    pub state: ProgressState,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl ProgressEntry {
    pub fn new(unit: Unit) -> Self {
        Self {
            unit,
            state: ProgressState::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    /// Normalizes an entry read back from storage
    ///
    /// An InFlight entry means the previous process stopped before recording
    /// completion, so it starts over as Pending.
    pub fn resumed(mut self) -> Self {
        if self.state == ProgressState::InFlight {
            self.state = ProgressState::Pending;
        }
        self
    }

    pub fn mark_in_flight(&mut self) -> Result<(), HarvestError> {
        self.advance(ProgressState::InFlight)
    }

    pub fn mark_done(&mut self, attempts: u32) -> Result<(), HarvestError> {
        self.advance(ProgressState::Done)?;
        self.attempts += attempts;
        self.last_error = None;
        Ok(())
    }

    pub fn mark_failed(&mut self, attempts: u32, error: String) -> Result<(), HarvestError> {
        self.advance(ProgressState::Failed)?;
        self.attempts += attempts;
        self.last_error = Some(error);
        Ok(())
    }

    fn advance(&mut self, next: ProgressState) -> Result<(), HarvestError> {
        if !self.state.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                unit: self.unit.key(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}
