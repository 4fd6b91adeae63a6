use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{SessionId, SessionKey};
use crate::model::step::{SessionFlow, analysis_trigger_index};
use crate::model::unit::Unit;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionSnapshotError {
    #[error("session has no units")]
    NoUnits,

    #[error("unit {unit} has no steps")]
    NoSteps { unit: usize },

    #[error("active unit index {index} out of range for {len} units")]
    ActiveUnitOutOfRange { index: usize, len: usize },

    #[error("unit at position {position} carries index {index}")]
    UnitIndexMismatch { position: usize, index: usize },

    #[error("unit {unit} is behind the active unit but not finished")]
    UnfinishedEarlierUnit { unit: usize },

    #[error("unit {unit} is ahead of the active unit but already started")]
    StartedLaterUnit { unit: usize },

    #[error("unit {unit} is past its analysis step without an analysis")]
    MissingAnalysis { unit: usize },

    #[error("snapshot id {stored} does not match key {expected}")]
    IdMismatch { stored: SessionId, expected: SessionId },

    #[error("completed session has no completion time")]
    MissingCompletedAt,

    #[error("session already completed")]
    AlreadyCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
        }
    }
}

/// Full persisted state of a session; the unit of every durable write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub key: SessionKey,
    pub flow: SessionFlow,
    pub units: Vec<Unit>,
    pub active_unit_index: usize,
    pub status: SessionStatus,
    pub break_offered: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One day's or one part's worth of practice.
///
/// Exactly one unit is active while in progress; once completed the session
/// rejects further transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    key: SessionKey,
    flow: SessionFlow,
    units: Vec<Unit>,
    active_unit_index: usize,
    status: SessionStatus,
    break_offered: bool,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Start a fresh session at the first step of the first unit.
    ///
    /// # Errors
    ///
    /// Returns `SessionSnapshotError` if `units` is empty or malformed.
    pub fn new(
        key: SessionKey,
        flow: SessionFlow,
        units: Vec<Unit>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionSnapshotError> {
        let session = Self {
            id: key.session_id(),
            key,
            flow,
            units,
            active_unit_index: 0,
            status: SessionStatus::InProgress,
            break_offered: false,
            started_at,
            completed_at: None,
        };
        session.validate()?;
        Ok(session)
    }

    /// Rehydrate a session from a persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SessionSnapshotError` if the snapshot violates any aggregate invariant.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Result<Self, SessionSnapshotError> {
        let expected = snapshot.key.session_id();
        if snapshot.id != expected {
            return Err(SessionSnapshotError::IdMismatch {
                stored: snapshot.id,
                expected,
            });
        }
        let session = Self {
            id: snapshot.id,
            key: snapshot.key,
            flow: snapshot.flow,
            units: snapshot.units,
            active_unit_index: snapshot.active_unit_index,
            status: snapshot.status,
            break_offered: snapshot.break_offered,
            started_at: snapshot.started_at,
            completed_at: snapshot.completed_at,
        };
        session.validate()?;
        Ok(session)
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            key: self.key,
            flow: self.flow,
            units: self.units.clone(),
            active_unit_index: self.active_unit_index,
            status: self.status,
            break_offered: self.break_offered,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }

    fn validate(&self) -> Result<(), SessionSnapshotError> {
        if self.units.is_empty() {
            return Err(SessionSnapshotError::NoUnits);
        }
        if self.active_unit_index >= self.units.len() {
            return Err(SessionSnapshotError::ActiveUnitOutOfRange {
                index: self.active_unit_index,
                len: self.units.len(),
            });
        }
        if self.status == SessionStatus::Completed && self.completed_at.is_none() {
            return Err(SessionSnapshotError::MissingCompletedAt);
        }

        for (position, unit) in self.units.iter().enumerate() {
            if unit.index() != position {
                return Err(SessionSnapshotError::UnitIndexMismatch {
                    position,
                    index: unit.index(),
                });
            }
            if unit.steps().is_empty() {
                return Err(SessionSnapshotError::NoSteps { unit: position });
            }
            if position < self.active_unit_index && !unit.is_finished() {
                return Err(SessionSnapshotError::UnfinishedEarlierUnit { unit: position });
            }
            if position > self.active_unit_index && unit.active_step_index() != 0 {
                return Err(SessionSnapshotError::StartedLaterUnit { unit: position });
            }
            if let Some(trigger) = analysis_trigger_index(unit.steps()) {
                if unit.active_step_index() > trigger && unit.analysis().is_none() {
                    return Err(SessionSnapshotError::MissingAnalysis { unit: position });
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn key(&self) -> SessionKey {
        self.key
    }

    #[must_use]
    pub fn flow(&self) -> SessionFlow {
        self.flow
    }

    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    #[must_use]
    pub fn active_unit_index(&self) -> usize {
        self.active_unit_index
    }

    #[must_use]
    pub fn current_unit(&self) -> &Unit {
        &self.units[self.active_unit_index]
    }

    pub fn current_unit_mut(&mut self) -> &mut Unit {
        &mut self.units[self.active_unit_index]
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    #[must_use]
    pub fn break_offered(&self) -> bool {
        self.break_offered
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn has_next_unit(&self) -> bool {
        self.active_unit_index + 1 < self.units.len()
    }

    /// Number of units whose pipeline has been walked to the end.
    #[must_use]
    pub fn finished_units(&self) -> usize {
        self.units.iter().filter(|unit| unit.is_finished()).count()
    }

    pub fn mark_break_offered(&mut self) {
        self.break_offered = true;
    }

    /// Make the next unit active at its first step.
    ///
    /// Returns `false` (and changes nothing) when the active unit is the last one.
    pub fn activate_next_unit(&mut self) -> bool {
        if self.is_completed() || !self.has_next_unit() {
            return false;
        }
        self.active_unit_index += 1;
        self.units[self.active_unit_index].reset_for_activation();
        true
    }

    /// Transition to `Completed`.
    ///
    /// # Errors
    ///
    /// Returns `SessionSnapshotError::AlreadyCompleted` on a second call.
    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<(), SessionSnapshotError> {
        if self.is_completed() {
            return Err(SessionSnapshotError::AlreadyCompleted);
        }
        self.status = SessionStatus::Completed;
        self.completed_at = Some(at.max(self.started_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::response::MinimumContentPolicy;
    use crate::model::step::{StepId, StepSpec};
    use crate::model::response::ResponseSlot;
    use crate::time::fixed_now;

    fn units(n: usize) -> Vec<Unit> {
        (0..n)
            .map(|i| {
                Unit::new(
                    i,
                    vec![
                        StepSpec::gated(StepId::Respond, ResponseSlot::Single),
                        StepSpec::manual(StepId::Done),
                    ],
                    MinimumContentPolicy::Any,
                )
            })
            .collect()
    }

    fn session(n: usize) -> Session {
        Session::new(
            SessionKey::part(1, 1, 1),
            SessionFlow::SegmentRecall,
            units(n),
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn empty_session_is_rejected() {
        let err = Session::new(
            SessionKey::part(1, 1, 1),
            SessionFlow::SegmentRecall,
            Vec::new(),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, SessionSnapshotError::NoUnits);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let session = session(3);
        let json = serde_json::to_string(&session.snapshot()).unwrap();
        let snapshot: SessionSnapshot = serde_json::from_str(&json).unwrap();
        let restored = Session::from_snapshot(snapshot).unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn snapshot_with_out_of_range_unit_is_rejected() {
        let mut snapshot = session(2).snapshot();
        snapshot.active_unit_index = 5;
        assert!(matches!(
            Session::from_snapshot(snapshot),
            Err(SessionSnapshotError::ActiveUnitOutOfRange { .. })
        ));
    }

    #[test]
    fn snapshot_past_analysis_without_result_is_rejected() {
        let mut snapshot = session(2).snapshot();
        snapshot.units[0].set_active_step_index(1);
        assert_eq!(
            Session::from_snapshot(snapshot),
            Err(SessionSnapshotError::MissingAnalysis { unit: 0 })
        );
    }

    #[test]
    fn activate_next_unit_stops_at_last() {
        let mut session = session(2);
        session.current_unit_mut().set_active_step_index(2);
        assert!(session.activate_next_unit());
        assert_eq!(session.active_unit_index(), 1);
        assert!(!session.activate_next_unit());
        assert_eq!(session.active_unit_index(), 1);
    }

    #[test]
    fn completes_exactly_once() {
        let mut session = session(1);
        session.complete(fixed_now()).unwrap();
        assert!(session.is_completed());
        assert_eq!(
            session.complete(fixed_now()),
            Err(SessionSnapshotError::AlreadyCompleted)
        );
    }
}
