#![forbid(unsafe_code)]
//! The job transition table. Declared flat so the permitted transitions can
//! be read (and audited) directly; callers consult it, nothing mutates it.

use crate::status::JobStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobEvent {
    Start,
    StartWithPreview,
    SkipPreview,
    Complete,
    CompleteWithErrors,
    Cancel,
    Fail,
    Pause,
    Resume,
}

impl JobEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::StartWithPreview => "START_WITH_PREVIEW",
            Self::SkipPreview => "SKIP_PREVIEW",
            Self::Complete => "COMPLETE",
            Self::CompleteWithErrors => "COMPLETE_WITH_ERRORS",
            Self::Cancel => "CANCEL",
            Self::Fail => "FAIL",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
        }
    }
}

impl std::fmt::Display for JobEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

use self::JobEvent as E;
use crate::status::JobStatus as S;

const TRANSITIONS: &[(JobStatus, JobEvent, JobStatus)] = &[
    (S::Accepted, E::Start, S::Running),
    (S::Accepted, E::StartWithPreview, S::Previewing),
    (S::Running, E::Complete, S::Successful),
    (S::Running, E::CompleteWithErrors, S::CompleteWithErrors),
    (S::Running, E::Cancel, S::Canceled),
    (S::Running, E::Fail, S::Failed),
    (S::Running, E::Pause, S::Paused),
    (S::RunningWithErrors, E::Complete, S::Successful),
    (S::RunningWithErrors, E::CompleteWithErrors, S::CompleteWithErrors),
    (S::RunningWithErrors, E::Cancel, S::Canceled),
    (S::RunningWithErrors, E::Fail, S::Failed),
    (S::RunningWithErrors, E::Pause, S::Paused),
    (S::Previewing, E::SkipPreview, S::Running),
    (S::Previewing, E::Cancel, S::Canceled),
    (S::Previewing, E::Fail, S::Failed),
    (S::Previewing, E::Pause, S::Paused),
    (S::Paused, E::SkipPreview, S::Running),
    (S::Paused, E::Resume, S::Running),
    (S::Paused, E::Cancel, S::Canceled),
    (S::Paused, E::Fail, S::Failed),
    // Re-failing a failed job is allowed so that redelivered failures stay
    // idempotent.
    (S::Failed, E::Fail, S::Failed),
];

/// The status the table maps (current, event) to, if any.
pub fn target(current: JobStatus, event: JobEvent) -> Option<JobStatus> {
    TRANSITIONS
        .iter()
        .find(|(from, ev, _)| *from == current && *ev == event)
        .map(|(_, _, to)| *to)
}

/// True iff feeding `event` in `current` lands exactly on `desired`.
pub fn can_transition(current: JobStatus, desired: JobStatus, event: JobEvent) -> bool {
    target(current, event) == Some(desired)
}

pub fn validate_transition(
    current: JobStatus,
    desired: JobStatus,
    event: JobEvent,
) -> Result<(), ConflictError> {
    if can_transition(current, desired, event) {
        Ok(())
    } else {
        Err(ConflictError {
            current,
            desired,
        })
    }
}

/// A status change the transition table does not permit, or a write against
/// a job already stored in a terminal status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictError {
    pub current: JobStatus,
    pub desired: JobStatus,
}

impl std::fmt::Display for ConflictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "job status cannot change from {} to {}",
            self.current, self.desired
        )
    }
}

impl std::error::Error for ConflictError {}
