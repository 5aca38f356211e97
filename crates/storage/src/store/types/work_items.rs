#![forbid(unsafe_code)]

use sy_core::status::JobStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkItemStatus {
    Ready,
    Running,
    Successful,
    Failed,
    Canceled,
}

impl WorkItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "ready" => Some(Self::Ready),
            "running" => Some(Self::Running),
            "successful" => Some(Self::Successful),
            "failed" => Some(Self::Failed),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Successful | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome a worker reports for a claimed item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkItemDisposition {
    Successful,
    Failed,
    Canceled,
}

impl WorkItemDisposition {
    pub fn status(self) -> WorkItemStatus {
        match self {
            Self::Successful => WorkItemStatus::Successful,
            Self::Failed => WorkItemStatus::Failed,
            Self::Canceled => WorkItemStatus::Canceled,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorkItemRow {
    pub id: i64,
    pub job_id: String,
    pub service_id: String,
    pub status: WorkItemStatus,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// Outcome of a completion call. `applied` is false when the item was
/// already terminal (a redelivered completion).
#[derive(Clone, Debug)]
pub struct WorkItemCompleteResult {
    pub applied: bool,
    pub job_status: JobStatus,
    pub job_progress: i64,
}
