#![forbid(unsafe_code)]

/// Every status a job can hold. Stored as the lowercase string form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobStatus {
    Accepted,
    Running,
    RunningWithErrors,
    Previewing,
    Paused,
    Successful,
    CompleteWithErrors,
    Canceled,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Running => "running",
            Self::RunningWithErrors => "running_with_errors",
            Self::Previewing => "previewing",
            Self::Paused => "paused",
            Self::Successful => "successful",
            Self::CompleteWithErrors => "complete_with_errors",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "accepted" => Some(Self::Accepted),
            "running" => Some(Self::Running),
            "running_with_errors" => Some(Self::RunningWithErrors),
            "previewing" => Some(Self::Previewing),
            "paused" => Some(Self::Paused),
            "successful" => Some(Self::Successful),
            "complete_with_errors" => Some(Self::CompleteWithErrors),
            "canceled" => Some(Self::Canceled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal statuses accept no further mutation (failed re-fail aside).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Successful | Self::CompleteWithErrors | Self::Canceled | Self::Failed
        )
    }

    /// Active statuses may still have work dispatched.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Running | Self::RunningWithErrors | Self::Previewing
        )
    }

    pub fn default_message(self) -> &'static str {
        match self {
            Self::Accepted => "The job has been accepted and is waiting to be processed",
            Self::Running => "The job is being processed",
            Self::RunningWithErrors => "The job is being processed, but some items have failed",
            Self::Previewing => "The job is generating a preview before auto-pausing",
            Self::Paused => "The job is paused and may be resumed",
            Self::Successful => "The job has completed successfully",
            Self::CompleteWithErrors => "The job has completed with errors; see the job errors",
            Self::Canceled => "The job was canceled",
            Self::Failed => "The job failed with an unknown error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
