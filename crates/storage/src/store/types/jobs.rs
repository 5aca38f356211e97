#![forbid(unsafe_code)]

use sy_core::ids::JobId;
use sy_core::job::Job;
use sy_core::status::JobStatus;

/// Options for loading a single job.
///
/// `lock` runs the read inside an immediate (write-reserving) transaction so
/// a read-then-write mutator cannot interleave with another writer.
#[derive(Clone, Copy, Debug, Default)]
pub struct JobLoadOpts {
    pub include_links: bool,
    pub include_labels: bool,
    pub lock: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobSortField {
    CreatedAt,
    UpdatedAt,
    Status,
    Username,
}

impl JobSortField {
    pub(in crate::store) fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at_ms",
            Self::UpdatedAt => "updated_at_ms",
            Self::Status => "status",
            Self::Username => "username",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub(in crate::store) fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateField {
    CreatedAt,
    UpdatedAt,
}

impl DateField {
    pub(in crate::store) fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at_ms",
            Self::UpdatedAt => "updated_at_ms",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DateRange {
    pub field: DateField,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

/// Membership constraints on the whitelisted query fields.
#[derive(Clone, Debug, Default)]
pub struct JobFieldValues {
    pub status: Vec<JobStatus>,
    pub service_name: Vec<String>,
    pub provider_id: Vec<String>,
    pub username: Vec<String>,
    pub job_id: Vec<JobId>,
}

impl JobFieldValues {
    pub fn is_empty(&self) -> bool {
        self.status.is_empty()
            && self.service_name.is_empty()
            && self.provider_id.is_empty()
            && self.username.is_empty()
            && self.job_id.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct JobQuery {
    pub username: Option<String>,
    pub status: Option<JobStatus>,
    pub provider_id: Option<String>,
    pub service_name: Option<String>,
    pub where_in: JobFieldValues,
    pub where_not_in: JobFieldValues,
    pub date_range: Option<DateRange>,
    pub order_by: Option<(JobSortField, SortDirection)>,
}

/// One page of a job listing, with enough metadata to render pagination.
#[derive(Clone, Debug)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: i64,
    pub current_page: i64,
    pub per_page: i64,
}

impl JobPage {
    pub fn total_pages(&self) -> i64 {
        if self.total == 0 {
            0
        } else {
            (self.total + self.per_page - 1) / self.per_page
        }
    }
}

#[derive(Clone, Debug)]
pub struct JobErrorRow {
    pub id: i64,
    pub job_id: String,
    pub url: Option<String>,
    pub message: String,
    pub created_at_ms: i64,
}
