#![forbid(unsafe_code)]

use crate::fsm::{self, ConflictError, JobEvent};
use crate::ids::JobId;
use crate::link::JobLink;
use crate::status::JobStatus;
use crate::time::ts_ms_to_rfc3339;
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use std::collections::BTreeMap;

pub const MAX_REQUEST_LEN: usize = 4_096;
pub const MAX_MESSAGE_BLOB_LEN: usize = 4_096;
// Budget kept aside for the non-failure entries of the message map so the
// serialized blob stays within MAX_MESSAGE_BLOB_LEN.
const NON_FAILURE_MESSAGE_RESERVE: usize = 1_000;
const DATA_EXPIRATION_MS: i64 = 30 * 24 * 60 * 60 * 1_000;

fn truncate_chars(raw: &str, max: usize) -> String {
    raw.chars().take(max).collect()
}

/// Request URLs are persisted at most MAX_REQUEST_LEN characters long.
pub fn truncate_request(raw: &str) -> String {
    truncate_chars(raw, MAX_REQUEST_LEN)
}

/// Status-keyed human-readable messages, at most one entry per status.
///
/// Persisted as a JSON object. Older rows hold a bare string instead; on
/// decode that string becomes the entry for the job's current status, and
/// the next save writes the object form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusMessages(BTreeMap<JobStatus, String>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageDecodeError {
    UnknownStatusKey(String),
}

impl std::fmt::Display for MessageDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownStatusKey(key) => {
                write!(f, "stored message map has unknown status key: {key}")
            }
        }
    }
}

impl std::error::Error for MessageDecodeError {}

impl StatusMessages {
    pub fn decode(
        raw: Option<&str>,
        current: JobStatus,
    ) -> Result<Self, MessageDecodeError> {
        let Some(raw) = raw else {
            return Ok(Self::default());
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        match serde_json::from_str::<BTreeMap<String, String>>(trimmed) {
            Ok(by_name) => {
                let mut out = BTreeMap::new();
                for (key, message) in by_name {
                    let Some(status) = JobStatus::parse(&key) else {
                        return Err(MessageDecodeError::UnknownStatusKey(key));
                    };
                    out.insert(status, message);
                }
                Ok(Self(out))
            }
            // Not a JSON object: a legacy bare message for the current status.
            Err(_) => {
                let mut out = BTreeMap::new();
                out.insert(current, raw.to_string());
                Ok(Self(out))
            }
        }
    }

    /// Serialized blob form, with the failed-status entry truncated so the
    /// whole blob fits in MAX_MESSAGE_BLOB_LEN.
    pub fn encode(&self) -> String {
        let failure_budget = MAX_MESSAGE_BLOB_LEN - NON_FAILURE_MESSAGE_RESERVE;
        let mut by_name = BTreeMap::new();
        for (status, message) in &self.0 {
            let message = if *status == JobStatus::Failed {
                truncate_chars(message, failure_budget)
            } else {
                message.clone()
            };
            by_name.insert(status.as_str(), message);
        }
        serde_json::to_string(&by_name).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn get(&self, status: JobStatus) -> Option<&str> {
        self.0.get(&status).map(String::as_str)
    }

    pub fn set(&mut self, status: JobStatus, message: impl Into<String>) {
        self.0.insert(status, message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One end-to-end user request tracked through the transition table.
#[derive(Clone, Debug)]
pub struct Job {
    pub id: Option<i64>,
    pub job_id: JobId,
    pub request_id: JobId,
    pub username: String,
    pub status: JobStatus,
    pub messages: StatusMessages,
    pub progress: i64,
    pub batches_completed: i64,
    pub request: String,
    pub is_async: bool,
    pub ignore_errors: bool,
    pub num_input_granules: i64,
    pub collection_ids: Vec<String>,
    pub provider_id: Option<String>,
    pub service_name: Option<String>,
    pub destination_url: Option<String>,
    pub labels: Vec<String>,
    pub links: Vec<JobLink>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    /// Status the row held when loaded; `None` for a job never saved.
    /// The write barrier keys on this, not on the mutable `status`.
    pub original_status: Option<JobStatus>,
}

impl Job {
    pub fn new(
        username: impl Into<String>,
        request: impl Into<String>,
        num_input_granules: i64,
        collection_ids: Vec<String>,
    ) -> Self {
        let job_id = JobId::new();
        Self {
            id: None,
            job_id,
            request_id: job_id,
            username: username.into(),
            status: JobStatus::Accepted,
            messages: StatusMessages::default(),
            progress: 0,
            batches_completed: 0,
            request: request.into(),
            is_async: false,
            ignore_errors: false,
            num_input_granules,
            collection_ids,
            provider_id: None,
            service_name: None,
            destination_url: None,
            labels: Vec::new(),
            links: Vec::new(),
            created_at_ms: 0,
            updated_at_ms: 0,
            original_status: None,
        }
    }

    /// Field-level validation; returns one message per violation.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !(0..=100).contains(&self.progress) {
            problems.push("Job progress must be between 0 and 100".to_string());
        }
        if self.batches_completed < 0 {
            problems.push("Job batchesCompleted must be greater than or equal to 0".to_string());
        }
        if !(self.request.starts_with("http://") || self.request.starts_with("https://")) {
            problems.push(format!("Invalid request URL '{}'", self.request));
        }
        problems
    }

    /// The write barrier: a job stored terminal refuses any further write,
    /// re-failing a failed job excepted.
    pub fn validate_status(&self) -> Result<(), ConflictError> {
        let Some(original) = self.original_status else {
            return Ok(());
        };
        if !original.is_terminal() {
            return Ok(());
        }
        if original == JobStatus::Failed && self.status == JobStatus::Failed {
            return Ok(());
        }
        Err(ConflictError {
            current: original,
            desired: self.status,
        })
    }

    /// The only status setter. Records the status-keyed message when given
    /// and forces progress to 100 on the two completed statuses.
    pub fn update_status(&mut self, status: JobStatus, message: Option<&str>) {
        self.status = status;
        if let Some(message) = message {
            self.messages.set(status, message);
        }
        if matches!(status, JobStatus::Successful | JobStatus::CompleteWithErrors) {
            self.progress = 100;
        }
    }

    pub fn message(&self) -> &str {
        self.messages
            .get(self.status)
            .unwrap_or_else(|| self.status.default_message())
    }

    pub fn set_message(&mut self, message: impl Into<String>, status: Option<JobStatus>) {
        self.messages.set(status.unwrap_or(self.status), message);
    }

    fn apply(
        &mut self,
        event: JobEvent,
        desired: JobStatus,
        message: Option<&str>,
    ) -> Result<(), ConflictError> {
        fsm::validate_transition(self.status, desired, event)?;
        self.update_status(desired, message);
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), ConflictError> {
        self.apply(JobEvent::Start, JobStatus::Running, None)
    }

    pub fn start_with_preview(&mut self) -> Result<(), ConflictError> {
        self.apply(JobEvent::StartWithPreview, JobStatus::Previewing, None)
    }

    pub fn pause(&mut self) -> Result<(), ConflictError> {
        self.apply(JobEvent::Pause, JobStatus::Paused, None)
    }

    pub fn resume(&mut self) -> Result<(), ConflictError> {
        self.apply(JobEvent::Resume, JobStatus::Running, None)
    }

    pub fn skip_preview(&mut self) -> Result<(), ConflictError> {
        self.apply(JobEvent::SkipPreview, JobStatus::Running, None)
    }

    pub fn fail(&mut self, message: Option<&str>) -> Result<(), ConflictError> {
        self.apply(JobEvent::Fail, JobStatus::Failed, message)
    }

    pub fn cancel(&mut self, message: Option<&str>) -> Result<(), ConflictError> {
        self.apply(JobEvent::Cancel, JobStatus::Canceled, message)
    }

    pub fn succeed(&mut self, message: Option<&str>) -> Result<(), ConflictError> {
        self.apply(JobEvent::Complete, JobStatus::Successful, message)
    }

    pub fn complete_with_errors(&mut self, message: Option<&str>) -> Result<(), ConflictError> {
        self.apply(
            JobEvent::CompleteWithErrors,
            JobStatus::CompleteWithErrors,
            message,
        )
    }

    pub fn has_terminal_status(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_paused(&self) -> bool {
        self.status == JobStatus::Paused
    }

    pub fn belongs_to_or_is_admin(&self, username: &str, is_admin: bool) -> bool {
        is_admin || self.username == username
    }

    /// Shareability without catalog access reduces to "references at least
    /// one collection"; callers holding catalog permissions can refine.
    pub fn is_shareable(&self) -> bool {
        !self.collection_ids.is_empty()
    }

    /// Staged results expire 30 days after creation unless the caller
    /// supplied their own destination.
    pub fn data_expiration_ms(&self) -> Option<i64> {
        if self.destination_url.is_some() {
            return None;
        }
        Some(self.created_at_ms + DATA_EXPIRATION_MS)
    }

    pub fn complete_batch(&mut self) {
        self.batches_completed += 1;
    }

    pub fn add_link(&mut self, link: JobLink) {
        self.links.push(link);
    }

    pub fn add_staging_bucket_link(&mut self, location: impl Into<String>) {
        self.links.push(JobLink::staging_bucket(location));
    }

    /// Outward JSON form. Empty-valued properties are dropped; staged-result
    /// links are rewritten to public permalinks when a URL root is supplied.
    pub fn to_display(&self, url_root: Option<&str>) -> JsonValue {
        let mut out = JsonMap::new();
        out.insert("jobID".to_string(), json!(self.job_id.to_string()));
        out.insert("username".to_string(), json!(self.username));
        out.insert("status".to_string(), json!(self.status.as_str()));
        out.insert("message".to_string(), json!(self.message()));
        out.insert("progress".to_string(), json!(self.progress));
        out.insert(
            "createdAt".to_string(),
            json!(ts_ms_to_rfc3339(self.created_at_ms)),
        );
        out.insert(
            "updatedAt".to_string(),
            json!(ts_ms_to_rfc3339(self.updated_at_ms)),
        );
        if let Some(expiration_ms) = self.data_expiration_ms() {
            out.insert(
                "dataExpiration".to_string(),
                json!(ts_ms_to_rfc3339(expiration_ms)),
            );
        }
        if !self.links.is_empty() {
            let links: Vec<JsonValue> = self
                .links
                .iter()
                .map(|link| self.link_to_display(link, url_root))
                .collect();
            out.insert("links".to_string(), JsonValue::Array(links));
        }
        if !self.labels.is_empty() {
            out.insert("labels".to_string(), json!(self.labels));
        }
        if !self.request.is_empty() {
            out.insert("request".to_string(), json!(self.request));
        }
        out.insert(
            "numInputGranules".to_string(),
            json!(self.num_input_granules),
        );
        JsonValue::Object(out)
    }

    fn link_to_display(&self, link: &JobLink, url_root: Option<&str>) -> JsonValue {
        let mut href = link.href.clone();
        if let Some(root) = url_root {
            let rewrite = !link.is_staging_bucket() && self.destination_url.is_none();
            if rewrite {
                if let Some(rest) = href.strip_prefix("s3://") {
                    href = format!("{}/service-results/{rest}", root.trim_end_matches('/'));
                }
            }
        }

        let mut out = JsonMap::new();
        out.insert("href".to_string(), json!(href));
        if let Some(title) = link.title.as_deref().filter(|t| !t.is_empty()) {
            out.insert("title".to_string(), json!(title));
        }
        if let Some(link_type) = link.link_type.as_deref().filter(|t| !t.is_empty()) {
            out.insert("type".to_string(), json!(link_type));
        }
        if let Some(rel) = link.rel.as_deref().filter(|r| !r.is_empty()) {
            out.insert("rel".to_string(), json!(rel));
        }
        if let Some(bbox) = link.bbox {
            out.insert("bbox".to_string(), json!(bbox));
        }
        if link.temporal_start_ms.is_some() || link.temporal_end_ms.is_some() {
            let mut temporal = JsonMap::new();
            if let Some(start) = link.temporal_start_ms {
                temporal.insert("start".to_string(), json!(ts_ms_to_rfc3339(start)));
            }
            if let Some(end) = link.temporal_end_ms {
                temporal.insert("end".to_string(), json!(ts_ms_to_rfc3339(end)));
            }
            out.insert("temporal".to_string(), JsonValue::Object(temporal));
        }
        JsonValue::Object(out)
    }
}
