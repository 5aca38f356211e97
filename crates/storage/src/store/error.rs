#![forbid(unsafe_code)]

use sy_core::fsm::ConflictError;
use sy_core::job::MessageDecodeError;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    Validation(Vec<String>),
    Conflict(ConflictError),
    CorruptRow(&'static str),
    UnknownJob { job_id: String },
    UnknownWorkItem { id: i64 },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Validation(problems) => {
                write!(f, "job failed validation: {}", problems.join("; "))
            }
            Self::Conflict(err) => write!(f, "conflict: {err}"),
            Self::CorruptRow(message) => write!(f, "corrupt row: {message}"),
            Self::UnknownJob { job_id } => write!(f, "unknown job: {job_id}"),
            Self::UnknownWorkItem { id } => write!(f, "unknown work item: {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<ConflictError> for StoreError {
    fn from(value: ConflictError) -> Self {
        Self::Conflict(value)
    }
}

impl From<MessageDecodeError> for StoreError {
    fn from(_: MessageDecodeError) -> Self {
        Self::CorruptRow("stored message map has an unknown status key")
    }
}
