#![forbid(unsafe_code)]

use uuid::Uuid;

/// Identifier of one job, stable for the life of the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn try_new(value: &str) -> Result<Self, JobIdError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(JobIdError::Empty);
        }
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|_| JobIdError::NotAUuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobIdError {
    Empty,
    NotAUuid,
}

impl std::fmt::Display for JobIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "job id must not be empty"),
            Self::NotAUuid => write!(f, "job id must be a UUID"),
        }
    }
}

impl std::error::Error for JobIdError {}

/// Opaque service identifier (conventionally a container image tag).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceId(String);

const MAX_SERVICE_ID_LEN: usize = 256;

impl ServiceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, ServiceIdError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ServiceIdError::Empty);
        }
        if trimmed.len() > MAX_SERVICE_ID_LEN {
            return Err(ServiceIdError::TooLong);
        }
        if trimmed.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(ServiceIdError::InvalidChar);
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceIdError {
    Empty,
    TooLong,
    InvalidChar,
}

impl std::fmt::Display for ServiceIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "service id must not be empty"),
            Self::TooLong => write!(f, "service id is too long"),
            Self::InvalidChar => {
                write!(f, "service id must not contain whitespace or control chars")
            }
        }
    }
}

impl std::error::Error for ServiceIdError {}
