//! Job identifiers and type tags.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Length of the random suffix appended to generated job ids.
const SUFFIX_LEN: usize = 9;

/// Identifier of a job.
///
/// Generated ids look like `job-<unix millis>-<9 alphanumerics>`. Other
/// producers writing to the same durable queue may use their own scheme, so
/// the id is kept as an opaque string once it exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a new identifier from the current time and a random suffix.
    pub fn new() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let random = Uuid::new_v4().simple().to_string();
        Self(format!("job-{millis}-{}", &random[..SUFFIX_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("JobId: empty"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Tag selecting the handler for a job.
///
/// The set is open: any non-empty tag may be enqueued, and tags without a
/// registered handler are rejected at dispatch time rather than here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobType(String);

impl JobType {
    /// Deliver a notification to a user.
    pub const SEND_NOTIFICATION: &'static str = "send_notification";
    /// Record a donation intent (no settlement).
    pub const PROCESS_DONATION: &'static str = "process_donation";

    /// Build a tag, rejecting empty strings.
    pub fn new(tag: impl Into<String>) -> Result<Self, DomainError> {
        let tag = tag.into();
        if tag.trim().is_empty() {
            return Err(DomainError::validation("job type must not be empty"));
        }
        Ok(Self(tag))
    }

    pub fn send_notification() -> Self {
        Self(Self::SEND_NOTIFICATION.to_string())
    }

    pub fn process_donation() -> Self {
        Self(Self::PROCESS_DONATION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for JobType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<JobType> for String {
    fn from(value: JobType) -> Self {
        value.0
    }
}
