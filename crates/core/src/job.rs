//! Job record and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::{JobId, JobType};

/// Lifecycle status of a job.
///
/// Only `Queued` is ever stored. The other states are observed by the
/// orchestrator while it handles a dequeued job and are reported through
/// logs; they are never written back to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of deferred work.
///
/// Immutable once created. The wire form is a JSON object with the keys
/// `id`, `type`, `payload`, `status`, `createdAt` and `attempt`; `attempt`
/// may be absent and then reads as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    id: JobId,
    #[serde(rename = "type")]
    job_type: JobType,
    payload: JsonValue,
    status: JobStatus,
    created_at: DateTime<Utc>,
    #[serde(default)]
    attempt: u32,
}

impl Job {
    /// Create a new queued job with a fresh id.
    pub fn new(job_type: JobType, payload: JsonValue) -> Self {
        Self {
            id: JobId::new(),
            job_type,
            payload,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            attempt: 0,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn job_type(&self) -> &JobType {
        &self.job_type
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of times this job was re-enqueued after a failed attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The value to re-enqueue for another attempt.
    ///
    /// Identity, type, payload and creation time carry over; the attempt
    /// counter goes up by one.
    pub fn next_attempt(&self) -> Self {
        Self {
            id: self.id.clone(),
            job_type: self.job_type.clone(),
            payload: self.payload.clone(),
            status: JobStatus::Queued,
            created_at: self.created_at,
            attempt: self.attempt.saturating_add(1),
        }
    }

    /// Encode to the JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from the JSON wire form.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_jobs_are_queued_first_attempts() {
        let job = Job::new(JobType::send_notification(), json!({"message": "hi"}));

        assert_eq!(job.status(), JobStatus::Queued);
        assert_eq!(job.attempt(), 0);
        assert_eq!(job.job_type().as_str(), "send_notification");
        assert_eq!(job.payload()["message"], "hi");
    }

    #[test]
    fn wire_form_uses_camel_case_and_type_key() {
        let job = Job::new(JobType::process_donation(), json!({"amount": 10}));
        let value: JsonValue = serde_json::from_str(&job.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "process_donation");
        assert_eq!(value["status"], "queued");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("job_type").is_none());
    }

    #[test]
    fn decodes_records_written_without_attempt() {
        let raw = r#"{
            "id": "job-1700000000000-abc123xyz",
            "type": "send_notification",
            "payload": {"message": "hi"},
            "status": "queued",
            "createdAt": "2024-01-01T12:00:00.000Z"
        }"#;

        let job = Job::from_json(raw).unwrap();
        assert_eq!(job.id().as_str(), "job-1700000000000-abc123xyz");
        assert_eq!(job.attempt(), 0);
        assert_eq!(job.status(), JobStatus::Queued);
    }

    #[test]
    fn next_attempt_keeps_identity() {
        let job = Job::new(JobType::send_notification(), json!({"message": "hi"}));
        let retry = job.next_attempt();

        assert_eq!(retry.id(), job.id());
        assert_eq!(retry.created_at(), job.created_at());
        assert_eq!(retry.payload(), job.payload());
        assert_eq!(retry.attempt(), 1);
        assert_eq!(job.attempt(), 0);
    }

    #[test]
    fn status_display_matches_wire_form() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Done,
            JobStatus::Failed,
        ] {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, status.to_string());
        }
    }
}
