//! Job descriptors, terminal statuses and result notifications.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A validated unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
  pub job_id: String,
  pub file_key: String,
  pub bucket: String,
  pub correlation_id: Option<String>,
}

/// Why a delivery was dropped without entering the job state machine.
#[derive(Debug, Error)]
pub enum DescriptorError {
  #[error("malformed job descriptor: {0}")]
  Json(#[from] serde_json::Error),

  #[error("job descriptor is missing {0}")]
  MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDescriptor {
  job_id: Option<String>,
  file_key: Option<String>,
  bucket: Option<String>,
  correlation_id: Option<String>,
}

/// Producers either send the bare descriptor or wrap it as `{pattern, data}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
  Wrapped { data: RawDescriptor },
  Bare(RawDescriptor),
}

impl JobDescriptor {
  pub fn parse(body: &[u8], default_bucket: &str) -> Result<Self, DescriptorError> {
    let raw = match serde_json::from_slice::<Envelope>(body)? {
      Envelope::Wrapped { data } => data,
      Envelope::Bare(raw) => raw,
    };
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let job_id = present(raw.job_id).ok_or(DescriptorError::MissingField("jobId"))?;
    let file_key = present(raw.file_key).ok_or(DescriptorError::MissingField("fileKey"))?;
    Ok(Self {
      job_id,
      file_key,
      bucket: present(raw.bucket).unwrap_or_else(|| default_bucket.to_string()),
      correlation_id: present(raw.correlation_id),
    })
  }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
  Completed,
  Failed,
}

impl JobStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      JobStatus::Completed => "COMPLETED",
      JobStatus::Failed => "FAILED",
    }
  }
}

impl std::fmt::Display for JobStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Lifecycle of one delivery: `Received -> Running -> {Completed | Failed} -> Acknowledged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
  Received,
  Running,
  Completed,
  Failed,
  Acknowledged,
}

impl JobState {
  pub fn as_str(&self) -> &'static str {
    match self {
      JobState::Received => "RECEIVED",
      JobState::Running => "RUNNING",
      JobState::Completed => "COMPLETED",
      JobState::Failed => "FAILED",
      JobState::Acknowledged => "ACKNOWLEDGED",
    }
  }
}

impl From<JobStatus> for JobState {
  fn from(status: JobStatus) -> Self {
    match status {
      JobStatus::Completed => JobState::Completed,
      JobStatus::Failed => JobState::Failed,
    }
  }
}

impl std::fmt::Display for JobState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
  pub job_id: String,
  pub status: JobStatus,
  pub incident_count: usize,
  pub correlation_id: Option<String>,
}

/// Message published to the results queue; `pattern` is the queue name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultNotification {
  pub pattern: String,
  pub data: NotificationData,
}

impl ResultNotification {
  pub fn new(
    results_queue: &str,
    job_id: &str,
    status: JobStatus,
    incident_count: usize,
    correlation_id: Option<String>,
  ) -> Self {
    Self {
      pattern: results_queue.to_string(),
      data: NotificationData {
        job_id: job_id.to_string(),
        status,
        incident_count,
        correlation_id,
      },
    }
  }

  pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bare_descriptor_parses_with_default_bucket() {
    let job = JobDescriptor::parse(br#"{"jobId":"j1","fileKey":"logs/a.log"}"#, "sentinel-logs").unwrap();
    assert_eq!(job.job_id, "j1");
    assert_eq!(job.file_key, "logs/a.log");
    assert_eq!(job.bucket, "sentinel-logs");
    assert!(job.correlation_id.is_none());
  }

  #[test]
  fn wrapped_descriptor_parses() {
    let body = br#"{"pattern":"analysis_jobs","data":{"jobId":"j2","fileKey":"k","bucket":"other","correlationId":"c-9"}}"#;
    let job = JobDescriptor::parse(body, "sentinel-logs").unwrap();
    assert_eq!(job.job_id, "j2");
    assert_eq!(job.bucket, "other");
    assert_eq!(job.correlation_id.as_deref(), Some("c-9"));
  }

  #[test]
  fn missing_fields_rejected() {
    let err = JobDescriptor::parse(br#"{"fileKey":"k"}"#, "b").unwrap_err();
    assert!(matches!(err, DescriptorError::MissingField("jobId")));

    let err = JobDescriptor::parse(br#"{"data":{"jobId":"j"}}"#, "b").unwrap_err();
    assert!(matches!(err, DescriptorError::MissingField("fileKey")));

    let err = JobDescriptor::parse(br#"{"jobId":"","fileKey":"k"}"#, "b").unwrap_err();
    assert!(matches!(err, DescriptorError::MissingField("jobId")));
  }

  #[test]
  fn invalid_json_rejected() {
    assert!(matches!(
      JobDescriptor::parse(b"not json", "b"),
      Err(DescriptorError::Json(_))
    ));
    assert!(JobDescriptor::parse(b"[1,2]", "b").is_err());
  }

  #[test]
  fn terminal_status_maps_to_lifecycle_state() {
    assert_eq!(JobState::from(JobStatus::Failed), JobState::Failed);
    assert_eq!(JobState::from(JobStatus::Completed).to_string(), "COMPLETED");
  }

  #[test]
  fn notification_wire_shape() {
    let n = ResultNotification::new("analysis_results", "j1", JobStatus::Completed, 3, None);
    let v: serde_json::Value = serde_json::from_slice(&n.to_bytes().unwrap()).unwrap();
    assert_eq!(
      v,
      serde_json::json!({
        "pattern": "analysis_results",
        "data": {"jobId": "j1", "status": "COMPLETED", "incidentCount": 3, "correlationId": null}
      })
    );
  }
}
