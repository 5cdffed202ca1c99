//! Per-job pipeline: fetch, analyse, persist, delete.
//!
//! Every error inside a job is caught here and converted into a FAILED
//! outcome; nothing propagates to the consumer except the outcome itself.

use std::sync::Arc;

use log_analyzer::{AnalysisReport, Analyzer, TimestampExtractor};
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::blob::{BlobStore, ByteStream};
use crate::error::WorkerError;
use crate::job::{JobDescriptor, JobState, JobStatus};
use crate::lines::BlockingLines;
use crate::retry::RetryPolicies;
use crate::store::JobStore;

/// Terminal result of one job as seen by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
  pub status: JobStatus,
  pub incident_count: usize,
  /// The terminal status reached the relational store.
  pub recorded: bool,
}

pub struct JobExecutor {
  store: Arc<dyn JobStore>,
  blobs: Arc<dyn BlobStore>,
  analyzer: Analyzer,
  retry: RetryPolicies,
}

impl JobExecutor {
  pub fn new(
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    analyzer: Analyzer,
    retry: RetryPolicies,
  ) -> Self {
    Self {
      store,
      blobs,
      analyzer,
      retry,
    }
  }

  pub async fn execute(&self, job: &JobDescriptor) -> JobOutcome {
    info!(state = %JobState::Running, "job started");
    match self.complete(job).await {
      Ok(incident_count) => JobOutcome {
        status: JobStatus::Completed,
        incident_count,
        recorded: true,
      },
      Err(e) => {
        error!(error = %e, "error in analysis task");
        self.fail(job, &e).await
      }
    }
  }

  async fn complete(&self, job: &JobDescriptor) -> Result<usize, WorkerError> {
    info!(bucket = %job.bucket, file_key = %job.file_key, "fetching log file");
    let stream = self
      .retry
      .main
      .run("fetch", || self.blobs.open(&job.bucket, &job.file_key))
      .await?;

    info!("starting analysis stream");
    let report = self.analyze(stream).await?;
    info!(
      lines = report.lines,
      templates = report.templates,
      flagged = report.flagged,
      incident_count = report.incidents.len(),
      "analysis finished"
    );

    self
      .retry
      .main
      .run("persist", || self.store.record_completed(&job.job_id, &report.incidents))
      .await?;

    self
      .retry
      .main
      .run("delete", || self.blobs.delete(&job.bucket, &job.file_key))
      .await?;
    info!(file_key = %job.file_key, "deleted log file");

    Ok(report.incidents.len())
  }

  /// CPU-bound work runs on the blocking pool; blob reads are driven from there.
  async fn analyze(&self, stream: ByteStream) -> Result<AnalysisReport, WorkerError> {
    // Partial timestamps resolve against the date the job runs.
    let analyzer = self.analyzer.clone().with_extractor(TimestampExtractor::new());
    let handle = Handle::current();

    let joined = tokio::task::spawn_blocking(move || {
      let mut lines = BlockingLines::new(handle, stream);
      let report = analyzer.analyze_report(&mut lines);
      match lines.take_error() {
        Some(e) => Err(WorkerError::from(e)),
        None => Ok(report),
      }
    })
    .await;

    match joined {
      Ok(result) => result,
      Err(e) => Err(WorkerError::Aborted(e.to_string())),
    }
  }

  async fn fail(&self, job: &JobDescriptor, cause: &WorkerError) -> JobOutcome {
    let reason = cause.to_string();
    let recorded = self
      .retry
      .failure
      .run("record_failed", || self.store.record_failed(&job.job_id, &reason))
      .await;
    if let Err(e) = &recorded {
      warn!(error = %e, "FAILED status could not be recorded");
    }
    JobOutcome {
      status: JobStatus::Failed,
      incident_count: 0,
      recorded: recorded.is_ok(),
    }
  }
}
