//! Relational persistence of job outcomes (PostgreSQL via sqlx).

use std::time::Duration;

use async_trait::async_trait;
use log_analyzer::Incident;
use sqlx_core::query::query;
use sqlx_postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::JobStatus;

/// Durable record of a job's terminal status.
#[async_trait]
pub trait JobStore: Send + Sync {
  async fn ping(&self) -> Result<(), StoreError>;

  /// Status, incident count and incident rows, atomically.
  async fn record_completed(&self, job_id: &str, incidents: &[Incident]) -> Result<(), StoreError>;

  /// Status only; no incident rows are written for a failed job.
  async fn record_failed(&self, job_id: &str, reason: &str) -> Result<(), StoreError>;
}

pub struct PgJobStore {
  pool: PgPool,
}

impl PgJobStore {
  /// The pool connects on first use, so the startup gate decides availability.
  pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
    let pool = PgPoolOptions::new()
      .max_connections(max_connections)
      .acquire_timeout(Duration::from_secs(10))
      .connect_lazy(database_url)?;
    Ok(Self { pool })
  }
}

/// The status is written as a literal so it coerces to the column's enum type.
fn update_status_sql(status: JobStatus) -> String {
  format!(
    r#"UPDATE "AnalysisJob" SET status = '{}', "incidentCount" = $1 WHERE id = $2"#,
    status.as_str()
  )
}

/// Counts are stored in `int4` columns.
fn int4<T>(field: &str, value: T) -> Result<i32, StoreError>
where
  T: TryInto<i32> + Copy + std::fmt::Display,
{
  value
    .try_into()
    .map_err(|_| StoreError::Other(format!("{} {} does not fit in int4", field, value)))
}

const INSERT_INCIDENTS_SQL: &str = r#"
  INSERT INTO "Incident" (id, "jobId", "incidentTemplate", occurrences, "avgScore", severity, "exampleLog")
  SELECT t.id, $1, t.template, t.occurrences, t.avg_score, t.severity, t.example_log
  FROM UNNEST($2::text[], $3::text[], $4::int4[], $5::float8[], $6::float8[], $7::text[])
    AS t(id, template, occurrences, avg_score, severity, example_log)
"#;

#[async_trait]
impl JobStore for PgJobStore {
  async fn ping(&self) -> Result<(), StoreError> {
    query("SELECT 1").execute(&self.pool).await?;
    Ok(())
  }

  async fn record_completed(&self, job_id: &str, incidents: &[Incident]) -> Result<(), StoreError> {
    let count = int4("incident count", incidents.len())?;
    let mut tx = self.pool.begin().await?;

    let updated = query(&update_status_sql(JobStatus::Completed))
      .bind(count)
      .bind(job_id)
      .execute(&mut *tx)
      .await?;
    if updated.rows_affected() == 0 {
      warn!(job_id, "no AnalysisJob row matched");
    }

    if !incidents.is_empty() {
      let ids: Vec<String> = incidents.iter().map(|_| Uuid::new_v4().to_string()).collect();
      let templates: Vec<String> = incidents.iter().map(|i| i.incident_template.clone()).collect();
      let occurrences = incidents
        .iter()
        .map(|i| int4("occurrences", i.occurrences))
        .collect::<Result<Vec<i32>, _>>()?;
      let avg_scores: Vec<f64> = incidents.iter().map(|i| i.avg_score).collect();
      let severities: Vec<f64> = incidents.iter().map(|i| i.severity).collect();
      let examples: Vec<String> = incidents.iter().map(|i| i.example_log.clone()).collect();

      query(INSERT_INCIDENTS_SQL)
        .bind(job_id)
        .bind(ids)
        .bind(templates)
        .bind(occurrences)
        .bind(avg_scores)
        .bind(severities)
        .bind(examples)
        .execute(&mut *tx)
        .await?;
      info!(job_id, incident_count = incidents.len(), "bulk saved incidents");
    }

    tx.commit().await?;
    info!(job_id, status = %JobStatus::Completed, "job status updated");
    Ok(())
  }

  async fn record_failed(&self, job_id: &str, reason: &str) -> Result<(), StoreError> {
    query(&update_status_sql(JobStatus::Failed))
      .bind(0i32)
      .bind(job_id)
      .execute(&self.pool)
      .await?;
    info!(job_id, status = %JobStatus::Failed, reason, "job status updated");
    Ok(())
  }
}
