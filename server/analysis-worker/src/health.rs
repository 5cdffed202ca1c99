//! Startup gate: the worker does not consume until its dependencies answer.

use tracing::info;

use crate::blob::BlobStore;
use crate::error::WorkerError;
use crate::retry::RetryPolicy;
use crate::store::JobStore;

/// Ping the relational store, then the blob store. Exhausting `policy` on
/// either is fatal for the caller.
pub async fn wait_for_dependencies(
  store: &dyn JobStore,
  blobs: &dyn BlobStore,
  policy: &RetryPolicy,
) -> Result<(), WorkerError> {
  info!("waiting for dependencies");

  info!("pinging PostgreSQL");
  policy.run("ping_database", || store.ping()).await?;

  info!("pinging object storage");
  policy.run("ping_object_storage", || blobs.ping()).await?;

  info!("all dependencies are up");
  Ok(())
}
