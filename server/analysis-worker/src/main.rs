//! Binary entrypoint: validate configuration, gate on dependencies, consume.

use std::sync::Arc;

use anyhow::Context;
use log_analyzer::{AnalysisConfig, Analyzer};
use tracing::{error, info};

use analysis_worker::blob::S3BlobStore;
use analysis_worker::queue::AmqpChannel;
use analysis_worker::store::PgJobStore;
use analysis_worker::{
  config, health, logging, Consumer, ConsumerSettings, JobExecutor, RetryPolicies, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  logging::init(config::production_from_env());

  let config = match WorkerConfig::from_env() {
    Ok(c) => c,
    Err(e) => {
      error!(error = %e, "invalid configuration");
      return Err(e.into());
    }
  };
  let retry = RetryPolicies::default();

  let pool_size = u32::try_from(config.concurrency + 1).unwrap_or(u32::MAX);
  let store = Arc::new(PgJobStore::connect_lazy(&config.database_url, pool_size)?);
  let blobs = Arc::new(S3BlobStore::new(
    config.s3.clone(),
    config.production,
    config.default_bucket.clone(),
  ));
  health::wait_for_dependencies(store.as_ref(), blobs.as_ref(), &retry.startup)
    .await
    .context("dependencies unavailable")?;

  info!("connecting to message broker");
  let channel = retry
    .startup
    .run("connect_broker", || {
      AmqpChannel::connect(
        &config.rabbitmq_url,
        &config.jobs_queue,
        &config.results_queue,
        config.prefetch(),
      )
    })
    .await
    .context("message broker unavailable")?;

  let analyzer = Analyzer::new(AnalysisConfig::default())?;
  let executor = Arc::new(JobExecutor::new(store, blobs, analyzer, retry));
  let consumer = Consumer::new(
    channel,
    executor,
    ConsumerSettings {
      depth: config.concurrency,
      results_queue: config.results_queue.clone(),
      default_bucket: config.default_bucket.clone(),
      publish_retry: retry.main,
    },
  );

  tokio::select! {
    result = consumer.run() => {
      let summary = result.context("consumer stopped")?;
      info!(?summary, "consumer finished");
    }
    _ = tokio::signal::ctrl_c() => {
      info!("interrupted");
    }
  }
  Ok(())
}
