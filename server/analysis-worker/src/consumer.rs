//! The connection-owning consumer loop.
//!
//! A single task owns the [`QueueChannel`]. Jobs run as spawned tasks gated
//! by a semaphore and report back over a bounded mpsc channel; every ack,
//! requeue and notification happens here, on the owning task.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::QueueError;
use crate::executor::{JobExecutor, JobOutcome};
use crate::job::{JobDescriptor, JobState, JobStatus, ResultNotification};
use crate::queue::{Delivery, QueueChannel};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
  /// Maximum number of jobs analysed at once.
  pub depth: usize,
  pub results_queue: String,
  pub default_bucket: String,
  pub publish_retry: RetryPolicy,
}

/// What to do with the delivery once the job is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
  /// Terminal status recorded: notify, then ack.
  Ack,
  /// The terminal status is not durable; let the broker redeliver once.
  Requeue,
  /// Not durable on redelivery either: ack without notifying.
  Abandon,
}

/// Hand-off from a job task to the consumer.
#[derive(Debug, Clone)]
pub struct Completion {
  pub delivery_tag: u64,
  pub redelivered: bool,
  pub job_id: String,
  pub correlation_id: Option<String>,
  pub outcome: JobOutcome,
}

impl Completion {
  pub fn disposition(&self) -> Disposition {
    match (self.outcome.recorded, self.redelivered) {
      (true, _) => Disposition::Ack,
      (false, false) => Disposition::Requeue,
      (false, true) => Disposition::Abandon,
    }
  }
}

/// Counters returned when the consumer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerSummary {
  pub completed: usize,
  pub failed: usize,
  pub dropped: usize,
  pub requeued: usize,
  pub abandoned: usize,
}

enum Event {
  Delivered(Option<Delivery>),
  Finished(Completion),
}

pub struct Consumer<Q> {
  channel: Q,
  executor: Arc<JobExecutor>,
  settings: ConsumerSettings,
  permits: Arc<Semaphore>,
  summary: ConsumerSummary,
}

impl<Q: QueueChannel> Consumer<Q> {
  pub fn new(channel: Q, executor: Arc<JobExecutor>, settings: ConsumerSettings) -> Self {
    let permits = Arc::new(Semaphore::new(settings.depth.max(1)));
    Self {
      channel,
      executor,
      settings,
      permits,
      summary: ConsumerSummary::default(),
    }
  }

  /// Consume until the delivery stream ends, then wait for in-flight jobs.
  ///
  /// Errors are broker failures on the owning channel; job failures never
  /// surface here.
  pub async fn run(mut self) -> Result<ConsumerSummary, QueueError> {
    let (tx, mut rx) = mpsc::channel::<Completion>(self.settings.depth.max(1));
    let mut in_flight = 0usize;

    info!(depth = self.settings.depth, "waiting for messages");
    loop {
      let event = tokio::select! {
        biased;
        Some(done) = rx.recv(), if in_flight > 0 => Event::Finished(done),
        delivery = self.channel.next_delivery() => Event::Delivered(delivery?),
      };

      match event {
        Event::Finished(done) => {
          in_flight -= 1;
          self.finish(done).await?;
        }
        Event::Delivered(Some(delivery)) => {
          if self.dispatch(delivery, &tx).await? {
            in_flight += 1;
          }
        }
        Event::Delivered(None) => break,
      }
    }

    info!(in_flight, "delivery stream ended, draining");
    drop(tx);
    while in_flight > 0 {
      match rx.recv().await {
        Some(done) => {
          in_flight -= 1;
          self.finish(done).await?;
        }
        None => break,
      }
    }
    Ok(self.summary)
  }

  /// Returns whether a job task was started for the delivery.
  async fn dispatch(
    &mut self,
    delivery: Delivery,
    tx: &mpsc::Sender<Completion>,
  ) -> Result<bool, QueueError> {
    let job = match JobDescriptor::parse(&delivery.body, &self.settings.default_bucket) {
      Ok(job) => job,
      Err(e) => {
        warn!(delivery_tag = delivery.tag, error = %e, "rejected job descriptor");
        self.channel.ack(delivery.tag).await?;
        self.summary.dropped += 1;
        return Ok(false);
      }
    };

    let span = info_span!(
      "job",
      job_id = %job.job_id,
      correlation_id = job.correlation_id.as_deref().unwrap_or("-")
    );
    span.in_scope(|| info!(state = %JobState::Received, file_key = %job.file_key, "job received"));

    let executor = self.executor.clone();
    let permits = self.permits.clone();
    let tx = tx.clone();
    let tag = delivery.tag;
    let redelivered = delivery.redelivered;
    tokio::spawn(
      async move {
        let outcome = match permits.acquire_owned().await {
          Ok(_permit) => executor.execute(&job).await,
          Err(_) => JobOutcome {
            status: JobStatus::Failed,
            incident_count: 0,
            recorded: false,
          },
        };
        let completion = Completion {
          delivery_tag: tag,
          redelivered,
          job_id: job.job_id,
          correlation_id: job.correlation_id,
          outcome,
        };
        if tx.send(completion).await.is_err() {
          error!("consumer is gone, completion dropped");
        }
      }
      .instrument(span),
    );
    Ok(true)
  }

  async fn finish(&mut self, done: Completion) -> Result<(), QueueError> {
    let span = info_span!(
      "job",
      job_id = %done.job_id,
      correlation_id = done.correlation_id.as_deref().unwrap_or("-")
    );
    self.settle(done).instrument(span).await
  }

  async fn settle(&mut self, done: Completion) -> Result<(), QueueError> {
    let status = done.outcome.status;
    match done.disposition() {
      Disposition::Ack => {
        self.notify(&done).await;
        self.channel.ack(done.delivery_tag).await?;
        info!(from = %JobState::from(status), state = %JobState::Acknowledged, "job acknowledged");
        match status {
          JobStatus::Completed => self.summary.completed += 1,
          JobStatus::Failed => self.summary.failed += 1,
        }
      }
      Disposition::Requeue => {
        warn!(%status, "terminal status not recorded, requeueing");
        self.channel.requeue(done.delivery_tag).await?;
        self.summary.requeued += 1;
      }
      Disposition::Abandon => {
        error!(%status, "terminal status not recorded on redelivery, abandoning job");
        self.channel.ack(done.delivery_tag).await?;
        self.summary.abandoned += 1;
      }
    }
    Ok(())
  }

  async fn notify(&mut self, done: &Completion) {
    let status = done.outcome.status;
    let notification = ResultNotification::new(
      &self.settings.results_queue,
      &done.job_id,
      status,
      done.outcome.incident_count,
      done.correlation_id.clone(),
    );
    let payload = match notification.to_bytes() {
      Ok(payload) => payload,
      Err(e) => {
        error!(error = %e, "failed to encode result notification");
        return;
      }
    };
    match self.publish(&payload).await {
      Ok(()) => info!(%status, "result notification sent"),
      Err(e) => error!(error = %e, "failed to send result notification"),
    }
  }

  async fn publish(&mut self, payload: &[u8]) -> Result<(), QueueError> {
    let mut attempts = self.settings.publish_retry.attempts("publish_notification");
    loop {
      match self.channel.publish(&self.settings.results_queue, payload).await {
        Ok(()) => return Ok(()),
        Err(e) => match attempts.failed(&e) {
          Some(delay) => tokio::time::sleep(delay).await,
          None => return Err(e),
        },
      }
    }
  }
}
