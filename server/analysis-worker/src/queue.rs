//! Message queue seam and its AMQP 0-9-1 implementation (lapin).

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
  BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
  QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::info;

use crate::error::QueueError;

const CONSUMER_TAG: &str = "analysis-worker";

/// One message taken off the jobs queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
  pub tag: u64,
  pub body: Vec<u8>,
  /// The broker has handed this message out before.
  pub redelivered: bool,
}

/// Exclusive handle on the broker channel. Methods take `&mut self`: only the
/// task that owns the value can consume, acknowledge or publish.
#[async_trait]
pub trait QueueChannel: Send {
  /// Next delivery, or `None` once the subscription has ended.
  /// Must be cancel-safe: a dropped call loses no message.
  async fn next_delivery(&mut self) -> Result<Option<Delivery>, QueueError>;

  async fn ack(&mut self, tag: u64) -> Result<(), QueueError>;

  /// Reject and put the message back for redelivery.
  async fn requeue(&mut self, tag: u64) -> Result<(), QueueError>;

  /// Publish through the default exchange, routed by queue name.
  async fn publish(&mut self, queue: &str, payload: &[u8]) -> Result<(), QueueError>;
}

pub struct AmqpChannel {
  _connection: Connection,
  channel: Channel,
  consumer: lapin::Consumer,
}

impl AmqpChannel {
  /// Connect, declare both durable queues, apply prefetch and start consuming.
  pub async fn connect(
    url: &str,
    jobs_queue: &str,
    results_queue: &str,
    prefetch: u16,
  ) -> Result<Self, QueueError> {
    let connection = Connection::connect(url, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;

    let durable = QueueDeclareOptions {
      durable: true,
      ..QueueDeclareOptions::default()
    };
    channel
      .queue_declare(jobs_queue, durable, FieldTable::default())
      .await?;
    channel
      .queue_declare(results_queue, durable, FieldTable::default())
      .await?;
    channel
      .basic_qos(prefetch, BasicQosOptions::default())
      .await?;

    let consumer = channel
      .basic_consume(
        jobs_queue,
        CONSUMER_TAG,
        BasicConsumeOptions::default(),
        FieldTable::default(),
      )
      .await?;
    info!(jobs_queue, results_queue, prefetch, "connected to message broker");

    Ok(Self {
      _connection: connection,
      channel,
      consumer,
    })
  }
}

#[async_trait]
impl QueueChannel for AmqpChannel {
  async fn next_delivery(&mut self) -> Result<Option<Delivery>, QueueError> {
    match self.consumer.next().await {
      Some(Ok(delivery)) => Ok(Some(Delivery {
        tag: delivery.delivery_tag,
        redelivered: delivery.redelivered,
        body: delivery.data,
      })),
      Some(Err(e)) => Err(e.into()),
      None => Ok(None),
    }
  }

  async fn ack(&mut self, tag: u64) -> Result<(), QueueError> {
    self.channel.basic_ack(tag, BasicAckOptions::default()).await?;
    Ok(())
  }

  async fn requeue(&mut self, tag: u64) -> Result<(), QueueError> {
    let options = BasicNackOptions {
      requeue: true,
      ..BasicNackOptions::default()
    };
    self.channel.basic_nack(tag, options).await?;
    Ok(())
  }

  async fn publish(&mut self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
    let properties = BasicProperties::default()
      .with_content_type("application/json".into())
      .with_delivery_mode(2);
    self
      .channel
      .basic_publish("", queue, BasicPublishOptions::default(), payload, properties)
      .await?
      .await?;
    Ok(())
  }
}
