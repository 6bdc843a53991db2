//! The worker-role broker client (C2): consumes a single kind's queue and publishes
//! lifecycle events back to the relay.

use lapin::options::{BasicConsumeOptions, BasicQosOptions, ConfirmSelectOptions, QueueBindOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tracing::{debug, info};

use crate::broker::{assignment_routing_key, completed_routing_key, running_routing_key};
use crate::config::BrokerConfig;
use crate::error::{Error, Result};
use crate::model::{TaskCompleted, TaskRunning};

/// Consumes assignments for a single worker kind and publishes lifecycle events.
pub struct WorkerBrokerClient {
    config: BrokerConfig,
    connection: Option<Connection>,
    channel: Option<Channel>,
    consumer: Option<Consumer>,
}

impl WorkerBrokerClient {
    /// Builds a client that will connect using `config` once [`connect`] is called.
    ///
    /// [`connect`]: Self::connect
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            connection: None,
            channel: None,
            consumer: None,
        }
    }

    /// Connects to the broker, declares shared and per-kind topology, enables
    /// publisher confirms if configured to (so the lifecycle events this client
    /// publishes are actually broker-acknowledged rather than fire-and-forget),
    /// sets the channel's prefetch, and opens a consumer on `worker_kind`'s queue.
    pub async fn connect(&mut self, worker_kind: &str, prefetch: u16) -> Result<()> {
        debug!(
            "Connecting worker ({worker_kind:?}) to broker at {:?}...",
            self.config.url
        );
        let connection =
            Connection::connect(&self.config.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        super::declare_shared_topology(&channel).await?;

        if self.config.publisher_confirms {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await?;
        }

        super::declare_priority_queue(&channel, worker_kind).await?;
        channel
            .queue_bind(
                worker_kind,
                super::wire::TASK_EXCHANGE,
                &assignment_routing_key(worker_kind),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| Error::BrokerConfig {
                what: worker_kind.to_string(),
                source,
            })?;

        channel
            .basic_qos(prefetch, BasicQosOptions { global: false })
            .await?;

        let consumer = channel
            .basic_consume(
                worker_kind,
                worker_kind,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!("Worker connected, consuming queue {worker_kind:?} with prefetch {prefetch}.");
        self.connection = Some(connection);
        self.channel = Some(channel);
        self.consumer = Some(consumer);
        Ok(())
    }

    /// Returns the delivery stream. The caller must ack or nack every item it
    /// receives; deliveries are not auto-acked.
    pub fn deliveries(&mut self) -> Result<&mut Consumer> {
        self.consumer.as_mut().ok_or(Error::NotConnected)
    }

    /// Returns a cheap, clonable handle to this worker's channel, for publishing
    /// lifecycle events from a spawned task execution unit.
    pub fn channel_handle(&self) -> Result<Channel> {
        self.channel().cloned()
    }

    /// Publishes a `TaskRunning` event over this worker's own channel.
    pub async fn publish_running(&self, running: &TaskRunning) -> Result<()> {
        let body = serde_json::to_vec(running).map_err(crate::codec::CodecError::from)?;
        super::publish(
            self.channel()?,
            running_routing_key(),
            &body,
            BasicProperties::default(),
        )
        .await
    }

    /// Publishes a `TaskCompleted` event over this worker's own channel.
    pub async fn publish_completed(&self, completed: &TaskCompleted) -> Result<()> {
        let body = serde_json::to_vec(completed).map_err(crate::codec::CodecError::from)?;
        super::publish(
            self.channel()?,
            completed_routing_key(),
            &body,
            BasicProperties::default(),
        )
        .await
    }

    /// Closes the channel and connection. Any unacknowledged delivery is released
    /// for redelivery by the broker.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.consumer = None;
        if let Some(channel) = self.channel.take() {
            channel.close(200, "disconnecting").await?;
        }
        if let Some(connection) = self.connection.take() {
            connection.close(200, "disconnecting").await?;
        }
        Ok(())
    }

    fn channel(&self) -> Result<&Channel> {
        self.channel.as_ref().ok_or(Error::NotConnected)
    }
}
