//! The publisher-role broker client (C1): declares topology and publishes task
//! assignments and lifecycle events.

use std::collections::HashSet;

use lapin::options::{ConfirmSelectOptions, ExchangeDeleteOptions, QueueDeleteOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, info, trace};

use crate::broker::{assignment_routing_key, completed_routing_key, running_routing_key};
use crate::config::BrokerConfig;
use crate::error::{Error, Result};
use crate::model::{TaskAssignment, TaskCompleted, TaskRunning};

/// Publishes task assignments and lifecycle events to the broker.
pub struct PublisherBrokerClient {
    config: BrokerConfig,
    connection: Option<Connection>,
    channel: Option<Channel>,
    known_worker_kinds: HashSet<String>,
}

impl PublisherBrokerClient {
    /// Builds a client that will connect using `config` once [`connect`] is called.
    ///
    /// [`connect`]: Self::connect
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            connection: None,
            channel: None,
            known_worker_kinds: HashSet::new(),
        }
    }

    /// Connects to the broker, declares `task_exchange` and `relay_queue`, and
    /// enables publisher confirms if configured to.
    pub async fn connect(&mut self) -> Result<()> {
        debug!("Connecting publisher to broker at {:?}...", self.config.url);
        let connection =
            Connection::connect(&self.config.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        super::declare_shared_topology(&channel).await?;

        if self.config.publisher_confirms {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await?;
        }

        info!("Publisher connected to broker.");
        self.connection = Some(connection);
        self.channel = Some(channel);
        Ok(())
    }

    /// Declares the per-`worker_kind` queue if it has not already been declared by
    /// this client instance.
    pub async fn ensure_worker_queue(&mut self, worker_kind: &str) -> Result<()> {
        if self.known_worker_kinds.contains(worker_kind) {
            return Ok(());
        }

        let channel = self.channel()?;
        super::declare_priority_queue(channel, worker_kind).await?;
        channel
            .queue_bind(
                worker_kind,
                super::wire::TASK_EXCHANGE,
                &assignment_routing_key(worker_kind),
                Default::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| Error::BrokerConfig {
                what: worker_kind.to_string(),
                source,
            })?;

        self.known_worker_kinds.insert(worker_kind.to_string());
        Ok(())
    }

    /// Publishes a task assignment, routed to `tasks.<worker_kind>` with the
    /// assignment's broker priority.
    pub async fn publish_assignment(&mut self, assignment: &TaskAssignment) -> Result<()> {
        self.ensure_worker_queue(&assignment.worker_kind).await?;

        let routing_key = assignment_routing_key(&assignment.worker_kind);
        let body = serde_json::to_vec(assignment).map_err(crate::codec::CodecError::from)?;
        let properties = BasicProperties::default().with_priority(assignment.priority);

        self.publish(&routing_key, &body, properties).await
    }

    /// Publishes a `TaskRunning` event, visible only to the relay queue.
    pub async fn publish_running(&mut self, running: &TaskRunning) -> Result<()> {
        let body = serde_json::to_vec(running).map_err(crate::codec::CodecError::from)?;
        self.publish(running_routing_key(), &body, BasicProperties::default())
            .await
    }

    /// Publishes a `TaskCompleted` event, visible only to the relay queue.
    pub async fn publish_completed(&mut self, completed: &TaskCompleted) -> Result<()> {
        let body = serde_json::to_vec(completed).map_err(crate::codec::CodecError::from)?;
        self.publish(completed_routing_key(), &body, BasicProperties::default())
            .await
    }

    /// Publishes `body` to `task_exchange` with `routing_key`, awaiting broker
    /// confirmation when publisher confirms are enabled.
    async fn publish(
        &mut self,
        routing_key: &str,
        body: &[u8],
        properties: BasicProperties,
    ) -> Result<()> {
        let channel = self.channel()?;
        trace!("Publishing {} bytes to routing key {routing_key:?}...", body.len());
        super::publish(channel, routing_key, body, properties).await
    }

    /// Deletes the queue for `worker_kind`. Only permitted when `test_mode` is set.
    pub async fn purge(&mut self, worker_kind: &str) -> Result<()> {
        if !self.config.test_mode {
            return Err(Error::NotPermitted {
                operation: "purge".to_string(),
            });
        }

        let channel = self.channel()?;
        channel
            .queue_delete(worker_kind, QueueDeleteOptions::default())
            .await?;
        self.known_worker_kinds.remove(worker_kind);
        Ok(())
    }

    /// Deletes `task_exchange` and `relay_queue` entirely. Only permitted when
    /// `test_mode` is set; intended for test fixtures tearing down a broker vhost.
    pub async fn purge_topology(&mut self) -> Result<()> {
        if !self.config.test_mode {
            return Err(Error::NotPermitted {
                operation: "purge_topology".to_string(),
            });
        }

        let channel = self.channel()?;
        channel
            .queue_delete(super::wire::RELAY_QUEUE, QueueDeleteOptions::default())
            .await?;
        channel
            .exchange_delete(super::wire::TASK_EXCHANGE, ExchangeDeleteOptions::default())
            .await?;
        Ok(())
    }

    /// Closes the channel and connection. Subsequent operations fail with
    /// [`Error::NotConnected`].
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.take() {
            channel.close(200, "disconnecting").await?;
        }
        if let Some(connection) = self.connection.take() {
            connection.close(200, "disconnecting").await?;
        }
        self.known_worker_kinds.clear();
        Ok(())
    }

    fn channel(&self) -> Result<&Channel> {
        self.channel.as_ref().ok_or(Error::NotConnected)
    }
}
