//! Broker clients: [`publisher::PublisherBrokerClient`] (C1) and
//! [`worker::WorkerBrokerClient`] (C2), plus the topology they share (`wire`).

pub mod publisher;
pub mod worker;
mod wire;

use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, ExchangeKind};

use crate::error::{Error, Result};

pub use wire::{assignment_routing_key, completed_routing_key, running_routing_key};

/// Declares `task_exchange` (durable topic) and `relay_queue` (durable,
/// priority-capable, bound with `#`). Idempotent: redeclaring with identical
/// parameters succeeds; conflicting parameters surface as [`Error::BrokerConfig`].
///
/// Both the publisher and worker roles call this during `connect`, since either may
/// be the first participant to bring the topology into existence.
pub(crate) async fn declare_shared_topology(channel: &Channel) -> Result<()> {
    channel
        .exchange_declare(
            wire::TASK_EXCHANGE,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|source| Error::BrokerConfig {
            what: wire::TASK_EXCHANGE.to_string(),
            source,
        })?;

    declare_priority_queue(channel, wire::RELAY_QUEUE).await?;

    channel
        .queue_bind(
            wire::RELAY_QUEUE,
            wire::TASK_EXCHANGE,
            "#",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|source| Error::BrokerConfig {
            what: wire::RELAY_QUEUE.to_string(),
            source,
        })?;

    Ok(())
}

/// Declares a durable, priority-capable queue named `name`.
pub(crate) async fn declare_priority_queue(channel: &Channel, name: &str) -> Result<()> {
    let mut arguments = FieldTable::default();
    arguments.insert(
        "x-max-priority".into(),
        AMQPValue::ShortShortUInt(wire::MAX_PRIORITY),
    );

    channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            arguments,
        )
        .await
        .map_err(|source| Error::BrokerConfig {
            what: name.to_string(),
            source,
        })?;

    Ok(())
}

/// Publishes `body` to `task_exchange` with `routing_key` over `channel`, awaiting
/// broker confirmation. Shared by the publisher and worker roles, which both publish
/// lifecycle events the same way.
pub(crate) async fn publish(
    channel: &Channel,
    routing_key: &str,
    body: &[u8],
    properties: BasicProperties,
) -> Result<()> {
    let confirm = channel
        .basic_publish(
            wire::TASK_EXCHANGE,
            routing_key,
            BasicPublishOptions::default(),
            body,
            properties,
        )
        .await?
        .await?;

    match confirm {
        Confirmation::Nack(_) => Err(Error::PublishRejected {
            routing_key: routing_key.to_string(),
        }),
        Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
    }
}
