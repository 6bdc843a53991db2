//! The worker runtime (C5): connects with backoff, drives the dispatch loop, and
//! runs each delivery through its execution state machine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use lapin::{BasicProperties, Channel};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::{TaskFactory, WorkerApp};
use crate::backoff::Backoff;
use crate::broker::worker::WorkerBrokerClient;
use crate::broker::{completed_routing_key, running_routing_key};
use crate::config::WorkerConfig;
use crate::error::{Error, Result, SerializedFailure};
use crate::extract::TaskContext;
use crate::model::{TaskAssignment, TaskCompleted, TaskRunning};

/// A cooperative shutdown signal shared between the dispatch loop and whoever
/// drives the runtime (typically the runner, C7).
///
/// `issue_shutdown` is level-triggered: calling it before or after anything is
/// waiting both work, unlike a bare [`Notify::notify_waiters`] call.
#[derive(Clone)]
pub struct Shutdown {
    requested_flag: Arc<AtomicBool>,
    requested_notify: Arc<Notify>,
    completed_flag: Arc<AtomicBool>,
    completed_notify: Arc<Notify>,
}

impl Shutdown {
    /// Creates a new, not-yet-requested shutdown signal.
    pub fn new() -> Self {
        Self {
            requested_flag: Arc::new(AtomicBool::new(false)),
            requested_notify: Arc::new(Notify::new()),
            completed_flag: Arc::new(AtomicBool::new(false)),
            completed_notify: Arc::new(Notify::new()),
        }
    }

    /// Requests a graceful shutdown. Idempotent.
    pub fn issue_shutdown(&self) {
        self.requested_flag.store(true, Ordering::Release);
        self.requested_notify.notify_waiters();
    }

    /// Resolves once the runtime has finished draining in-flight tasks and
    /// disconnected from the broker. Race-free against [`mark_complete`] landing
    /// before this is called, the same way [`requested`] is race-free against
    /// [`issue_shutdown`]: a bare [`Notify::notify_waiters`] call drops its
    /// notification on the floor if nothing is waiting yet.
    ///
    /// [`mark_complete`]: Self::mark_complete
    /// [`requested`]: Self::requested
    pub async fn wait_for_shutdown(&self) {
        loop {
            let notified = self.completed_notify.notified();
            if self.completed_flag.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    /// Resolves once [`issue_shutdown`] has been called.
    ///
    /// [`issue_shutdown`]: Self::issue_shutdown
    async fn requested(&self) {
        loop {
            let notified = self.requested_notify.notified();
            if self.requested_flag.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    fn mark_complete(&self) {
        self.completed_flag.store(true, Ordering::Release);
        self.completed_notify.notify_waiters();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `app` against `config` until shutdown is requested.
///
/// Connects under unbounded exponential backoff (connection failures are logged,
/// never fatal), then drives the dispatch loop until [`Shutdown::issue_shutdown`]
/// is called or the broker cancels the consumer.
pub async fn entrypoint<S>(app: WorkerApp<S>, config: WorkerConfig, shutdown: Shutdown) -> Result<()>
where
    S: Send + Sync + 'static,
{
    if app.handlers.is_empty() {
        return Err(Error::NoHandlers);
    }

    let handlers = Arc::new(app.handlers);
    let state = app.state;

    let mut broker = WorkerBrokerClient::new(config.broker.clone());
    let mut backoff = Backoff::for_broker_connect();
    loop {
        match broker.connect(&config.kind, config.prefetch).await {
            Ok(()) => break,
            Err(e) => {
                warn!("Failed to connect worker to broker, retrying: {e}");
                backoff.wait().await;
            }
        }
    }

    let result = dispatch_loop(&mut broker, handlers, state, &config, &shutdown).await;

    if let Err(e) = broker.disconnect().await {
        error!("Error while disconnecting worker broker client during shutdown: {e}");
    }
    shutdown.mark_complete();

    result
}

/// The single shared dispatch loop: races shutdown, in-flight completions and the
/// next delivery, biased in that order.
async fn dispatch_loop<S>(
    broker: &mut WorkerBrokerClient,
    handlers: Arc<HashMap<String, TaskFactory<S>>>,
    state: Arc<S>,
    config: &WorkerConfig,
    shutdown: &Shutdown,
) -> Result<()>
where
    S: Send + Sync + 'static,
{
    let mut in_flight: FuturesUnordered<JoinHandle<()>> = FuturesUnordered::new();

    let outcome = loop {
        let channel = broker.channel_handle()?;
        let consumer = broker.deliveries()?;

        tokio::select! {
            biased;

            _ = shutdown.requested() => {
                info!("Graceful shutdown signal received; stopping intake.");
                break Ok(());
            }

            Some(result) = in_flight.next(), if !in_flight.is_empty() => {
                if let Err(e) = result {
                    error!("Task execution unit panicked past its own catch_unwind boundary: {e}");
                }
                continue;
            }

            delivery = consumer.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        let unit = execution_unit(
                            delivery,
                            channel,
                            handlers.clone(),
                            state.clone(),
                            config.name.clone(),
                        );
                        in_flight.push(tokio::spawn(unit));
                    }
                    Some(Err(e)) => {
                        error!("Error receiving delivery: {e}");
                    }
                    None => {
                        error!("Broker cancelled the consumer for queue {:?}.", config.kind);
                        break Err(Error::ConsumerCancelled(config.kind.clone()));
                    }
                }
            }

            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                // Periodic tick: nothing to do but loop back and re-check shutdown.
                continue;
            }
        }
    };

    if in_flight.is_empty() {
        info!("No outstanding tasks to drain.");
    } else {
        info!("Draining {} in-flight task(s)...", in_flight.len());
        while let Some(result) = in_flight.next().await {
            if let Err(e) = result {
                error!("Task execution unit panicked past its own catch_unwind boundary: {e}");
            }
        }
        info!("Drain complete.");
    }

    outcome
}

/// Runs a single delivery through the `Decode -> Run -> Encode(Error) -> Complete ->
/// Ack/RejectPermanent/FailDelivery` state machine described in the component design.
async fn execution_unit<S>(
    delivery: Delivery,
    channel: Channel,
    handlers: Arc<HashMap<String, TaskFactory<S>>>,
    state: Arc<S>,
    executed_by: String,
) where
    S: Send + Sync + 'static,
{
    let assignment: TaskAssignment = match serde_json::from_slice(&delivery.data) {
        Ok(assignment) => assignment,
        Err(e) => {
            error!("Malformed task assignment, nacking without requeue: {e}");
            nack(&delivery, false).await;
            return;
        }
    };

    // Decode: look up the handler. Missing -> permanent rejection, no lifecycle
    // events published.
    if !handlers.contains_key(&assignment.task_kind) {
        warn!(
            "No handler registered for task kind {:?}, nacking without requeue.",
            assignment.task_kind
        );
        nack(&delivery, false).await;
        return;
    }

    // Run: emit TaskRunning fire-and-forget (not awaited) so the handler starts
    // without waiting on broker confirmation, then decode input and call the
    // handler.
    let running = TaskRunning {
        id: assignment.id,
        started_at: Utc::now(),
        executed_by,
    };
    let running_channel = channel.clone();
    tokio::spawn(async move {
        let body = match serde_json::to_vec(&running) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to serialize TaskRunning for task {}: {e}", running.id);
                return;
            }
        };
        if let Err(e) = crate::broker::publish(
            &running_channel,
            running_routing_key(),
            &body,
            BasicProperties::default(),
        )
        .await
        {
            error!("Failed to publish TaskRunning for task {}: {e}", running.id);
        }
    });

    let ctx = TaskContext::new(
        state,
        assignment.id,
        assignment.task_kind.clone(),
        assignment.worker_kind.clone(),
        assignment.input_data.clone(),
    );

    // The handler call is driven inside its own spawned task so a panic surfaces as
    // a `JoinError` here rather than unwinding this task, which still needs to
    // publish TaskCompleted and ack the delivery afterwards.
    let task_kind = assignment.task_kind.clone();
    let handler_task = tokio::spawn(async move {
        let factory = handlers
            .get(&task_kind)
            .expect("handler existence already checked above");
        factory.call(ctx).await
    });

    let (output_data, is_error) = match handler_task.await {
        Ok(Ok(bytes)) => (bytes, false),
        Ok(Err(failure)) => (failure.to_bytes(), true),
        Err(join_error) => (SerializedFailure::from_join_error(join_error).to_bytes(), true),
    };

    let completed = TaskCompleted {
        id: assignment.id,
        completed_at: Utc::now(),
        output_data,
        is_error,
    };

    debug!("Task {} finished (is_error={is_error}); publishing completion.", assignment.id);

    // Complete: publish, awaiting broker confirmation, before acking.
    let body = match serde_json::to_vec(&completed) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize TaskCompleted for task {}: {e}", assignment.id);
            return;
        }
    };

    match crate::broker::publish(&channel, completed_routing_key(), &body, BasicProperties::default()).await {
        Ok(()) => ack(&delivery).await,
        Err(e) => {
            // FailDelivery: leave unacked, rely on broker redelivery after channel
            // loss rather than nacking now (the broker may still be reachable for
            // acks even though this particular publish was rejected).
            error!("Failed to publish TaskCompleted for task {}, leaving delivery unacked: {e}", assignment.id);
        }
    }
}

async fn nack(delivery: &Delivery, requeue: bool) {
    if let Err(e) = delivery
        .nack(BasicNackOptions {
            multiple: false,
            requeue,
        })
        .await
    {
        error!("Failed to nack delivery: {e}");
    }
}

async fn ack(delivery: &Delivery) {
    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        error!("Failed to ack delivery: {e}");
    }
}
