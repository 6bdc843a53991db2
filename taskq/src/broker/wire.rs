//! Naming and topology shared by the publisher and worker broker clients.

/// The durable topic exchange every queue in this crate is bound to.
pub const TASK_EXCHANGE: &str = "task_exchange";

/// The relay's catch-all queue, bound to every routing key via `#`.
pub const RELAY_QUEUE: &str = "relay_queue";

/// Maximum broker priority; also the queue argument used to enable priority queues.
pub const MAX_PRIORITY: u8 = 255;

/// Routing key used to publish a task assignment to `worker_kind`'s queue.
pub fn assignment_routing_key(worker_kind: &str) -> String {
    format!("tasks.{worker_kind}")
}

/// Routing key for a `TaskRunning` lifecycle event.
pub fn running_routing_key() -> &'static str {
    "relay.running"
}

/// Routing key for a `TaskCompleted` lifecycle event.
pub fn completed_routing_key() -> &'static str {
    "relay.completed"
}
