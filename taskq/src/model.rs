//! The wire-level data model shared by the publisher, the worker runtime and the relay
//! client: [`TaskAssignment`], [`TaskRunning`], [`TaskCompleted`] and the relay's read
//! model, [`Task`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 128-bit identifier assigned to a task at publish time. Stable for the task's whole
/// lifetime.
pub type TaskId = Uuid;

/// Short identifier string selecting a handler within a worker of the matching
/// [`WorkerKind`].
pub type TaskKind = String;

/// Short identifier string partitioning the work stream; determines the queue a task
/// is routed to and the routing key used to publish it.
pub type WorkerKind = String;

/// Opaque, codec-interpreted payload bytes carried by a task assignment or completion.
///
/// Serialized as base64 inside the JSON wire record so that arbitrary binary data
/// survives transport untouched.
pub(crate) mod opaque_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// A task handed off by the publisher to the broker. Fanned out to both the assigned
/// worker kind's queue and the relay's catch-all queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    /// Unique identifier for this task, assigned at publish time.
    pub id: TaskId,
    /// The kind of task; selects the handler within the worker.
    pub task_kind: TaskKind,
    /// The kind of worker that should execute this task.
    pub worker_kind: WorkerKind,
    /// Opaque, codec-interpreted input payload.
    #[serde(with = "opaque_bytes")]
    pub input_data: Vec<u8>,
    /// Broker priority, 0-255. Higher values are served first.
    pub priority: u8,
    /// How long, in seconds, the relay should retain this task's record after
    /// completion.
    pub ttl_duration: u64,
    /// When the publisher created this assignment.
    pub created_at: DateTime<Utc>,
    /// Trace propagation carrier (OpenTelemetry-style string map).
    pub otel_ctx_carrier: HashMap<String, String>,
}

/// Emitted by a worker immediately before invoking a handler. Published "fire and
/// forget": the runtime does not wait for broker confirmation before starting the
/// handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunning {
    /// Identifier of the task that started running.
    pub id: TaskId,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// Name of the worker instance executing the task (`WorkerConfig::name`).
    pub executed_by: String,
}

/// Emitted by a worker after a handler finishes (successfully or not), and confirmed
/// by the broker before the delivery is acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompleted {
    /// Identifier of the task that finished.
    pub id: TaskId,
    /// When execution finished.
    pub completed_at: DateTime<Utc>,
    /// Opaque, codec-interpreted output payload. If `is_error` is true, this is
    /// instead a UTF-8 JSON [`crate::error::SerializedFailure`] document.
    #[serde(with = "opaque_bytes")]
    pub output_data: Vec<u8>,
    /// Whether the task failed (codec error or handler panic) rather than completing
    /// normally.
    pub is_error: bool,
}

/// Derived status of a task, computed by the relay from the events it has observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Assigned but no `TaskRunning` observed yet.
    Pending,
    /// `TaskRunning` observed, no `TaskCompleted` yet.
    Running,
    /// `TaskCompleted` observed.
    Completed,
}

/// The relay's read model for a task: the union of the three lifecycle events plus
/// derived fields. Returned by [`crate::relay::RelayClient::get_task`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Identifier of the task.
    pub id: TaskId,
    /// The kind of task.
    pub task_kind: TaskKind,
    /// The kind of worker responsible for executing it.
    pub worker_kind: WorkerKind,
    /// Derived status.
    pub status: TaskStatus,
    /// When the task was assigned.
    pub created_at: DateTime<Utc>,
    /// When execution started, if it has.
    pub started_at: Option<DateTime<Utc>>,
    /// When execution finished, if it has.
    pub completed_at: Option<DateTime<Utc>>,
    /// Output payload, once completed. See [`TaskCompleted::output_data`].
    #[serde(default, with = "opaque_bytes_option")]
    pub output_data: Option<Vec<u8>>,
    /// Whether the completed task failed.
    #[serde(default)]
    pub is_error: bool,
}

impl Task {
    /// True iff `status` is [`TaskStatus::Completed`].
    pub fn has_finished(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

mod opaque_bytes_option {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        bytes.as_ref().map(|b| STANDARD.encode(b)).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_assignment_round_trips_through_json() {
        let assignment = TaskAssignment {
            id: Uuid::new_v4(),
            task_kind: "double".to_string(),
            worker_kind: "w1".to_string(),
            input_data: vec![0, 159, 146, 150],
            priority: 7,
            ttl_duration: 3600,
            created_at: Utc::now(),
            otel_ctx_carrier: HashMap::from([("trace_id".to_string(), "abc".to_string())]),
        };

        let encoded = serde_json::to_vec(&assignment).unwrap();
        let decoded: TaskAssignment = serde_json::from_slice(&encoded).unwrap();

        assert_eq!(decoded.id, assignment.id);
        assert_eq!(decoded.input_data, assignment.input_data);
        assert_eq!(decoded.priority, assignment.priority);
        assert_eq!(decoded.otel_ctx_carrier, assignment.otel_ctx_carrier);
    }

    #[test]
    fn task_has_finished_iff_completed() {
        let mut task = Task {
            id: Uuid::new_v4(),
            task_kind: "double".to_string(),
            worker_kind: "w1".to_string(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            output_data: None,
            is_error: false,
        };
        assert!(!task.has_finished());

        task.status = TaskStatus::Running;
        assert!(!task.has_finished());

        task.status = TaskStatus::Completed;
        assert!(task.has_finished());
    }
}
