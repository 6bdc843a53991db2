//! Error types used throughout `taskq`.

use thiserror::Error as ThisError;

/// Errors that may be returned by `taskq`, covering broker transport, codec failures,
/// handler dispatch, relay access and configuration problems.
#[derive(Debug, ThisError)]
pub enum Error {
    /// A broker operation was attempted before `connect` or after `disconnect`.
    #[error("broker client used before connecting or after disconnecting")]
    NotConnected,

    /// An underlying `lapin` call failed (connection or channel loss).
    #[error("broker transport error: {0}")]
    BrokerTransport(#[from] lapin::Error),

    /// Declaring an exchange or queue conflicted with an existing declaration of the
    /// same name but different parameters.
    #[error("broker topology conflict while declaring {what:?}: {source}")]
    BrokerConfig {
        /// What was being declared, e.g. `"task_exchange"` or a queue name.
        what: String,
        /// The underlying error.
        #[source]
        source: lapin::Error,
    },

    /// A publish was not confirmed by the broker (publisher confirms negative-acked it).
    #[error("broker did not confirm publish of message {routing_key:?}")]
    PublishRejected {
        /// Routing key of the rejected publish.
        routing_key: String,
    },

    /// A destructive/administrative operation (e.g. `purge`) was attempted outside
    /// `test_mode`.
    #[error("operation {operation:?} is only permitted with test_mode enabled")]
    NotPermitted {
        /// Name of the attempted operation.
        operation: String,
    },

    /// Encoding or decoding a task payload failed.
    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    /// No handler is registered for the task kind carried by a delivery.
    #[error("no handler registered for task kind {0:?}")]
    HandlerNotRegistered(String),

    /// `entrypoint` was called without any handlers registered on the app.
    #[error("no task handlers were registered on the worker app")]
    NoHandlers,

    /// The broker cancelled the worker's consumer (e.g. queue deleted underneath it).
    #[error("broker cancelled the consumer for queue {0:?}")]
    ConsumerCancelled(String),

    /// The relay returned a 4xx response other than 404.
    #[error("relay returned an error response: {status}: {message}")]
    Relay {
        /// HTTP status code.
        status: u16,
        /// Response body, if any, or a transport description.
        message: String,
    },

    /// The relay could not be reached, or every retry attempt failed.
    #[error("relay unavailable: {0}")]
    RelayUnavailable(#[from] reqwest::Error),

    /// A required configuration value was missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience type for a result with `taskq`'s error.
pub type Result<T> = std::result::Result<T, Error>;

/// Handler argument extractors that cannot fail report [`std::convert::Infallible`]
/// as their error type; this lets them convert into `taskq`'s error for the sake of
/// handlers mixing fallible and infallible extractors.
impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

/// A JSON-serializable description of a failure, used as the `output_data` of a
/// `TaskCompleted` event when `is_error` is true.
///
/// See invariant 3 in the data model: `{"type": <string>, "message": <string>}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SerializedFailure {
    /// A short classification of the failure, e.g. `"CodecError"` or `"HandlerPanic"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// A human-readable description of the failure.
    pub message: String,
}

impl SerializedFailure {
    /// Builds a failure document from a codec error.
    pub(crate) fn from_codec_error(error: &crate::codec::CodecError) -> Self {
        Self {
            kind: "CodecError".to_string(),
            message: error.to_string(),
        }
    }

    /// Builds a failure document from a handler argument extraction error.
    pub(crate) fn from_extract_error(error: &Error) -> Self {
        Self {
            kind: "ExtractError".to_string(),
            message: error.to_string(),
        }
    }

    /// Builds a failure document from the `JoinError` of a handler task that
    /// panicked, extracting a message the same way a panic payload commonly
    /// stringifies. A join error that isn't a panic (task cancellation) is
    /// reported via its own `Display` text instead.
    pub(crate) fn from_join_error(error: tokio::task::JoinError) -> Self {
        if !error.is_panic() {
            return Self {
                kind: "HandlerPanic".to_string(),
                message: error.to_string(),
            };
        }

        let payload = error.into_panic();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked with a non-string payload".to_string()
        };

        Self {
            kind: "HandlerPanic".to_string(),
            message,
        }
    }

    /// Encodes this failure document as UTF-8 JSON bytes.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("SerializedFailure always serializes")
    }
}
