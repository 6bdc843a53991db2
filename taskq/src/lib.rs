//! # taskq
//!
//! Client-side runtime for a distributed task queue: publish tasks over AMQP, run a
//! typed worker pool against them, and poll a relay service for results.
//!
//! The worker runtime is the core of this crate: [`app::WorkerApp`] registers
//! task-kind handlers, [`runtime::entrypoint`] connects to the broker and drives the
//! dispatch loop, and [`runner::run_until_signal`] wraps that in OS signal handling
//! and graceful shutdown. [`broker::publisher::PublisherBrokerClient`] publishes task
//! assignments; [`relay::RelayClient`] polls the relay service for results.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::missing_docs_in_private_items,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    unused_crate_dependencies,
    clippy::as_conversions
)]

// Re-exporting the underlying lapin version so embedders don't have to add a
// matching version themselves.
pub use lapin;

pub mod app;
pub mod backoff;
pub mod broker;
pub mod codec;
pub mod config;
pub mod error;
pub mod extract;
pub mod handler;
pub mod model;
pub mod relay;
pub mod runner;
pub mod runtime;

pub use app::WorkerApp;
pub use error::{Error, Result};
pub use extract::Extract;
pub use handler::Handler;

#[cfg(test)]
mod tests {
    mod registration;
}
