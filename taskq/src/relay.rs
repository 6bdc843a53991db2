//! The relay client (C6): reads task state from the external relay HTTP service.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::model::{Task, TaskId};

/// Health of the relay service, as reported by [`RelayClient::check_health`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayHealth {
    /// The relay responded 200 to `/health`.
    Healthy,
    /// The relay responded, but not with a definite healthy status.
    Unknown,
    /// The relay could not be reached at all.
    NotReachable,
}

/// Reads task records from the relay service over HTTP.
pub struct RelayClient {
    http: reqwest::Client,
    config: RelayConfig,
}

impl RelayClient {
    /// Builds a client for the relay at `config.url`.
    pub fn new(config: RelayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(Error::RelayUnavailable)?;
        Ok(Self { http, config })
    }

    /// `GET /tasks/{id}`. Returns `Ok(None)` on 404, retries on 5xx and transport
    /// failures per the configured [`RetryPolicy`][crate::config::RetryPolicy].
    pub async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let url = format!("{}/tasks/{id}", self.config.url);
        let mut backoff = Backoff::from_retry_policy(&self.config.retry);

        for attempt in 1..=self.config.retry.max_attempts {
            let response = self.http.get(&url).send().await;

            match response {
                Ok(response) if response.status() == StatusCode::NOT_FOUND => return Ok(None),
                Ok(response) if response.status().is_success() => {
                    let task = response.json::<Task>().await.map_err(Error::RelayUnavailable)?;
                    return Ok(Some(task));
                }
                Ok(response) if response.status().is_server_error() => {
                    warn!(
                        "Relay returned {} for task {id} (attempt {attempt}/{}), retrying...",
                        response.status(),
                        self.config.retry.max_attempts
                    );
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let message = response.text().await.unwrap_or_default();
                    return Err(Error::Relay { status, message });
                }
                Err(e) if attempt == self.config.retry.max_attempts => {
                    return Err(Error::RelayUnavailable(e));
                }
                Err(e) => {
                    warn!("Transport error getting task {id} (attempt {attempt}), retrying: {e}");
                }
            }

            if attempt < self.config.retry.max_attempts {
                backoff.wait().await;
            }
        }

        Err(Error::Relay {
            status: 0,
            message: format!("exhausted {} attempts", self.config.retry.max_attempts),
        })
    }

    /// `GET /health`.
    pub async fn check_health(&self) -> RelayHealth {
        let url = format!("{}/health", self.config.url);
        match self.http.get(&url).send().await {
            Ok(response) if response.status() == StatusCode::OK => RelayHealth::Healthy,
            Ok(_) => RelayHealth::Unknown,
            Err(e) => {
                debug!("Relay health check failed: {e}");
                RelayHealth::NotReachable
            }
        }
    }

    /// Polls [`get_task`](Self::get_task) on `interval` until the task has finished
    /// or `timeout` elapses.
    pub async fn poll_task(&self, id: TaskId, interval: Duration, timeout: Duration) -> Result<Option<Task>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(task) = self.get_task(id).await? {
                if task.has_finished() {
                    return Ok(Some(task));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            tokio::time::sleep(interval.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }
}
