//! Exponential backoff with jitter, used to retry broker connection attempts and
//! relay HTTP calls.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryPolicy;

/// Tracks the delay for the next attempt of a retried operation.
pub struct Backoff {
    next_delay: Duration,
    max_delay: Duration,
    factor: f64,
}

impl Backoff {
    /// Builds a backoff starting at `initial`, doubling (or scaling by `factor`)
    /// towards a cap of `max`.
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            next_delay: initial,
            max_delay: max,
            factor,
        }
    }

    /// Builds a backoff matching the connect-loop policy: 1 s initial, doubling,
    /// capped at 15 s, unbounded retries.
    pub fn for_broker_connect() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(15), 2.0)
    }

    /// Builds a backoff from a [`RetryPolicy`]'s initial/max/factor fields.
    pub fn from_retry_policy(policy: &RetryPolicy) -> Self {
        Self::new(policy.initial_backoff, policy.max_backoff, policy.factor)
    }

    /// Sleeps for the current delay (with up to 20% jitter), then advances the
    /// delay towards the cap.
    pub async fn wait(&mut self) {
        let jitter_fraction: f64 = rand::thread_rng().gen_range(0.8..1.2);
        let jittered = self.next_delay.mul_f64(jitter_fraction);
        tokio::time::sleep(jittered).await;

        let scaled = self.next_delay.mul_f64(self.factor);
        self.next_delay = scaled.min(self.max_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_capped_at_max() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(4), 2.0);
        for _ in 0..10 {
            assert!(backoff.next_delay <= Duration::from_secs(4));
            backoff.next_delay = backoff.next_delay.mul_f64(backoff.factor).min(backoff.max_delay);
        }
    }
}
