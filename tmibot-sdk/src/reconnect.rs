//! Automatic reconnection around [`Bot::run`].

use std::time::Duration;

use rand::Rng;

use crate::bot::Bot;
use crate::error::Result;

/// Configuration for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_factor: f64,
    /// Give up after this many consecutive failed sessions.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Next delay: `delay * factor` plus up to 25% jitter, capped at `max_delay`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let base = delay.as_millis() as u64;
        let jitter = rand_jitter(base / 4);
        let next = (base as f64 * self.backoff_factor) as u64 + jitter;
        Duration::from_millis(next.min(self.max_delay.as_millis() as u64))
    }
}

fn rand_jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max)
}

impl Bot {
    /// Run, reconnecting with exponential backoff after transport errors.
    ///
    /// Channels are rejoined from the tracked channel set. Returns `Ok` once
    /// the bot is stopped, or the first non-transport error (callback
    /// failure, misuse). Failure counting resets whenever a session reached
    /// the read loop.
    pub async fn run_with_reconnect(&self, reconnect: ReconnectConfig) -> Result<()> {
        let mut delay = reconnect.initial_delay;
        let mut consecutive_failures = 0u32;

        loop {
            let sessions_before = self.sessions();
            let err = match self.run().await {
                Ok(()) => return Ok(()),
                Err(e) if self.is_finished() => {
                    tracing::debug!(error = %e, "Stopped while reconnecting");
                    return Ok(());
                }
                Err(e) if !e.is_transport() => return Err(e),
                Err(e) => e,
            };

            if self.sessions() > sessions_before {
                consecutive_failures = 0;
                delay = reconnect.initial_delay;
            }
            consecutive_failures += 1;
            if reconnect
                .max_attempts
                .is_some_and(|max| consecutive_failures >= max)
            {
                tracing::error!(error = %err, attempts = consecutive_failures, "Giving up");
                return Err(err);
            }

            tracing::warn!(
                error = %err,
                attempt = consecutive_failures,
                delay_ms = delay.as_millis() as u64,
                "Disconnected, will reconnect"
            );
            tokio::time::sleep(delay).await;
            delay = reconnect.next_delay(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_caps() {
        let cfg = ReconnectConfig::default();
        let d1 = cfg.next_delay(Duration::from_secs(2));
        assert!(d1 >= Duration::from_secs(4) && d1 <= Duration::from_millis(4500));
        let capped = cfg.next_delay(Duration::from_secs(20));
        assert_eq!(capped, Duration::from_secs(30));
    }

    #[test]
    fn zero_delay_has_no_jitter() {
        let cfg = ReconnectConfig::default();
        assert_eq!(cfg.next_delay(Duration::ZERO), Duration::ZERO);
    }
}
