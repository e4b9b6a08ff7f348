//! Bounded exponential backoff for gateway calls

use super::GatewayError;
use crate::config::RetryConfig;
use crate::telemetry::{increment, record_latency, CounterMetric};
use crate::trade::TradeMode;
use std::future::Future;
use std::time::{Duration, Instant};

/// Retries transient gateway errors with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Single attempt, no backoff
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(
        &self,
        mode: TradeMode,
        operation: &'static str,
        call: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.run_if(mode, operation, GatewayError::is_transient, call)
            .await
    }

    /// Like [`run`](Self::run), retrying only errors accepted by `retryable`
    pub async fn run_if<T, F, Fut>(
        &self,
        mode: TradeMode,
        operation: &'static str,
        retryable: fn(&GatewayError) -> bool,
        mut call: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 1;
        loop {
            let started = Instant::now();
            let result = call().await;
            record_latency(operation, started.elapsed());

            match result {
                Ok(value) => return Ok(value),
                Err(e) if retryable(&e) && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient gateway error, retrying"
                    );
                    increment(CounterMetric::GatewayRetry, mode);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
