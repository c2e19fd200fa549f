//! Bounded connection retry.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{BrokerError, Result};

/// Fixed-count, fixed-backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// At least one attempt is always made. Exhaustion is reported as
/// [`BrokerError::RetriesExhausted`] carrying the last failure.
pub async fn connect_with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => {
                info!(attempt, "{} initialized successfully", what);
                return Ok(value);
            }
            Err(e) => {
                let retries_left = attempts - attempt;
                warn!(error = %e, retries_left, "Error initializing {}", what);
                last_error = e.to_string();
                if retries_left > 0 {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }

    Err(BrokerError::RetriesExhausted {
        what: what.to_string(),
        attempts,
        last_error,
    })
}
