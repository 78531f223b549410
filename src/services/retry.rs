//! Bounded compare-and-update retry with exponential backoff and jitter
//!
//! Version conflicts are the one failure the engine retries internally; the
//! budget is bounded so a hot session degrades into a typed `Contention`
//! error instead of an unbounded spin.

use crate::config::RetryConfig;
use crate::error::{Result, SessionError};
use crate::metrics;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// One pass through a load → mutate → conditional-commit cycle
pub enum CasStep<T> {
    Done(T),
    Conflict,
}

/// Drive `op` until it commits, a non-conflict error surfaces, or the retry
/// budget runs out.
pub async fn with_cas_retry<T, F, Fut>(
    config: &RetryConfig,
    session_id: Uuid,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<CasStep<T>>>,
{
    let mut attempt = 0;
    loop {
        match op().await? {
            CasStep::Done(value) => return Ok(value),
            CasStep::Conflict => {
                metrics::CAS_CONFLICTS.inc();
                attempt += 1;

                if attempt >= config.max_attempts {
                    warn!(
                        %session_id,
                        attempts = config.max_attempts,
                        "giving up on contended session write"
                    );
                    return Err(SessionError::Contention {
                        session_id,
                        attempts: config.max_attempts,
                    });
                }

                tokio::time::sleep(backoff_delay(config, attempt)).await;
            }
        }
    }
}

/// Backoff for the given (1-based) conflict count, capped and jittered
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(exp as i32);
    let capped = base.min(config.max_backoff_ms as f64);

    let millis = if config.jitter {
        let factor = rand::thread_rng().gen_range(0.7..1.3);
        capped * factor
    } else {
        capped
    };

    Duration::from_millis(millis as u64)
}
