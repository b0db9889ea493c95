use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max,
        }
    }

    /// Delay before retry number `attempt` (1-based: the wait after the first failure is `delay(1)`).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or attempts
/// run out. Returns the last error in the latter two cases.
pub async fn retry<T, E, F, Fut>(
    backoff: &Backoff,
    what: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < backoff.max_attempts => {
                let delay = backoff.delay(attempt);
                tracing::warn!(
                    operation = what,
                    attempt,
                    max_attempts = backoff.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
