//! Polling helpers for tests driven by the processing loop.

use std::time::Duration;

/// Default time to wait for a condition.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Polls `condition` until it holds or `timeout` elapses.
///
/// Returns whether the condition was met.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Polls `condition` for up to [`DEFAULT_TIMEOUT`].
pub async fn wait_for(condition: impl FnMut() -> bool) -> bool {
    eventually(DEFAULT_TIMEOUT, condition).await
}

/// Checks that `condition` holds throughout `period`.
pub async fn consistently(period: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + period;
    while tokio::time::Instant::now() < deadline {
        if !condition() {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    condition()
}
