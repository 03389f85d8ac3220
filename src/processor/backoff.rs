use anyhow::{anyhow, Result};
use std::time::{Duration, SystemTime};
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Sleeps for `delay` unless `token` fires first, in which case an error is returned.
pub(crate) async fn sleep_with_cancellation(
    delay: Duration,
    token: &CancellationToken,
) -> Result<()> {
    if token.is_cancelled() {
        return Err(anyhow!("sleep cancelled"));
    }

    if delay.is_zero() {
        yield_now().await;
        return Ok(());
    }

    tokio::select! {
        _ = token.cancelled() => Err(anyhow!("sleep cancelled")),
        _ = sleep(delay) => Ok(()),
    }
}

/// Waits until the wall clock reaches `deadline`.
///
/// Re-checks the wall clock after each sleep because the monotonic timer used by
/// tokio can drift from system time; returns early with an error on cancellation.
pub(crate) async fn sleep_until_wall_clock(
    deadline: SystemTime,
    token: &CancellationToken,
) -> Result<()> {
    loop {
        let remaining = deadline
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        if remaining.is_zero() {
            return if token.is_cancelled() {
                Err(anyhow!("sleep cancelled"))
            } else {
                Ok(())
            };
        }
        sleep_with_cancellation(remaining, token).await?;
    }
}
