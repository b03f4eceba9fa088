//! Generic retry-with-backoff helper. Used by the token refresher and by
//! any other caller that needs a fixed retry schedule rather than a loop
//! hand-rolled at the call site.

use std::time::Duration;

/// Retries `op` according to `schedule` (one sleep per retry, in order).
/// `classify` decides whether a given error is worth retrying at all; the
/// first non-retryable error, or exhaustion of the schedule, returns the
/// last error seen.
pub async fn retry<T, E, Op, Fut, Classify>(
    mut op: Op,
    classify: Classify,
    schedule: &[Duration],
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    Classify: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !classify(&err) || attempt >= schedule.len() {
                    return Err(err);
                }
                tokio::time::sleep(schedule[attempt]).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let schedule = [Duration::from_millis(1), Duration::from_millis(1)];
        let result: Result<u32, &str> = retry(
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { Err("transient") } else { Ok(n) } }
            },
            |_| true,
            &schedule,
        )
        .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn stops_immediately_on_non_retryable_error() {
        let schedule = [Duration::from_millis(1)];
        let attempts = AtomicU32::new(0);
        let result: Result<(), &str> = retry(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
            |_| false,
            &schedule,
        )
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_schedule_exhausted() {
        let schedule = [Duration::from_millis(1), Duration::from_millis(1)];
        let attempts = AtomicU32::new(0);
        let result: Result<(), &str> = retry(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("still failing") }
            },
            |_| true,
            &schedule,
        )
        .await;
        assert_eq!(result, Err("still failing"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
