//! The one place backoff math lives (§4.A). Every probe wraps its per-target
//! attempt with [`with_retry`] instead of rolling its own loop.

use std::future::Future;
use std::time::Duration;

use common::RetryConfig;
use tokio_util::sync::CancellationToken;

/// Outcome of a retried attempt: either the wrapped future's own result, or
/// the fact that `cancel` fired while we were waiting to retry.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Completed(Result<T, E>),
    Cancelled,
}

/// Wait before attempt `i + 1` (1-indexed `i`), per §4.A: `delay` for the
/// first post-failure wait, `delay * 2^(i-1)` afterwards. `i <= 0` also
/// returns `delay` (there is no attempt before the first).
fn backoff_delay(delay: Duration, i: u32) -> Duration {
    if i <= 1 {
        delay
    } else {
        delay.saturating_mul(1u32 << (i - 1).min(31))
    }
}

/// Calls `f` up to `cfg.count + 1` times total, waiting `backoff_delay`
/// between attempts. Returns as soon as `f` succeeds, or the last error once
/// attempts are exhausted. Honors `cancel` both inside each attempt (by
/// passing it through to `f`) and during the inter-attempt wait.
pub async fn with_retry<F, Fut, T, E>(
    cfg: RetryConfig,
    cancel: &CancellationToken,
    mut f: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(&CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let total_attempts = cfg.count + 1;
    let mut last_err = None;

    for attempt in 1..=total_attempts {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled;
        }

        match f(cancel).await {
            Ok(value) => return RetryOutcome::Completed(Ok(value)),
            Err(e) => last_err = Some(e),
        }

        if attempt == total_attempts {
            break;
        }

        let wait = backoff_delay(cfg.delay, attempt);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
        }
    }

    RetryOutcome::Completed(Err(last_err.expect("loop runs at least once")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn backoff_matches_spec_formula() {
        let delay = Duration::from_secs(1);
        assert_eq!(backoff_delay(delay, 0), delay);
        assert_eq!(backoff_delay(delay, 1), delay);
        assert_eq!(backoff_delay(delay, 2), delay * 2);
        assert_eq!(backoff_delay(delay, 3), delay * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_attempt_is_called_count_plus_one_times() {
        let cfg = RetryConfig { count: 3, delay: Duration::from_millis(1) };
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_clone = calls.clone();
        let outcome: RetryOutcome<(), &'static str> = with_retry(cfg, &cancel, move |_ct| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("boom")
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match outcome {
            RetryOutcome::Completed(Err(e)) => assert_eq!(e, "boom"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_without_waiting() {
        let cfg = RetryConfig { count: 5, delay: Duration::from_secs(10) };
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let outcome: RetryOutcome<u32, &'static str> = with_retry(cfg, &cancel, move |_ct| {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(n)
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        matches!(outcome, RetryOutcome::Completed(Ok(1)));
    }

    #[tokio::test]
    async fn cancellation_during_wait_short_circuits() {
        let cfg = RetryConfig { count: 10, delay: Duration::from_secs(60) };
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cancel_clone.cancel();
        });

        let outcome: RetryOutcome<(), &'static str> =
            with_retry(cfg, &cancel, |_ct| async { Err("boom") }).await;

        assert!(matches!(outcome, RetryOutcome::Cancelled));
    }
}
