//! Bounded polling with fixed or exponential delays
//!
//! A single primitive, [`poll`], probes a remote condition until a value
//! satisfies a predicate or the attempt budget runs out. The delay between
//! attempts is driven by the [`PollPolicy`]'s [`Backoff`] rule:
//! - [`Backoff::Fixed`]: the same delay before every retry
//! - [`Backoff::Exponential`]: the delay doubles after every unsuccessful
//!   attempt, capped; the delay before attempt *k* (k >= 2) is `min(D * 2^(k-2), cap)`
//!
//! No sleep follows the final attempt.
//!
//! # Example
//!
//! ```no_run
//! use asc_upload::poll::poll_with_backoff;
//! use std::time::Duration;
//!
//! # async fn example() -> asc_upload::Result<()> {
//! let state = poll_with_backoff(
//!     10,
//!     Duration::from_secs(30),
//!     Duration::from_secs(300),
//!     "build processing to finish",
//!     || async { Ok(Some("VALID".to_string())) },
//!     |state| state == "VALID",
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{Backoff, PollPolicy};
use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// During polling a retryable probe failure is treated like "not ready yet";
/// anything else aborts the poll immediately.
pub trait IsRetryable {
    /// Returns true if the error is transient and the probe should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            // Rate limiting and server-side hiccups
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::MetadataMissing { .. }
            | Error::AppNotFound { .. }
            | Error::AppAmbiguous { .. }
            | Error::UploadOperationsMissing { .. }
            | Error::InvalidUploadOperation { .. }
            | Error::ChunkUploadFailed { .. }
            | Error::FinalizeFailed { .. }
            | Error::PollTimeout { .. }
            | Error::BuildProcessingFailed { .. }
            | Error::InvalidEncryptionValue { .. }
            | Error::Unauthorized { .. }
            | Error::MalformedResponse(_)
            | Error::Config { .. }
            | Error::Archive { .. }
            | Error::ExternalTool(_)
            | Error::NotSupported(_)
            | Error::Serialization(_) => false,
        }
    }
}

/// Passed to the retry callback after each unsuccessful attempt that will be retried
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryNotice {
    /// 1-based number of the attempt that just failed
    pub attempt: u32,
    /// Attempt budget
    pub attempts: u32,
    /// How long we sleep before the next attempt (before jitter)
    pub next_delay: Duration,
}

/// Probe until `accept` holds for a returned value
///
/// The probe yields `Ok(None)` while the resource does not exist yet. A value is
/// returned as soon as the probe yields `Ok(Some(v))` with `accept(&v)` true.
///
/// # Errors
///
/// - [`Error::PollTimeout`] when every attempt was unsuccessful
/// - the probe's own error when it is not [retryable](IsRetryable)
pub async fn poll<T, F, Fut, A, R>(
    policy: &PollPolicy,
    label: &str,
    mut probe: F,
    accept: A,
    mut on_retry: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
    A: Fn(&T) -> bool,
    R: FnMut(&RetryNotice),
{
    let mut delay = policy.delay;
    let mut last_error = None;

    for attempt in 1..=policy.attempts {
        last_error = None;
        match probe().await {
            Ok(Some(value)) if accept(&value) => {
                if attempt > 1 {
                    tracing::info!(label, attempts = attempt, "poll condition met after retry");
                }
                return Ok(value);
            }
            Ok(_) => {}
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, label, attempt, "transient failure while polling");
                last_error = Some(Box::new(e));
            }
            Err(e) => return Err(e),
        }

        if attempt == policy.attempts {
            break;
        }

        on_retry(&RetryNotice {
            attempt,
            attempts: policy.attempts,
            next_delay: delay,
        });
        tracing::warn!(
            label,
            attempt,
            max_attempts = policy.attempts,
            delay_secs = delay.as_secs_f64(),
            "waiting for {}",
            label
        );

        let sleep_for = if policy.jitter {
            add_jitter(delay)
        } else {
            delay
        };
        tokio::time::sleep(sleep_for).await;

        delay = next_delay(policy, delay);
    }

    tracing::error!(
        label,
        attempts = policy.attempts,
        "poll attempts exhausted"
    );
    Err(Error::PollTimeout {
        label: label.to_string(),
        attempts: policy.attempts,
        last_error,
    })
}

/// Fixed-cadence polling: sleeps exactly `delay` between attempts
pub async fn poll_until<T, F, Fut, A>(
    attempts: u32,
    delay: Duration,
    label: &str,
    probe: F,
    accept: A,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
    A: Fn(&T) -> bool,
{
    poll(
        &PollPolicy::fixed(attempts, delay),
        label,
        probe,
        accept,
        |_| {},
    )
    .await
}

/// Exponential-backoff polling: the delay doubles after every unsuccessful attempt, up to `cap`
pub async fn poll_with_backoff<T, F, Fut, A>(
    attempts: u32,
    initial_delay: Duration,
    cap: Duration,
    label: &str,
    probe: F,
    accept: A,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
    A: Fn(&T) -> bool,
{
    poll(
        &PollPolicy::exponential(attempts, initial_delay, cap),
        label,
        probe,
        accept,
        |_| {},
    )
    .await
}

/// Delay to use after `current` under the policy's growth rule
pub fn next_delay(policy: &PollPolicy, current: Duration) -> Duration {
    match policy.backoff {
        Backoff::Fixed => current,
        Backoff::Exponential { cap } => current.saturating_mul(2).min(cap),
    }
}

/// Add random jitter to a delay
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;
    use tokio::time::Instant;

    /// Probe that records when it was called and always answers `value`
    fn recording_probe(
        calls: Arc<Mutex<Vec<Instant>>>,
        value: Option<&'static str>,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<Option<&'static str>>>>>
    {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                calls.lock().await.push(Instant::now());
                Ok(value)
            })
        }
    }

    fn gaps(calls: &[Instant]) -> Vec<Duration> {
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt_does_not_sleep() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let value = poll_with_backoff(
            5,
            Duration::from_secs(30),
            Duration::from_secs(300),
            "ready",
            recording_probe(calls.clone(), Some("VALID")),
            |v| *v == "VALID",
        )
        .await
        .unwrap();

        assert_eq!(value, "VALID");
        assert_eq!(calls.lock().await.len(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_exhausts_exactly_n_attempts() {
        let calls = Arc::new(Mutex::new(Vec::new()));

        let result = poll_until(
            4,
            Duration::from_secs(30),
            "localization",
            recording_probe(calls.clone(), None),
            |_| true,
        )
        .await;

        match result {
            Err(Error::PollTimeout {
                label,
                attempts,
                last_error,
            }) => {
                assert_eq!(label, "localization");
                assert_eq!(attempts, 4);
                assert!(last_error.is_none());
            }
            other => panic!("expected PollTimeout, got {:?}", other),
        }
        let calls = calls.lock().await;
        assert_eq!(calls.len(), 4, "probe should run exactly once per attempt");
        assert!(
            gaps(&calls).iter().all(|g| *g == Duration::from_secs(30)),
            "fixed cadence should never grow"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_up_to_cap_and_skips_final_sleep() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let result = poll_with_backoff(
            6,
            Duration::from_secs(10),
            Duration::from_secs(35),
            "processing",
            recording_probe(calls.clone(), Some("PROCESSING")),
            |v| *v == "VALID",
        )
        .await;

        assert!(matches!(result, Err(Error::PollTimeout { .. })));
        let calls = calls.lock().await;
        assert_eq!(calls.len(), 6);

        // delay before attempt k = min(10s * 2^(k-2), 35s)
        let expected: Vec<Duration> = [10, 20, 35, 35, 35]
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect();
        assert_eq!(gaps(&calls), expected);

        // Timeout is reported right after the last probe
        assert_eq!(start.elapsed(), calls[5] - start);
        assert_eq!(start.elapsed(), Duration::from_secs(135));
    }

    #[tokio::test(start_paused = true)]
    async fn absent_and_rejected_values_are_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let value = poll_until(
            5,
            Duration::from_secs(1),
            "state",
            move || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    Ok(match n {
                        0 => None,
                        1 => Some("INVALID"),
                        _ => Some("VALID"),
                    })
                }
            },
            |v| *v == "VALID",
        )
        .await
        .unwrap();

        assert_eq!(value, "VALID");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_probe_error_counts_as_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let value = poll_until(
            3,
            Duration::from_secs(1),
            "build",
            move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(Error::Api {
                            context: "Failed to query builds.".to_string(),
                            status: 503,
                            body: String::new(),
                        })
                    } else {
                        Ok(Some(7))
                    }
                }
            },
            |_| true,
        )
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_final_transient_error_as_source() {
        let result: Result<u32> = poll_until(
            2,
            Duration::from_secs(1),
            "build",
            || async {
                Err(Error::Api {
                    context: "Failed to query builds.".to_string(),
                    status: 503,
                    body: "unavailable".to_string(),
                })
            },
            |_| true,
        )
        .await;

        let err = result.unwrap_err();
        let source = std::error::Error::source(&err).expect("timeout should carry its cause");
        assert!(source.to_string().contains("503"));
        match err {
            Error::PollTimeout {
                last_error: Some(last),
                attempts,
                ..
            } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, Error::Api { status: 503, .. }));
            }
            other => panic!("expected PollTimeout with a cause, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_probe_error_aborts_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result: Result<u32> = poll_until(
            5,
            Duration::from_secs(1),
            "build",
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Unauthorized {
                        context: "Failed to query builds.".to_string(),
                        body: String::new(),
                    })
                }
            },
            |_| true,
        )
        .await;

        assert!(matches!(result, Err(Error::Unauthorized { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1, "should not retry");
    }

    #[tokio::test(start_paused = true)]
    async fn on_retry_reports_upcoming_delay() {
        let notices = std::sync::Mutex::new(Vec::new());
        let policy = PollPolicy::exponential(4, Duration::from_secs(5), Duration::from_secs(60));

        let _ = poll(
            &policy,
            "visibility",
            || async { Ok(None::<u8>) },
            |_| true,
            |notice| notices.lock().unwrap().push(*notice),
        )
        .await;

        let notices = notices.into_inner().unwrap();
        let delays: Vec<u64> = notices.iter().map(|n| n.next_delay.as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20], "no notice after the final attempt");
        assert_eq!(notices[0].attempt, 1);
        assert!(notices.iter().all(|n| n.attempts == 4));
    }

    #[test]
    fn next_delay_follows_growth_rule() {
        let fixed = PollPolicy::fixed(3, Duration::from_secs(30));
        assert_eq!(
            next_delay(&fixed, Duration::from_secs(30)),
            Duration::from_secs(30)
        );

        let exp = PollPolicy::exponential(3, Duration::from_secs(30), Duration::from_secs(300));
        assert_eq!(
            next_delay(&exp, Duration::from_secs(30)),
            Duration::from_secs(60)
        );
        assert_eq!(
            next_delay(&exp, Duration::from_secs(240)),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn add_jitter_stays_within_bounds_over_many_iterations() {
        let delay = Duration::from_millis(50);
        for i in 0..200 {
            let jittered = add_jitter(delay);
            assert!(
                jittered >= delay,
                "iteration {i}: jittered {jittered:?} < base delay {delay:?}"
            );
            assert!(
                jittered <= delay * 2,
                "iteration {i}: jittered {jittered:?} > 2x base delay {:?}",
                delay * 2
            );
        }
    }

    #[test]
    fn error_is_retryable_classification() {
        let api = |status| Error::Api {
            context: String::new(),
            status,
            body: String::new(),
        };
        assert!(api(503).is_retryable());
        assert!(api(429).is_retryable());
        assert!(!api(404).is_retryable());

        let timeout = Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "t"));
        assert!(timeout.is_retryable());
        let not_found = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "n"));
        assert!(!not_found.is_retryable());

        assert!(
            !Error::AppNotFound {
                bundle_id: "x".into()
            }
            .is_retryable()
        );
    }
}
