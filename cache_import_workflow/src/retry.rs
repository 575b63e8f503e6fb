//! Bounded fixed-interval retries with a deadline and cancellation.
use std::{fmt::Display, future::Future, time::Duration};

use observability_deps::tracing::warn;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How many times to attempt an operation, how long to wait between attempts and how long the
/// whole sequence may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval: Duration::from_secs(60),
            deadline: Duration::from_secs(10 * 60),
        }
    }
}

/// Why a retried operation gave up.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u32, last: Option<E> },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::DeadlineExceeded { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { last, .. } => Some(last),
            Self::DeadlineExceeded { last, .. } | Self::Cancelled { last, .. } => last.as_ref(),
        }
    }
}

impl RetryPolicy {
    /// The instant the whole retry sequence must finish by, starting now.
    pub fn deadline_from_now(&self) -> Instant {
        Instant::now() + self.deadline
    }

    /// Run `op` until it succeeds, attempts run out, `deadline` passes or `cancel` fires.
    ///
    /// `op` receives the 1-based attempt number. No wait follows the final attempt, and a wait
    /// that would end past `deadline` is not started. `cancel` only ends the waits between
    /// attempts: an attempt that has started runs to completion or to `deadline`.
    pub async fn run<T, E, F, Fut>(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        E: Display + Send,
        T: Send,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last = None;
        let mut attempt = 0;
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts: 0, last });
        }
        loop {
            attempt += 1;
            match tokio::time::timeout_at(deadline, op(attempt)).await {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Ok(Err(e)) => {
                    warn!(attempt, max_attempts, error = %e, "attempt failed, retrying");
                    last = Some(e);
                }
                Err(_) => {
                    return Err(RetryError::DeadlineExceeded {
                        attempts: attempt,
                        last,
                    });
                }
            }

            if Instant::now() + self.interval > deadline {
                return Err(RetryError::DeadlineExceeded {
                    attempts: attempt,
                    last,
                });
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt, last });
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    type Attempt = std::future::Ready<Result<u32, String>>;

    fn failing_until(
        success_on: u32,
        calls: &Arc<AtomicU32>,
    ) -> impl FnMut(u32) -> Attempt + Send {
        let calls = Arc::clone(calls);
        move |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            if attempt >= success_on {
                std::future::ready(Ok(attempt))
            } else {
                std::future::ready(Err(format!("attempt {attempt} failed")))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_later_attempt() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let attempt = policy
            .run(
                policy.deadline_from_now(),
                &CancellationToken::new(),
                failing_until(2, &calls),
            )
            .await
            .unwrap();

        assert_eq!(attempt, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let err = policy
            .run(
                policy.deadline_from_now(),
                &CancellationToken::new(),
                failing_until(u32::MAX, &calls),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            RetryError::Exhausted { attempts: 3, last } if last == "attempt 3 failed"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // two waits between three attempts, none after the last
        assert_eq!(start.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_deadline() {
        let policy = RetryPolicy {
            max_attempts: 5,
            interval: Duration::from_secs(60),
            deadline: Duration::from_secs(90),
        };
        let calls = Arc::new(AtomicU32::new(0));

        let err = policy
            .run(
                policy.deadline_from_now(),
                &CancellationToken::new(),
                failing_until(u32::MAX, &calls),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::DeadlineExceeded { attempts: 2, .. }));
        assert_eq!(err.last_error().unwrap(), "attempt 2 failed");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_hits_deadline() {
        let policy = RetryPolicy {
            max_attempts: 3,
            interval: Duration::from_secs(1),
            deadline: Duration::from_secs(10),
        };

        let err = policy
            .run(policy.deadline_from_now(), &CancellationToken::new(), |_| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, String>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RetryError::DeadlineExceeded {
                attempts: 1,
                last: None
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_wait() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                cancel.cancel();
            })
        };

        let start = Instant::now();
        let err = policy
            .run(
                policy.deadline_from_now(),
                &cancel,
                failing_until(u32::MAX, &calls),
            )
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, RetryError::Cancelled { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    fn cancel_after(cancel: &CancellationToken, delay: Duration) -> tokio::task::JoinHandle<()> {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            cancel.cancel();
        })
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_lets_running_attempt_finish() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let finished = Arc::new(AtomicU32::new(0));
        let canceller = cancel_after(&cancel, Duration::from_secs(1));

        let start = Instant::now();
        let result = policy
            .run(policy.deadline_from_now(), &cancel, |attempt| {
                let finished = Arc::clone(&finished);
                async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(attempt)
                }
            })
            .await;
        canceller.await.unwrap();

        assert_eq!(result.unwrap(), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_failing_attempt_reports_it() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let finished = Arc::new(AtomicU32::new(0));
        let canceller = cancel_after(&cancel, Duration::from_secs(1));

        let err = policy
            .run(policy.deadline_from_now(), &cancel, |attempt| {
                let finished = Arc::clone(&finished);
                async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(format!("attempt {attempt} failed"))
                }
            })
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(matches!(
            &err,
            RetryError::Cancelled { attempts: 1, last: Some(last) } if last == "attempt 1 failed"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_makes_no_attempt() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = policy
            .run(
                policy.deadline_from_now(),
                &cancel,
                failing_until(u32::MAX, &calls),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Cancelled { attempts: 0, last: None }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
