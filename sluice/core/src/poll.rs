//! Fixed-interval polling for asynchronous cloud operations.
//!
//! CloudFormation stack creation and the Glue crawler/job runs expose no push
//! notification, so the stages block on a status check repeated at a fixed
//! interval. The attempt bound keeps a stuck run from blocking forever.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::config::PollSettings;

#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error(transparent)]
    Check(E),

    #[error("gave up waiting for {subject} after {attempts} status checks")]
    GaveUp { subject: String, attempts: u32 },
}

impl<E> PollError<E> {
    /// Collapse into the stage error type, mapping the attempt bound through
    /// `on_gave_up`.
    pub fn or_timeout(self, on_gave_up: impl FnOnce(u32) -> E) -> E {
        match self {
            PollError::Check(err) => err,
            PollError::GaveUp { attempts, .. } => on_gave_up(attempts),
        }
    }
}

/// Repeatedly invokes a status check until it yields a terminal result
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
    max_attempts: u32,
}

impl Poller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Poll `check` until it returns `Ok(Some(_))`, sleeping for the
    /// configured interval between attempts. `Ok(None)` means the operation
    /// is still in flight; an `Err` aborts immediately.
    pub async fn wait_for<T, E, F, Fut>(&self, subject: &str, mut check: F) -> Result<T, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        for attempt in 1..=self.max_attempts {
            if let Some(value) = check().await.map_err(PollError::Check)? {
                return Ok(value);
            }

            debug!(subject, attempt, "still waiting");
            tokio::time::sleep(self.interval).await;
        }

        Err(PollError::GaveUp {
            subject: subject.to_string(),
            attempts: self.max_attempts,
        })
    }
}

impl From<PollSettings> for Poller {
    fn from(settings: PollSettings) -> Self {
        Self::new(settings.interval, settings.max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_poller(max_attempts: u32) -> Poller {
        Poller::new(Duration::from_millis(1), max_attempts)
    }

    #[tokio::test]
    async fn returns_first_terminal_result() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, PollError<std::io::Error>> = fast_poller(10)
            .wait_for("test run", || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(if attempt == 3 { Some(attempt) } else { None }) }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let result: Result<(), PollError<std::io::Error>> = fast_poller(4)
            .wait_for("stuck run", || async { Ok(None) })
            .await;

        match result {
            Err(PollError::GaveUp { subject, attempts }) => {
                assert_eq!(subject, "stuck run");
                assert_eq!(attempts, 4);
            }
            other => panic!("expected GaveUp, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn check_errors_abort_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<(), PollError<String>> = fast_poller(10)
            .wait_for("failing run", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            })
            .await;

        assert!(matches!(result, Err(PollError::Check(ref msg)) if msg == "boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn or_timeout_maps_the_bound() {
        let err: PollError<String> = PollError::GaveUp {
            subject: "x".into(),
            attempts: 7,
        };
        assert_eq!(err.or_timeout(|attempts| format!("timed out ({attempts})")), "timed out (7)");

        let err = PollError::Check("inner".to_string());
        assert_eq!(err.or_timeout(|_| unreachable!()), "inner");
    }
}
