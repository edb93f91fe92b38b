//! Per-attempt deadline.
//!
//! A [`CancellationHandle`] owns the timer of exactly one physical attempt.
//! Racing the call against the timer drops the losing future, which aborts an
//! in-flight request when the deadline wins.

use std::{future::Future, pin::Pin, time::Duration};

use tokio::time::{sleep, Sleep};

/// Marker returned when the deadline fired before the call resolved.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Elapsed;

#[derive(Debug)]
pub(crate) struct CancellationHandle {
    timeout: Duration,
    timer: Option<Pin<Box<Sleep>>>,
}

impl CancellationHandle {
    pub(crate) fn arm(timeout: Duration) -> Self {
        Self {
            timeout,
            timer: Some(Box::pin(sleep(timeout))),
        }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Runs `call` until it resolves or the deadline fires, then releases the
    /// timer either way.
    pub(crate) async fn guard<F>(&mut self, call: F) -> Result<F::Output, Elapsed>
    where
        F: Future,
    {
        let outcome = match self.timer.as_mut() {
            Some(timer) => {
                tokio::select! {
                    biased;
                    output = call => Ok(output),
                    () = timer => Err(Elapsed),
                }
            }
            None => Err(Elapsed),
        };
        self.release();
        outcome
    }

    /// Disarms the timer. Returns `false` if it was already released.
    pub(crate) fn release(&mut self) -> bool {
        self.timer.take().is_some()
    }
}

impl Drop for CancellationHandle {
    fn drop(&mut self) {
        self.release();
    }
}
