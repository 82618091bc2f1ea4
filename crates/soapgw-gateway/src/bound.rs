//! Concurrency bound for dispatch work
//!
//! Admission is a hard limit: a request waits for one of `max_concurrency`
//! permits. Once admitted, its work is spawned and always runs to
//! completion, even if the caller stops waiting for it. The caller gets
//! the result, or the cancellation or deadline error if that comes first.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cancellation and deadline of one inbound request
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    async fn deadline_elapsed(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoundError {
    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("dispatch task failed: {0}")]
    TaskFailed(String),
}

/// Snapshot of bound activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BoundStats {
    pub max_concurrency: usize,
    /// Spawned and not yet finished
    pub in_flight: usize,
    /// Finished, whether or not anyone was still waiting
    pub completed: usize,
    /// Callers that stopped waiting after their work was admitted
    pub abandoned: usize,
}

#[derive(Default)]
struct Counters {
    in_flight: AtomicUsize,
    completed: AtomicUsize,
    abandoned: AtomicUsize,
}

/// Counts one spawned unit of work, including work that panics
struct InFlight(Arc<Counters>);

impl InFlight {
    fn start(counters: Arc<Counters>) -> Self {
        counters.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.0.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Semaphore-backed admission control
#[derive(Clone)]
pub struct ConcurrencyBound {
    semaphore: Arc<Semaphore>,
    max: usize,
    counters: Arc<Counters>,
}

impl ConcurrencyBound {
    pub fn new(max_concurrency: usize) -> Self {
        let max = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Run `work` once a permit is free.
    ///
    /// # Errors
    ///
    /// Returns [`BoundError::Cancelled`] or [`BoundError::DeadlineExceeded`]
    /// when the request gives up while queued or while the work runs, and
    /// [`BoundError::TaskFailed`] when the work panics.
    pub async fn run<F, T>(&self, ctx: &RequestContext, work: F) -> Result<T, BoundError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(BoundError::Cancelled),
            () = ctx.deadline_elapsed() => return Err(BoundError::DeadlineExceeded),
            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|e| BoundError::TaskFailed(e.to_string()))?
            }
        };

        let tracker = InFlight::start(self.counters.clone());
        let mut handle = tokio::spawn(async move {
            let _tracker = tracker;
            let _permit = permit;
            work.await
        });

        let outcome = tokio::select! {
            joined = &mut handle => {
                return joined.map_err(|e| {
                    warn!(error = %e, "dispatch task failed");
                    BoundError::TaskFailed(e.to_string())
                });
            }
            () = ctx.cancel.cancelled() => BoundError::Cancelled,
            () = ctx.deadline_elapsed() => BoundError::DeadlineExceeded,
        };

        self.counters.abandoned.fetch_add(1, Ordering::SeqCst);
        debug!(reason = %outcome, "caller stopped waiting for admitted work");
        Err(outcome)
    }

    pub fn stats(&self) -> BoundStats {
        BoundStats {
            max_concurrency: self.max,
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            abandoned: self.counters.abandoned.load(Ordering::SeqCst),
        }
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
