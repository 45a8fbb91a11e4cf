//! Cancellation and backpressure helpers (§5)
//!
//! Suspension points (embedding calls, vector-store calls, relational
//! I/O, backup file writes) are cancellable via a scoped token that
//! propagates from the request boundary; bounded job queues reject
//! overflow synchronously with [`crate::error::DocleaError::QuotaExceeded`]
//! rather than blocking the caller.

use tokio_util::sync::CancellationToken;

use crate::error::DocleaError;

/// A child of the request-scoped [`CancellationToken`]; cancelling the
/// parent (client disconnect, shutdown) cancels every scope derived from
/// it, including a context build already in flight.
#[derive(Debug, Clone)]
pub struct Scope {
    token: CancellationToken,
}

impl Scope {
    pub fn root() -> Self {
        Self { token: CancellationToken::new() }
    }

    pub fn child(&self) -> Self {
        Self { token: self.token.child_token() }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `Err(Cancelled)` if this scope (or an ancestor) was
    /// cancelled before `future` resolved; otherwise the future's own
    /// result. Does not cancel `future` itself on timeout — only on
    /// cancellation — so a cancelled context build can still observe
    /// whatever legs already completed (§5: "abandon in-flight legs and
    /// not poison the cache").
    pub async fn run<F, T>(&self, future: F) -> Result<T, DocleaError>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(DocleaError::Cancelled),
            value = future => Ok(value),
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::root()
    }
}

/// A bounded admission gate for detection/ingestion jobs: `try_enter`
/// rejects synchronously once `capacity` concurrent jobs are admitted,
/// rather than queuing (§5's backpressure policy).
pub struct BoundedQueue {
    semaphore: tokio::sync::Semaphore,
}

/// Held while a job occupies a slot; dropping it releases the slot.
pub struct QueueSlot<'a> {
    _permit: tokio::sync::SemaphorePermit<'a>,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        Self { semaphore: tokio::sync::Semaphore::new(capacity.max(1)) }
    }

    /// Admits a job or rejects it immediately with `QuotaExceeded` —
    /// never blocks the caller waiting for a slot to free up.
    pub fn try_enter(&self, job_kind: &str) -> Result<QueueSlot<'_>, DocleaError> {
        match self.semaphore.try_acquire() {
            Ok(permit) => Ok(QueueSlot { _permit: permit }),
            Err(_) => Err(DocleaError::QuotaExceeded(format!("{job_kind} queue at capacity"))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelling_a_scope_aborts_run() {
        let scope = Scope::root();
        scope.cancel();
        let result = scope.run(async { 1 }).await;
        assert!(matches!(result, Err(DocleaError::Cancelled)));
    }

    #[tokio::test]
    async fn uncancelled_scope_returns_future_value() {
        let scope = Scope::root();
        let result = scope.run(async { 7 }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_child_scope() {
        let parent = Scope::root();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn bounded_queue_rejects_once_capacity_exhausted() {
        let queue = BoundedQueue::new(1);
        let _first = queue.try_enter("detection").unwrap();
        let second = queue.try_enter("detection");
        assert!(matches!(second, Err(DocleaError::QuotaExceeded(_))));
    }

    #[test]
    fn bounded_queue_frees_slot_when_dropped() {
        let queue = BoundedQueue::new(1);
        {
            let _slot = queue.try_enter("ingest").unwrap();
        }
        assert!(queue.try_enter("ingest").is_ok());
    }
}
