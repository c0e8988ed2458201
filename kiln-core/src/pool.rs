//! Bounded worker pool.
//!
//! A lease blocks until a worker is idle. Workers go back to the pool when
//! the lease drops, so a cycle that errors or panics still returns its
//! worker.

use crate::error::{Error, Result};
use crate::worker::Worker;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<Worker>>>,
    size: usize,
}

impl WorkerPool {
    /// Pool of `size` workers; a size of zero is raised to one
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let workers = (0..size).rev().map(Worker::new).collect();
        Self {
            permits: Arc::new(Semaphore::new(size)),
            idle: Arc::new(Mutex::new(workers)),
            size,
        }
    }

    /// Wait for an idle worker.
    ///
    /// Fails once the pool is closed.
    pub async fn lease(&self) -> Result<WorkerLease> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolClosed)?;
        Ok(self.take(permit))
    }

    /// Lease without waiting
    pub fn try_lease(&self) -> Option<WorkerLease> {
        let permit = Arc::clone(&self.permits).try_acquire_owned().ok()?;
        Some(self.take(permit))
    }

    fn take(&self, permit: OwnedSemaphorePermit) -> WorkerLease {
        // A permit guarantees an idle worker; pop cannot come back empty
        let worker = self.idle.lock().pop().unwrap_or_else(|| Worker::new(self.size));
        WorkerLease {
            worker: Some(worker),
            idle: Arc::clone(&self.idle),
            _permit: permit,
        }
    }

    /// Refuse all further leases; current leases are unaffected
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers not currently leased
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Exclusive use of one worker
#[derive(Debug)]
pub struct WorkerLease {
    worker: Option<Worker>,
    idle: Arc<Mutex<Vec<Worker>>>,
    // Released after the worker is back on the idle stack
    _permit: OwnedSemaphorePermit,
}

impl Deref for WorkerLease {
    type Target = Worker;

    fn deref(&self) -> &Worker {
        // Only taken in drop
        self.worker.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for WorkerLease {
    fn deref_mut(&mut self) -> &mut Worker {
        self.worker.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.recycle();
            self.idle.lock().push(worker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lease_and_return() {
        let pool = WorkerPool::new(2);
        let a = pool.lease().await.unwrap();
        let b = pool.lease().await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(pool.available(), 0);
        assert!(pool.try_lease().is_none());

        drop(a);
        assert_eq!(pool.available(), 1);
        assert!(pool.try_lease().is_some());
    }

    #[tokio::test]
    async fn test_closed_pool() {
        let pool = WorkerPool::new(1);
        pool.close();
        assert!(matches!(pool.lease().await, Err(Error::PoolClosed)));
    }

    #[test]
    fn test_zero_size_is_raised() {
        assert_eq!(WorkerPool::new(0).size(), 1);
    }
}
