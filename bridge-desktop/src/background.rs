//! Work Queue Implementation

use std::sync::Arc;

use bridge_traits::{
    background::WorkQueue,
    byte_stream::{AsyncCallback, AsyncResult, AsyncState},
    error::{BridgeError, Result},
};
use tracing::{trace, warn};

/// Work queue running completions on a rayon thread pool.
///
/// The default queue shares rayon's global pool; [`with_num_threads`]
/// builds a dedicated one. Work items put from a worker of the queue's own
/// pool run inline on that worker: callers block on their completion, and a
/// saturated pool would otherwise never schedule it.
///
/// [`with_num_threads`]: RayonWorkQueue::with_num_threads
#[derive(Clone, Default)]
pub struct RayonWorkQueue {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl RayonWorkQueue {
    /// Queue backed by rayon's global pool.
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Queue backed by a dedicated pool of `num_threads` workers.
    pub fn with_num_threads(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("media-work-{}", index))
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("work queue pool: {}", e)))?;
        Ok(Self::from_pool(Arc::new(pool)))
    }

    /// Queue sharing a pool the host already runs work on.
    pub fn from_pool(pool: Arc<rayon::ThreadPool>) -> Self {
        Self { pool: Some(pool) }
    }

    /// True when the calling thread is a worker of this queue's pool.
    fn on_worker_thread(&self) -> bool {
        match &self.pool {
            Some(pool) => pool.current_thread_index().is_some(),
            None => rayon::current_thread_index().is_some(),
        }
    }

    fn spawn<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.on_worker_thread() {
            trace!("Running work item inline on pool worker");
            work();
            return;
        }
        match &self.pool {
            Some(pool) => pool.spawn(work),
            None => rayon::spawn(work),
        }
    }
}

impl WorkQueue for RayonWorkQueue {
    fn put_work_item(&self, callback: Arc<dyn AsyncCallback>, state: AsyncState) -> Result<()> {
        let parameters = callback.parameters();
        trace!(blocking = parameters.blocking, queue = ?parameters.queue, "Queued work item");

        let result = AsyncResult::new(None, Some(Arc::clone(&callback)), Some(state));
        self.spawn(move || {
            if let Err(e) = callback.invoke(result) {
                warn!(error = %e, "Work item callback failed");
            }
        });
        Ok(())
    }

    fn worker_count(&self) -> Option<usize> {
        Some(match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        })
    }
}
