//! Background Work Queues
//!
//! Dispatch of asynchronous completions onto platform worker threads.

use std::sync::Arc;

use crate::{
    byte_stream::{AsyncCallback, AsyncResult, AsyncState},
    error::Result,
    platform::PlatformSendSync,
};

/// Platform work queue.
///
/// `put_work_item` wraps `state` in a fresh [`AsyncResult`] whose callback is
/// `callback`, and invokes the callback with it on a worker thread. The call
/// returns without waiting for the callback.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::WorkQueue;
///
/// fn dispatch(queue: &dyn WorkQueue, stream: Arc<dyn AsyncCallback>, caller_result: Arc<AsyncResult>) -> Result<()> {
///     // the stream's `invoke` receives a result whose state is `caller_result`
///     queue.put_work_item(stream, caller_result)
/// }
/// ```
pub trait WorkQueue: PlatformSendSync {
    fn put_work_item(&self, callback: Arc<dyn AsyncCallback>, state: AsyncState) -> Result<()>;

    /// Number of worker threads, when known.
    fn worker_count(&self) -> Option<usize> {
        None
    }
}

/// Runs every work item on the calling thread before returning.
///
/// Useful for deterministic tests and single-threaded hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineWorkQueue;

impl WorkQueue for InlineWorkQueue {
    fn put_work_item(&self, callback: Arc<dyn AsyncCallback>, state: AsyncState) -> Result<()> {
        let result = AsyncResult::new(None, Some(Arc::clone(&callback)), Some(state));
        callback.invoke(result)
    }

    fn worker_count(&self) -> Option<usize> {
        Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingCallback {
        states: Mutex<Vec<String>>,
    }

    impl AsyncCallback for RecordingCallback {
        fn invoke(&self, result: Arc<AsyncResult>) -> Result<()> {
            let state = result.state_as::<String>().expect("string state");
            self.states.lock().push(state.as_ref().clone());
            Ok(())
        }
    }

    #[test]
    fn test_inline_queue_invokes_before_returning() {
        let callback = Arc::new(RecordingCallback::default());
        let queue = InlineWorkQueue;

        queue
            .put_work_item(callback.clone(), Arc::new(String::from("first")))
            .unwrap();
        queue
            .put_work_item(callback.clone(), Arc::new(String::from("second")))
            .unwrap();

        assert_eq!(*callback.states.lock(), vec!["first", "second"]);
    }
}
