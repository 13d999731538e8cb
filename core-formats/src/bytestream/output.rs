use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_traits::{
    attributes::Attributes,
    background::WorkQueue,
    byte_stream::{
        AsyncCallback, AsyncResult, AsyncState, ByteStream, ByteStreamCapabilities,
        CallbackParameters, CompletionStatus, SeekOrigin, WorkQueueId,
    },
    error::{BridgeError, Result},
    stream::SharedOutputStream,
};
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::{not_implemented, StreamAttributes, StreamDescriptor};

/// Payload of one asynchronous write, carried by its [`AsyncResult`].
#[derive(Debug)]
pub struct AsyncWriteRequest {
    data: Bytes,
    written: AtomicBool,
}

impl AsyncWriteRequest {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            written: AtomicBool::new(false),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True once the bytes reached the caller stream.
    pub fn is_written(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }

    fn mark_written(&self) {
        self.written.store(true, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct WriteState {
    /// Sum of every accepted write, overwrites included.
    total_length: u64,
}

/// Caller stream plus the lock that serialises every access to it.
///
/// Shared with the work queue as the completion callback of asynchronous
/// writes.
struct WriteTarget {
    output: SharedOutputStream,
    is_remote: bool,
    state: Mutex<WriteState>,
}

impl WriteTarget {
    fn write(&self, data: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if !self.output.lock().write(data) {
            warn!(bytes = data.len(), "Output stream rejected write");
            return Err(BridgeError::WriteFailed(data.len()));
        }
        state.total_length += data.len() as u64;
        trace!(bytes = data.len(), total = state.total_length, "Output stream write");
        Ok(data.len())
    }

    fn write_request(&self, request: &AsyncWriteRequest) -> Result<usize> {
        let written = self.write(request.data())?;
        request.mark_written();
        Ok(written)
    }
}

impl AsyncCallback for WriteTarget {
    fn parameters(&self) -> CallbackParameters {
        CallbackParameters {
            blocking: self.is_remote,
            queue: WorkQueueId::MultiThreaded,
        }
    }

    fn invoke(&self, result: Arc<AsyncResult>) -> Result<()> {
        let caller_result = result.state_as::<AsyncResult>().ok_or_else(|| {
            error!("Work item carries no caller async result");
            BridgeError::Unexpected("work item carries no caller async result".to_string())
        })?;

        let Some(request) = caller_result.object_as::<AsyncWriteRequest>() else {
            error!("Caller async result carries no write request");
            caller_result.set_status(CompletionStatus::Failed(
                "async result carries no write request".to_string(),
            ));
            caller_result.invoke_callback()?;
            return Err(BridgeError::Unexpected(
                "async result carries no write request".to_string(),
            ));
        };

        match self.write_request(&request) {
            Ok(_) => caller_result.set_status(CompletionStatus::Succeeded),
            Err(e) => caller_result.set_status(CompletionStatus::Failed(e.to_string())),
        }
        caller_result.invoke_callback()
    }
}

/// Writable platform byte stream over a caller [`OutputStream`](bridge_traits::OutputStream).
///
/// Synchronous writes and the completion of asynchronous writes are
/// serialised by one lock; `total_length` only grows, by exactly the size of
/// each accepted write. Seeks are confined to `[0, total_length]`.
pub struct OutputByteStream {
    target: Arc<WriteTarget>,
    attributes: StreamAttributes,
    work_queue: Arc<dyn WorkQueue>,
}

impl OutputByteStream {
    pub fn new(
        output: SharedOutputStream,
        descriptor: &StreamDescriptor,
        work_queue: Arc<dyn WorkQueue>,
    ) -> Arc<Self> {
        debug!(
            content_type = ?descriptor.content_type,
            origin = ?descriptor.origin_name,
            remote = descriptor.is_remote,
            "Creating output byte stream"
        );
        Arc::new(Self {
            target: Arc::new(WriteTarget {
                output,
                is_remote: descriptor.is_remote,
                state: Mutex::new(WriteState::default()),
            }),
            attributes: StreamAttributes::new(descriptor),
            work_queue,
        })
    }

    pub fn is_remote(&self) -> bool {
        self.target.is_remote
    }

    /// Bytes accepted so far.
    pub fn total_length(&self) -> u64 {
        self.target.state.lock().total_length
    }
}

impl ByteStream for OutputByteStream {
    fn capabilities(&self) -> ByteStreamCapabilities {
        let local = ByteStreamCapabilities::WRITABLE | ByteStreamCapabilities::SEEKABLE;
        if self.is_remote() {
            local | ByteStreamCapabilities::REMOTE | ByteStreamCapabilities::HAS_SLOW_SEEK
        } else {
            local
        }
    }

    fn attributes(&self) -> &dyn Attributes {
        &self.attributes
    }

    fn length(&self) -> Result<u64> {
        Ok(self.total_length())
    }

    fn set_length(&self, _length: u64) -> Result<()> {
        not_implemented("OutputByteStream::set_length")
    }

    fn current_position(&self) -> Result<u64> {
        let position = self.target.output.lock().position();
        u64::try_from(position).map_err(|_| {
            BridgeError::OperationFailed("output stream reports no position".to_string())
        })
    }

    fn set_current_position(&self, position: u64) -> Result<()> {
        let offset = i64::try_from(position)
            .map_err(|_| BridgeError::InvalidArgument(format!("position {}", position)))?;
        self.seek(SeekOrigin::Begin, offset).map(|_| ())
    }

    fn is_end_of_stream(&self) -> Result<bool> {
        let state = self.target.state.lock();
        let position = self.target.output.lock().position();
        Ok(position >= 0 && position as u64 == state.total_length)
    }

    fn read(&self, _buffer: &mut [u8]) -> Result<usize> {
        not_implemented("OutputByteStream::read")
    }

    fn begin_read(
        &self,
        _length: usize,
        _callback: Arc<dyn AsyncCallback>,
        _state: Option<AsyncState>,
    ) -> Result<Arc<AsyncResult>> {
        not_implemented("OutputByteStream::begin_read")
    }

    fn end_read(&self, _result: &AsyncResult) -> Result<Bytes> {
        not_implemented("OutputByteStream::end_read")
    }

    fn write(&self, data: &[u8]) -> Result<usize> {
        self.target.write(data)
    }

    fn begin_write(
        &self,
        data: Bytes,
        callback: Arc<dyn AsyncCallback>,
        state: Option<AsyncState>,
    ) -> Result<Arc<AsyncResult>> {
        let bytes = data.len();
        let request = Arc::new(AsyncWriteRequest::new(data));
        let result = AsyncResult::new(Some(request), Some(callback), state);

        self.work_queue
            .put_work_item(self.target.clone(), result.clone())?;
        trace!(bytes, "Queued asynchronous write");
        Ok(result)
    }

    fn end_write(&self, result: &AsyncResult) -> Result<usize> {
        if let CompletionStatus::Failed(reason) = result.status() {
            return Err(BridgeError::OperationFailed(reason));
        }
        let request = result.object_as::<AsyncWriteRequest>().ok_or_else(|| {
            BridgeError::Unexpected("async result carries no write request".to_string())
        })?;
        if !request.is_written() {
            return Err(BridgeError::Unexpected(
                "asynchronous write has not completed".to_string(),
            ));
        }
        Ok(request.len())
    }

    fn seek(&self, origin: SeekOrigin, offset: i64) -> Result<u64> {
        let state = self.target.state.lock();
        let mut output = self.target.output.lock();
        let target = match origin {
            SeekOrigin::Begin => offset,
            SeekOrigin::Current => {
                let position = output.position();
                if position < 0 {
                    warn!(offset, "Relative seek on a stream with no position");
                    return Err(BridgeError::SeekFailed { offset });
                }
                position.saturating_add(offset)
            }
        };

        if target < 0 || target as u64 > state.total_length {
            return Err(BridgeError::SeekOutOfRange {
                offset: target,
                length: state.total_length,
            });
        }
        if !output.set_position(target) {
            return Err(BridgeError::SeekFailed { offset: target });
        }
        Ok(target as u64)
    }

    fn flush(&self) -> Result<()> {
        let _state = self.target.state.lock();
        self.target.output.lock().flush();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let _state = self.target.state.lock();
        if !self.target.output.lock().set_position(0) {
            return Err(BridgeError::SeekFailed { offset: 0 });
        }
        Ok(())
    }

    fn as_async_callback(&self) -> Option<&dyn AsyncCallback> {
        Some(self.target.as_ref())
    }
}
