//! # Platform Byte Streams
//!
//! The byte-stream interface a media platform consumes: random access,
//! shared ownership, attribute bags and asynchronous I/O with completion
//! callbacks.
//!
//! ## Async Protocol
//!
//! `begin_*` returns immediately with an [`AsyncResult`] that carries the
//! caller's callback and state. The stream finishes the operation on a
//! platform work queue, records the status on that result and invokes the
//! caller's callback, which then calls the matching `end_*` to collect the
//! outcome:
//!
//! ```text
//! caller ── begin_write ──▶ stream ── put_work_item ──▶ WorkQueue
//!                                                          │
//! caller ◀── invoke(result) ── stream.invoke (write) ◀─────┘
//! caller ── end_write(result) ──▶ bytes written
//! ```

use std::any::Any;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{attributes::Attributes, error::Result, platform::PlatformSendSync};

// ============================================================================
// Seeking & Capabilities
// ============================================================================

/// Reference point for [`ByteStream::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Offset is absolute.
    Begin,
    /// Offset is relative to the current position.
    Current,
}

/// Capability bits reported by [`ByteStream::capabilities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ByteStreamCapabilities(u32);

impl ByteStreamCapabilities {
    pub const NONE: Self = Self(0);
    pub const READABLE: Self = Self(0x1);
    pub const WRITABLE: Self = Self(0x2);
    pub const SEEKABLE: Self = Self(0x4);
    /// Bytes travel over a network.
    pub const REMOTE: Self = Self(0x8);
    /// Seeking is possible but expensive.
    pub const HAS_SLOW_SEEK: Self = Self(0x100);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ByteStreamCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ============================================================================
// Async Results & Callbacks
// ============================================================================

/// Opaque object carried by an [`AsyncResult`].
pub type AsyncObject = Arc<dyn Any + Send + Sync>;

/// Caller-supplied state carried by an [`AsyncResult`].
pub type AsyncState = Arc<dyn Any + Send + Sync>;

/// Work queue a callback asks to be dispatched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkQueueId {
    #[default]
    Standard,
    MultiThreaded,
}

/// Dispatch hints returned by [`AsyncCallback::parameters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallbackParameters {
    /// The callback may block (network I/O).
    pub blocking: bool,
    pub queue: WorkQueueId,
}

/// Completion state of an asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CompletionStatus {
    #[default]
    Pending,
    Succeeded,
    Failed(String),
}

/// Receiver of asynchronous completions.
pub trait AsyncCallback: PlatformSendSync {
    fn parameters(&self) -> CallbackParameters {
        CallbackParameters::default()
    }

    fn invoke(&self, result: Arc<AsyncResult>) -> Result<()>;
}

/// Handle for one asynchronous operation.
pub struct AsyncResult {
    object: Option<AsyncObject>,
    callback: Option<Arc<dyn AsyncCallback>>,
    state: Option<AsyncState>,
    status: Mutex<CompletionStatus>,
}

impl AsyncResult {
    pub fn new(
        object: Option<AsyncObject>,
        callback: Option<Arc<dyn AsyncCallback>>,
        state: Option<AsyncState>,
    ) -> Arc<Self> {
        Arc::new(Self {
            object,
            callback,
            state,
            status: Mutex::new(CompletionStatus::Pending),
        })
    }

    pub fn object(&self) -> Option<&AsyncObject> {
        self.object.as_ref()
    }

    /// The carried object, if it is a `T`.
    pub fn object_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.object.clone()?.downcast::<T>().ok()
    }

    pub fn state(&self) -> Option<&AsyncState> {
        self.state.as_ref()
    }

    /// The caller state, if it is a `T`.
    pub fn state_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.state.clone()?.downcast::<T>().ok()
    }

    pub fn callback(&self) -> Option<&Arc<dyn AsyncCallback>> {
        self.callback.as_ref()
    }

    pub fn status(&self) -> CompletionStatus {
        self.status.lock().clone()
    }

    pub fn set_status(&self, status: CompletionStatus) {
        *self.status.lock() = status;
    }

    /// Hand this result to its callback. A result without callback is a no-op.
    pub fn invoke_callback(self: &Arc<Self>) -> Result<()> {
        match &self.callback {
            Some(callback) => callback.invoke(Arc::clone(self)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for AsyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResult")
            .field("has_object", &self.object.is_some())
            .field("has_callback", &self.callback.is_some())
            .field("has_state", &self.state.is_some())
            .field("status", &*self.status.lock())
            .finish()
    }
}

// ============================================================================
// Byte Stream
// ============================================================================

/// Random-access byte stream consumed by decode and encode pipelines.
///
/// Positions and lengths are byte offsets. Implementations are shared as
/// `Arc<dyn ByteStream>` between the caller, the pipeline and the work queue.
/// Operations a stream does not support fail with
/// [`BridgeError::NotImplemented`](crate::error::BridgeError::NotImplemented).
pub trait ByteStream: PlatformSendSync {
    fn capabilities(&self) -> ByteStreamCapabilities;

    /// Property bag of this stream.
    fn attributes(&self) -> &dyn Attributes;

    fn length(&self) -> Result<u64>;

    fn set_length(&self, length: u64) -> Result<()>;

    fn current_position(&self) -> Result<u64>;

    fn set_current_position(&self, position: u64) -> Result<()>;

    fn is_end_of_stream(&self) -> Result<bool>;

    fn read(&self, buffer: &mut [u8]) -> Result<usize>;

    fn begin_read(
        &self,
        length: usize,
        callback: Arc<dyn AsyncCallback>,
        state: Option<AsyncState>,
    ) -> Result<Arc<AsyncResult>>;

    fn end_read(&self, result: &AsyncResult) -> Result<Bytes>;

    /// Write the whole buffer, returning the number of bytes accepted.
    fn write(&self, data: &[u8]) -> Result<usize>;

    fn begin_write(
        &self,
        data: Bytes,
        callback: Arc<dyn AsyncCallback>,
        state: Option<AsyncState>,
    ) -> Result<Arc<AsyncResult>>;

    fn end_write(&self, result: &AsyncResult) -> Result<usize>;

    /// Move the position and return the new absolute position.
    fn seek(&self, origin: SeekOrigin, offset: i64) -> Result<u64>;

    fn flush(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    /// The stream's own completion callback, for streams that run their
    /// async work on a platform queue.
    fn as_async_callback(&self) -> Option<&dyn AsyncCallback> {
        None
    }
}
