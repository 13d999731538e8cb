//! std::io views of platform byte streams.
//!
//! Symphonia pulls from a `Read + Seek` source and hound pushes into a
//! `Write + Seek` sink; these adapters put a [`ByteStream`] behind each.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use bridge_traits::{
    byte_stream::{AsyncCallback, AsyncResult, ByteStream, ByteStreamCapabilities, SeekOrigin},
    error::{BridgeError, Result},
};
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use symphonia::core::io::MediaSource;
use tracing::trace;

fn to_io_error(error: BridgeError) -> io::Error {
    match error {
        BridgeError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

fn seek_stream(stream: &dyn ByteStream, position: SeekFrom) -> Result<u64> {
    match position {
        SeekFrom::Start(offset) => {
            let offset = i64::try_from(offset)
                .map_err(|_| BridgeError::InvalidArgument(format!("seek offset {}", offset)))?;
            stream.seek(SeekOrigin::Begin, offset)
        }
        SeekFrom::Current(offset) => stream.seek(SeekOrigin::Current, offset),
        SeekFrom::End(offset) => {
            let length = i64::try_from(stream.length()?)
                .map_err(|_| BridgeError::InvalidArgument("stream length".to_string()))?;
            stream.seek(SeekOrigin::Begin, length.saturating_add(offset))
        }
    }
}

// ============================================================================
// Read side
// ============================================================================

/// Media source pulling from a readable [`ByteStream`].
pub struct ByteStreamSource {
    stream: Arc<dyn ByteStream>,
}

impl ByteStreamSource {
    pub fn new(stream: Arc<dyn ByteStream>) -> Self {
        Self { stream }
    }
}

impl Read for ByteStreamSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).map_err(to_io_error)
    }
}

impl Seek for ByteStreamSource {
    fn seek(&mut self, position: SeekFrom) -> io::Result<u64> {
        seek_stream(self.stream.as_ref(), position).map_err(to_io_error)
    }
}

impl MediaSource for ByteStreamSource {
    fn is_seekable(&self) -> bool {
        self.stream
            .capabilities()
            .contains(ByteStreamCapabilities::SEEKABLE)
    }

    fn byte_len(&self) -> Option<u64> {
        self.stream.length().ok()
    }
}

// ============================================================================
// Write side
// ============================================================================

/// Signals the end of one asynchronous write.
#[derive(Default)]
struct CompletionLatch {
    done: Mutex<bool>,
    signal: Condvar,
}

impl CompletionLatch {
    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.signal.wait(&mut done);
        }
    }
}

impl AsyncCallback for CompletionLatch {
    fn invoke(&self, _result: Arc<AsyncResult>) -> Result<()> {
        *self.done.lock() = true;
        self.signal.notify_all();
        Ok(())
    }
}

/// Sink pushing into a writable [`ByteStream`].
///
/// Each write goes through the stream's asynchronous path and waits for its
/// completion, so at most one write is in flight. Streams without an
/// asynchronous path are written synchronously.
pub struct ByteStreamWriter {
    stream: Arc<dyn ByteStream>,
}

impl ByteStreamWriter {
    pub fn new(stream: Arc<dyn ByteStream>) -> Self {
        Self { stream }
    }

    fn write_async(&self, data: &[u8]) -> Result<usize> {
        let latch = Arc::new(CompletionLatch::default());
        let result = self.stream.begin_write(
            Bytes::copy_from_slice(data),
            Arc::clone(&latch) as Arc<dyn AsyncCallback>,
            None,
        )?;
        latch.wait();
        self.stream.end_write(&result)
    }
}

impl Write for ByteStreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let written = match self.write_async(buf) {
            Err(e) if e.is_not_implemented() => self.stream.write(buf),
            other => other,
        }
        .map_err(to_io_error)?;
        trace!(bytes = written, "Sink write");
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush().map_err(to_io_error)
    }
}

impl Seek for ByteStreamWriter {
    fn seek(&mut self, position: SeekFrom) -> io::Result<u64> {
        seek_stream(self.stream.as_ref(), position).map_err(to_io_error)
    }
}
