use std::sync::Arc;

use bridge_traits::{
    attributes::Attributes,
    byte_stream::{AsyncCallback, AsyncResult, AsyncState, ByteStream, ByteStreamCapabilities, SeekOrigin},
    error::{BridgeError, Result},
    stream::SharedInputStream,
};
use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::{not_implemented, StreamAttributes, StreamDescriptor};

/// Read-only platform byte stream over a caller [`InputStream`](bridge_traits::InputStream).
///
/// Reads are synchronous; the asynchronous read path is not offered.
pub struct InputByteStream {
    input: SharedInputStream,
    attributes: StreamAttributes,
    is_remote: bool,
}

impl InputByteStream {
    pub fn new(input: SharedInputStream, descriptor: &StreamDescriptor) -> Arc<Self> {
        debug!(
            content_type = ?descriptor.content_type,
            origin = ?descriptor.origin_name,
            remote = descriptor.is_remote,
            "Creating input byte stream"
        );
        Arc::new(Self {
            input,
            attributes: StreamAttributes::new(descriptor),
            is_remote: descriptor.is_remote,
        })
    }

    pub fn is_remote(&self) -> bool {
        self.is_remote
    }
}

impl ByteStream for InputByteStream {
    fn capabilities(&self) -> ByteStreamCapabilities {
        let local = ByteStreamCapabilities::READABLE | ByteStreamCapabilities::SEEKABLE;
        if self.is_remote {
            local | ByteStreamCapabilities::REMOTE | ByteStreamCapabilities::HAS_SLOW_SEEK
        } else {
            local
        }
    }

    fn attributes(&self) -> &dyn Attributes {
        &self.attributes
    }

    fn length(&self) -> Result<u64> {
        self.input
            .lock()
            .total_length()
            .ok_or_else(|| BridgeError::NotAvailable("input stream length is unknown".to_string()))
    }

    fn set_length(&self, _length: u64) -> Result<()> {
        not_implemented("InputByteStream::set_length")
    }

    fn current_position(&self) -> Result<u64> {
        let position = self.input.lock().position();
        u64::try_from(position).map_err(|_| {
            BridgeError::OperationFailed("input stream reports no position".to_string())
        })
    }

    fn set_current_position(&self, position: u64) -> Result<()> {
        let offset = i64::try_from(position)
            .map_err(|_| BridgeError::InvalidArgument(format!("position {}", position)))?;
        self.seek(SeekOrigin::Begin, offset).map(|_| ())
    }

    fn is_end_of_stream(&self) -> Result<bool> {
        Ok(self.input.lock().is_exhausted())
    }

    fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        let read = self.input.lock().read(buffer);
        trace!(requested = buffer.len(), read, "Input stream read");
        Ok(read)
    }

    fn begin_read(
        &self,
        _length: usize,
        _callback: Arc<dyn AsyncCallback>,
        _state: Option<AsyncState>,
    ) -> Result<Arc<AsyncResult>> {
        not_implemented("InputByteStream::begin_read")
    }

    fn end_read(&self, _result: &AsyncResult) -> Result<Bytes> {
        not_implemented("InputByteStream::end_read")
    }

    fn write(&self, _data: &[u8]) -> Result<usize> {
        not_implemented("InputByteStream::write")
    }

    fn begin_write(
        &self,
        _data: Bytes,
        _callback: Arc<dyn AsyncCallback>,
        _state: Option<AsyncState>,
    ) -> Result<Arc<AsyncResult>> {
        not_implemented("InputByteStream::begin_write")
    }

    fn end_write(&self, _result: &AsyncResult) -> Result<usize> {
        not_implemented("InputByteStream::end_write")
    }

    fn seek(&self, origin: SeekOrigin, offset: i64) -> Result<u64> {
        let mut input = self.input.lock();
        let target = match origin {
            SeekOrigin::Begin => offset,
            SeekOrigin::Current => {
                let position = input.position();
                if position < 0 {
                    warn!(offset, "Relative seek on a stream with no position");
                    return Err(BridgeError::SeekFailed { offset });
                }
                position.saturating_add(offset)
            }
        };
        let length = input.total_length();

        if target < 0 || length.is_some_and(|len| target as u64 > len) {
            return Err(BridgeError::SeekOutOfRange {
                offset: target,
                length: length.unwrap_or(0),
            });
        }
        if !input.set_position(target) {
            return Err(BridgeError::SeekFailed { offset: target });
        }
        Ok(target as u64)
    }

    fn flush(&self) -> Result<()> {
        not_implemented("InputByteStream::flush")
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
