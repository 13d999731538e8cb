//! Caller Byte Streams
//!
//! The minimal random-access stream contracts a host hands to the format
//! layer. Positions are absolute byte offsets. Any `Read + Seek` or
//! `Write + Seek` type (files, in-memory cursors) qualifies through the
//! blanket implementations below.
//!
//! Streams are shared as `Arc<Mutex<dyn ...>>`: the caller keeps its own
//! clone and stays responsible for the stream's lifetime. The bridge never
//! closes or drops the caller's stream on its own.

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Readable random-access byte stream.
pub trait InputStream: Send {
    /// Read up to `buffer.len()` bytes, returning the number read (0 at the end).
    fn read(&mut self, buffer: &mut [u8]) -> usize;

    /// Current absolute position, or a negative value when unknown.
    fn position(&mut self) -> i64;

    /// Move to an absolute position. Returns false when the stream refuses.
    fn set_position(&mut self, position: i64) -> bool;

    /// Total length in bytes, when the stream knows it.
    fn total_length(&mut self) -> Option<u64> {
        None
    }

    /// True once the position has reached the known end of the stream.
    fn is_exhausted(&mut self) -> bool {
        match self.total_length() {
            Some(length) => {
                let position = self.position();
                position >= 0 && position as u64 >= length
            }
            None => false,
        }
    }
}

/// Writable random-access byte stream.
pub trait OutputStream: Send {
    /// Write the whole buffer. Returns false if the stream could not accept it.
    fn write(&mut self, data: &[u8]) -> bool;

    /// Current absolute position, or a negative value when unknown.
    fn position(&mut self) -> i64;

    /// Move to an absolute position. Returns false when the stream refuses.
    fn set_position(&mut self, position: i64) -> bool;

    fn flush(&mut self);
}

/// Input stream shared between the caller and the bridge.
pub type SharedInputStream = Arc<Mutex<dyn InputStream>>;

/// Output stream shared between the caller and the bridge.
pub type SharedOutputStream = Arc<Mutex<dyn OutputStream>>;

impl<T> InputStream for T
where
    T: Read + Seek + Send,
{
    fn read(&mut self, buffer: &mut [u8]) -> usize {
        let mut total = 0;
        while total < buffer.len() {
            match Read::read(self, &mut buffer[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        total
    }

    fn position(&mut self) -> i64 {
        self.stream_position().map(|p| p as i64).unwrap_or(-1)
    }

    fn set_position(&mut self, position: i64) -> bool {
        position >= 0 && self.seek(SeekFrom::Start(position as u64)).is_ok()
    }

    fn total_length(&mut self) -> Option<u64> {
        let current = self.stream_position().ok()?;
        let end = self.seek(SeekFrom::End(0)).ok()?;
        self.seek(SeekFrom::Start(current)).ok()?;
        Some(end)
    }
}

impl<T> OutputStream for T
where
    T: Write + Seek + Send,
{
    fn write(&mut self, data: &[u8]) -> bool {
        self.write_all(data).is_ok()
    }

    fn position(&mut self) -> i64 {
        self.stream_position().map(|p| p as i64).unwrap_or(-1)
    }

    fn set_position(&mut self, position: i64) -> bool {
        position >= 0 && self.seek(SeekFrom::Start(position as u64)).is_ok()
    }

    fn flush(&mut self) {
        let _ = Write::flush(self);
    }
}
