//! # Sample Conversion
//!
//! Turns decoded Symphonia buffers into interleaved 32-bit little-endian PCM.

use bytes::{BufMut, BytesMut};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};

/// Interleave `decoded` as signed 32-bit samples, dropping the first
/// `skip_frames` frames.
///
/// Every source sample format is rescaled to the full `i32` range.
pub fn interleave_to_le_bytes(decoded: AudioBufferRef<'_>, skip_frames: usize) -> BytesMut {
    let channels = decoded.spec().channels.count();
    let frames = decoded.frames();
    if skip_frames >= frames {
        return BytesMut::new();
    }

    let mut samples = SampleBuffer::<i32>::new(decoded.capacity() as u64, *decoded.spec());
    samples.copy_interleaved_ref(decoded);

    let kept = &samples.samples()[skip_frames * channels..frames * channels];
    let mut out = BytesMut::with_capacity(kept.len() * 4);
    for sample in kept {
        out.put_i32_le(*sample);
    }
    out
}
