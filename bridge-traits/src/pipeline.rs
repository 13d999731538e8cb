//! # Media Pipelines
//!
//! Contracts for the platform's decode and encode pipelines and the platform
//! object that creates them.
//!
//! ## Units
//!
//! All times and durations are in 100-nanosecond units
//! ([`HNS_PER_SECOND`] per second). Audio payloads are interleaved
//! little-endian PCM unless a media type says otherwise.

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::{
    background::WorkQueue,
    byte_stream::ByteStream,
    error::Result,
    platform::{PlatformSend, PlatformSendSync},
};

/// 100-ns ticks per second.
pub const HNS_PER_SECOND: i64 = 10_000_000;

// ============================================================================
// Media Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MajorType {
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSubtype {
    /// Integer PCM.
    Pcm,
    /// IEEE float PCM.
    Float,
    /// AAC elementary stream.
    Aac,
}

/// Description of a stream's payload. Unset fields mean "any" when used to
/// request a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub major: MajorType,
    pub subtype: AudioSubtype,
    pub bits_per_sample: Option<u32>,
    pub samples_per_second: Option<u32>,
    pub num_channels: Option<u32>,
    pub avg_bytes_per_second: Option<u32>,
}

impl MediaType {
    pub fn audio(subtype: AudioSubtype) -> Self {
        Self {
            major: MajorType::Audio,
            subtype,
            bits_per_sample: None,
            samples_per_second: None,
            num_channels: None,
            avg_bytes_per_second: None,
        }
    }

    pub fn with_bits_per_sample(mut self, bits: u32) -> Self {
        self.bits_per_sample = Some(bits);
        self
    }

    pub fn with_samples_per_second(mut self, rate: u32) -> Self {
        self.samples_per_second = Some(rate);
        self
    }

    pub fn with_num_channels(mut self, channels: u32) -> Self {
        self.num_channels = Some(channels);
        self
    }

    pub fn with_avg_bytes_per_second(mut self, bytes: u32) -> Self {
        self.avg_bytes_per_second = Some(bytes);
        self
    }

    /// Bytes per interleaved frame for PCM types with known depth and channels.
    pub fn block_align(&self) -> Option<u32> {
        match self.subtype {
            AudioSubtype::Pcm | AudioSubtype::Float => {
                Some(self.bits_per_sample? / 8 * self.num_channels?)
            }
            AudioSubtype::Aac => None,
        }
    }
}

/// Container requested from a sink pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerType {
    Mpeg4,
    Wave,
}

/// Options used when creating a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineAttributes {
    pub enable_hardware_transforms: bool,
    pub container: Option<ContainerType>,
}

impl Default for PipelineAttributes {
    fn default() -> Self {
        Self {
            enable_hardware_transforms: true,
            container: None,
        }
    }
}

impl PipelineAttributes {
    pub fn with_hardware_transforms(mut self, enable: bool) -> Self {
        self.enable_hardware_transforms = enable;
        self
    }

    pub fn with_container(mut self, container: ContainerType) -> Self {
        self.container = Some(container);
        self
    }
}

// ============================================================================
// Samples & Buffers
// ============================================================================

/// Contiguous payload buffer. The allocation is rounded up to `alignment`,
/// and the current length marks how many bytes are valid.
#[derive(Debug, Clone)]
pub struct MediaBuffer {
    data: BytesMut,
    current_length: usize,
    alignment: usize,
}

impl MediaBuffer {
    /// Zeroed buffer of `max_length` bytes, allocation padded to `alignment`.
    pub fn aligned(max_length: usize, alignment: usize) -> Self {
        let alignment = alignment.max(1);
        let padded = max_length.div_ceil(alignment) * alignment;
        let mut data = BytesMut::zeroed(padded);
        data.truncate(max_length);
        Self {
            data,
            current_length: 0,
            alignment,
        }
    }

    /// Buffer holding `bytes`, all of them valid.
    pub fn from_bytes(bytes: impl Into<BytesMut>) -> Self {
        let data = bytes.into();
        let current_length = data.len();
        Self {
            data,
            current_length,
            alignment: 1,
        }
    }

    pub fn max_length(&self) -> usize {
        self.data.len()
    }

    pub fn current_length(&self) -> usize {
        self.current_length
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn set_current_length(&mut self, length: usize) -> Result<()> {
        if length > self.data.len() {
            return Err(crate::error::BridgeError::InvalidArgument(format!(
                "buffer length {} exceeds capacity {}",
                length,
                self.data.len()
            )));
        }
        self.current_length = length;
        Ok(())
    }

    /// The whole writable region.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.current_length]
    }
}

/// One timestamped unit of media data made of one or more buffers.
#[derive(Debug, Clone, Default)]
pub struct MediaSample {
    buffers: Vec<MediaBuffer>,
    time: Option<i64>,
    duration: Option<i64>,
}

impl MediaSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_buffer(&mut self, buffer: MediaBuffer) {
        self.buffers.push(buffer);
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn set_sample_time(&mut self, time: i64) {
        self.time = Some(time);
    }

    pub fn sample_time(&self) -> Option<i64> {
        self.time
    }

    pub fn set_sample_duration(&mut self, duration: i64) {
        self.duration = Some(duration);
    }

    pub fn sample_duration(&self) -> Option<i64> {
        self.duration
    }

    pub fn total_length(&self) -> usize {
        self.buffers.iter().map(MediaBuffer::current_length).sum()
    }

    /// Valid bytes of every buffer, concatenated.
    pub fn to_contiguous_buffer(&self) -> Bytes {
        match self.buffers.as_slice() {
            [single] => Bytes::copy_from_slice(single.as_slice()),
            buffers => {
                let mut out = BytesMut::with_capacity(self.total_length());
                for buffer in buffers {
                    out.extend_from_slice(buffer.as_slice());
                }
                out.freeze()
            }
        }
    }
}

// ============================================================================
// Decode Pipeline
// ============================================================================

/// Status bits attached to each [`DecodePipeline::read_sample`] outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ReadFlags(u32);

impl ReadFlags {
    pub const NONE: Self = Self(0);
    pub const ERROR: Self = Self(0x1);
    pub const END_OF_STREAM: Self = Self(0x2);
    pub const NEW_STREAM: Self = Self(0x4);
    pub const NATIVE_MEDIA_TYPE_CHANGED: Self = Self(0x10);
    pub const CURRENT_MEDIA_TYPE_CHANGED: Self = Self(0x20);
    pub const ALL_EFFECTS_REMOVED: Self = Self(0x200);
    pub const STREAM_TICK: Self = Self(0x100);

    /// Flags that end a read loop.
    pub const STOP_READING: Self = Self(
        Self::ERROR.0
            | Self::END_OF_STREAM.0
            | Self::NEW_STREAM.0
            | Self::NATIVE_MEDIA_TYPE_CHANGED.0
            | Self::CURRENT_MEDIA_TYPE_CHANGED.0
            | Self::STREAM_TICK.0,
    );

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for ReadFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Result of one [`DecodePipeline::read_sample`] call.
#[derive(Debug, Clone, Default)]
pub struct ReadOutcome {
    pub flags: ReadFlags,
    /// Presentation time of `sample`, in 100 ns units.
    pub timestamp: Option<i64>,
    /// May be absent even without flags (gap or tick).
    pub sample: Option<MediaSample>,
}

impl ReadOutcome {
    pub fn sample(timestamp: i64, sample: MediaSample) -> Self {
        Self {
            flags: ReadFlags::NONE,
            timestamp: Some(timestamp),
            sample: Some(sample),
        }
    }

    pub fn flagged(flags: ReadFlags) -> Self {
        Self {
            flags,
            timestamp: None,
            sample: None,
        }
    }
}

/// Which stream an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelector {
    FirstAudio,
    AllStreams,
    Index(u32),
}

/// Platform decoder reading from a [`ByteStream`].
pub trait DecodePipeline: PlatformSend {
    fn set_stream_selection(&mut self, stream: StreamSelector, selected: bool) -> Result<()>;

    /// Request the format decoded samples are delivered in.
    fn set_current_media_type(&mut self, stream: StreamSelector, media_type: &MediaType)
        -> Result<()>;

    fn current_media_type(&self, stream: StreamSelector) -> Result<MediaType>;

    /// Presentation duration in 100 ns units.
    fn duration(&self) -> Result<u64>;

    fn read_sample(&mut self, stream: StreamSelector) -> Result<ReadOutcome>;

    /// Reposition to a presentation time in 100 ns units.
    fn set_current_position(&mut self, position: i64) -> Result<()>;

    /// Stop the pipeline; later calls fail.
    fn shutdown(&mut self) -> Result<()>;
}

// ============================================================================
// Encode Pipeline
// ============================================================================

/// Platform encoder/muxer writing to a [`ByteStream`].
///
/// Streams are configured with `add_stream` and `set_input_media_type`
/// before `begin_writing`; samples are accepted only in between
/// `begin_writing` and `finalize`.
pub trait EncodePipeline: PlatformSend {
    /// Add an output stream and return its index.
    fn add_stream(&mut self, output_type: &MediaType) -> Result<u32>;

    fn set_input_media_type(&mut self, stream_index: u32, input_type: &MediaType) -> Result<()>;

    fn begin_writing(&mut self) -> Result<()>;

    fn write_sample(&mut self, stream_index: u32, sample: &MediaSample) -> Result<()>;

    fn flush(&mut self, stream_index: u32) -> Result<()>;

    /// Complete the container. No samples are accepted afterwards.
    fn finalize(&mut self) -> Result<()>;
}

// ============================================================================
// Platform
// ============================================================================

/// Scoped platform initialisation. Dropping the guard releases it.
pub struct PlatformSession {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl PlatformSession {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Session with nothing to release.
    pub fn detached() -> Self {
        Self { release: None }
    }
}

impl Drop for PlatformSession {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for PlatformSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformSession")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Media platform: initialisation, work queue and pipeline factories.
pub trait MediaPlatform: PlatformSendSync {
    /// Initialise the platform for one reader or writer.
    fn startup(&self) -> Result<PlatformSession>;

    /// Multi-threaded queue used for asynchronous stream completions.
    fn work_queue(&self) -> Arc<dyn WorkQueue>;

    fn create_source_reader(
        &self,
        stream: Arc<dyn ByteStream>,
        attributes: &PipelineAttributes,
    ) -> Result<Box<dyn DecodePipeline>>;

    fn create_sink_writer(
        &self,
        stream: Arc<dyn ByteStream>,
        attributes: &PipelineAttributes,
    ) -> Result<Box<dyn EncodePipeline>>;
}
