//! # MP4 Audio Reader
//!
//! Random-access sample reader over a platform decode pipeline.
//!
//! ## Buffering
//!
//! The pipeline delivers variable-sized chunks of interleaved 32-bit PCM.
//! The reader keeps the most recent chunk and a cursor into it, so
//! sequential reads that end mid-chunk continue from the held bytes instead
//! of decoding again:
//!
//! ```text
//!            buffer_offset
//!                 │◀── buffer_num_samples ──▶│
//! chunk: [ consumed | remaining frames        ]
//!                 ▲
//!          current_sample_in_file
//! ```
//!
//! A request that does not start at `current_sample_in_file` seeks the
//! pipeline and discards the held chunk.

use bridge_traits::{
    pipeline::{
        AudioSubtype, DecodePipeline, MediaPlatform, MediaType, PipelineAttributes,
        PlatformSession, ReadFlags, StreamSelector, HNS_PER_SECOND,
    },
    stream::SharedInputStream,
};
use bytes::Bytes;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    bytestream::{InputByteStream, StreamDescriptor},
    error::{FormatError, Result},
    format::{MP4_FORMAT_NAME, READER_BITS_PER_SAMPLE, SUPPORTED_SAMPLE_RATES},
    traits::{AudioFormatReader, ChannelLayout},
};

const BYTES_PER_DECODED_SAMPLE: usize = 4;

/// Reader for MP4/AAC audio, decoded by the platform to 32-bit integer PCM.
///
/// Construction never fails outright: a reader whose pipeline could not be
/// set up reports zero sample rate, depth, length and channels, keeps the
/// cause in [`construction_error`](Self::construction_error) and fails every
/// read.
pub struct Mp4AudioReader {
    pipeline: Option<Box<dyn DecodePipeline>>,
    buffer: Bytes,
    buffer_offset: usize,
    buffer_num_samples: usize,
    current_sample_in_file: i64,
    read_result: ReadFlags,
    sample_rate: u32,
    bits_per_sample: u32,
    length_in_samples: i64,
    num_channels: u32,
    construction_error: Option<FormatError>,
    session: Option<PlatformSession>,
}

impl Mp4AudioReader {
    #[instrument(skip(stream, platform, attributes))]
    pub fn new(
        stream: SharedInputStream,
        platform: &dyn MediaPlatform,
        descriptor: &StreamDescriptor,
        attributes: &PipelineAttributes,
    ) -> Self {
        let mut reader = Self::failed();

        match platform.startup() {
            Ok(session) => reader.session = Some(session),
            Err(e) => {
                error!(error = %e, "Failed to start media platform");
                reader.construction_error = Some(e.into());
                return reader;
            }
        }

        if let Err(e) = reader.open(stream, platform, descriptor, attributes) {
            error!(error = %e, "Failed to open MP4 reader");
            reader.reset_format();
            reader.construction_error = Some(e);
        }
        reader
    }

    fn failed() -> Self {
        Self {
            pipeline: None,
            buffer: Bytes::new(),
            buffer_offset: 0,
            buffer_num_samples: 0,
            current_sample_in_file: 0,
            read_result: ReadFlags::ERROR,
            sample_rate: 0,
            bits_per_sample: 0,
            length_in_samples: 0,
            num_channels: 0,
            construction_error: None,
            session: None,
        }
    }

    fn open(
        &mut self,
        stream: SharedInputStream,
        platform: &dyn MediaPlatform,
        descriptor: &StreamDescriptor,
        attributes: &PipelineAttributes,
    ) -> Result<()> {
        let byte_stream = InputByteStream::new(stream, descriptor);
        let mut pipeline = platform.create_source_reader(byte_stream, attributes)?;

        pipeline.set_stream_selection(StreamSelector::AllStreams, false)?;
        pipeline.set_stream_selection(StreamSelector::FirstAudio, true)?;

        let requested = MediaType::audio(AudioSubtype::Pcm).with_bits_per_sample(READER_BITS_PER_SAMPLE);
        pipeline.set_current_media_type(StreamSelector::FirstAudio, &requested)?;

        let actual = pipeline.current_media_type(StreamSelector::FirstAudio)?;
        let bits_per_sample = actual.bits_per_sample.unwrap_or(0);
        if actual.subtype != AudioSubtype::Pcm || bits_per_sample != READER_BITS_PER_SAMPLE {
            return Err(FormatError::UnsupportedBitDepth(bits_per_sample));
        }
        let sample_rate = actual.samples_per_second.unwrap_or(0);
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
            return Err(FormatError::UnsupportedSampleRate(sample_rate));
        }
        let num_channels = actual.num_channels.unwrap_or(0);
        if num_channels == 0 {
            return Err(FormatError::UnsupportedChannelCount(0));
        }

        let duration = pipeline.duration()?;
        let length_in_samples = (duration as f64 * 1e-7 * f64::from(sample_rate)) as i64;

        info!(
            sample_rate,
            num_channels, length_in_samples, "Opened MP4 reader"
        );

        self.pipeline = Some(pipeline);
        self.sample_rate = sample_rate;
        self.bits_per_sample = bits_per_sample;
        self.num_channels = num_channels;
        self.length_in_samples = length_in_samples;
        self.read_result = ReadFlags::NONE;
        Ok(())
    }

    fn reset_format(&mut self) {
        self.pipeline = None;
        self.release_buffer();
        self.sample_rate = 0;
        self.bits_per_sample = 0;
        self.length_in_samples = 0;
        self.num_channels = 0;
        self.read_result = ReadFlags::ERROR;
    }

    /// True when the pipeline is set up.
    pub fn is_open(&self) -> bool {
        self.pipeline.is_some()
    }

    /// True when the reader describes decodable audio.
    pub fn is_valid(&self) -> bool {
        self.is_open()
            && self.bits_per_sample == READER_BITS_PER_SAMPLE
            && self.sample_rate > 0
            && self.num_channels > 0
            && self.length_in_samples > 0
    }

    pub fn construction_error(&self) -> Option<&FormatError> {
        self.construction_error.as_ref()
    }

    pub fn take_construction_error(&mut self) -> Option<FormatError> {
        self.construction_error.take()
    }

    /// Next sample index the pipeline will deliver without seeking.
    pub fn current_sample_in_file(&self) -> i64 {
        self.current_sample_in_file
    }

    /// Frames still held from the last decoded chunk.
    pub fn buffered_samples(&self) -> usize {
        self.buffer_num_samples
    }

    fn frame_bytes(&self) -> usize {
        self.num_channels as usize * BYTES_PER_DECODED_SAMPLE
    }

    fn release_buffer(&mut self) {
        self.buffer = Bytes::new();
        self.buffer_offset = 0;
        self.buffer_num_samples = 0;
    }

    /// Copy `count` frames from the held chunk into `dest` at `dest_offset`.
    fn copy_from_buffer(&mut self, dest: &mut [&mut [i32]], dest_offset: usize, count: usize) {
        let channels = self.num_channels as usize;
        let frame_bytes = self.frame_bytes();
        let bytes = &self.buffer[self.buffer_offset..];

        for (channel, out) in dest.iter_mut().enumerate() {
            let out = &mut out[dest_offset..dest_offset + count];
            if channel >= channels {
                out.fill(0);
                continue;
            }
            for (frame, slot) in out.iter_mut().enumerate() {
                let at = frame * frame_bytes + channel * BYTES_PER_DECODED_SAMPLE;
                *slot = i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
            }
        }

        self.buffer_offset += count * frame_bytes;
        self.buffer_num_samples -= count;
        self.current_sample_in_file += count as i64;
    }

    fn fail_read(&mut self, dest: &mut [&mut [i32]], offset: usize, count: usize) {
        zero_fill(dest, offset, count);
        self.release_buffer();
        self.read_result = ReadFlags::ERROR;
    }
}

fn zero_fill(dest: &mut [&mut [i32]], offset: usize, count: usize) {
    for channel in dest.iter_mut() {
        channel[offset..offset + count].fill(0);
    }
}

/// Zero the requested region if it runs past `length`, returning how many
/// frames are actually available.
fn clamp_to_available(
    dest: &mut [&mut [i32]],
    offset: usize,
    start_sample: i64,
    num_samples: usize,
    length: i64,
) -> usize {
    let available = length - start_sample;
    if available < num_samples as i64 {
        zero_fill(dest, offset, num_samples);
        return available.max(0) as usize;
    }
    num_samples
}

impl AudioFormatReader for Mp4AudioReader {
    fn format_name(&self) -> &str {
        MP4_FORMAT_NAME
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    fn length_in_samples(&self) -> i64 {
        self.length_in_samples
    }

    fn num_channels(&self) -> u32 {
        self.num_channels
    }

    fn uses_floating_point_data(&self) -> bool {
        false
    }

    fn channel_layout(&self) -> Option<ChannelLayout> {
        ChannelLayout::from_channel_count(self.num_channels)
    }

    fn read_samples(
        &mut self,
        dest: &mut [&mut [i32]],
        start_offset_in_dest: usize,
        start_sample_in_file: i64,
        num_samples: usize,
    ) -> Result<()> {
        let end = start_offset_in_dest + num_samples;
        if let Some(short) = dest.iter().position(|channel| channel.len() < end) {
            return Err(FormatError::InvalidBuffer(format!(
                "channel {} holds {} samples, {} needed",
                short,
                dest[short].len(),
                end
            )));
        }

        if self.pipeline.is_none() {
            zero_fill(dest, start_offset_in_dest, num_samples);
            return Err(FormatError::NotOpen("reader"));
        }
        if self
            .read_result
            .difference(ReadFlags::END_OF_STREAM)
            .intersects(ReadFlags::STOP_READING)
        {
            zero_fill(dest, start_offset_in_dest, num_samples);
            return Err(FormatError::ReaderFailed);
        }

        let mut offset = start_offset_in_dest;
        let mut start = start_sample_in_file;
        let mut remaining = num_samples;

        if start < 0 {
            let lead = remaining.min(start.unsigned_abs().min(usize::MAX as u64) as usize);
            zero_fill(dest, offset, lead);
            offset += lead;
            remaining -= lead;
            start += lead as i64;
        }

        remaining = clamp_to_available(dest, offset, start, remaining, self.length_in_samples);
        if remaining == 0 {
            return Ok(());
        }

        if self.current_sample_in_file != start {
            let position = (start as f64 * HNS_PER_SECOND as f64 / f64::from(self.sample_rate)) as i64;
            self.release_buffer();
            let seeked = match self.pipeline.as_mut() {
                Some(pipeline) => pipeline.set_current_position(position),
                None => return Err(FormatError::NotOpen("reader")),
            };
            if let Err(e) = seeked {
                error!(error = %e, start, "Decode pipeline seek failed");
                self.fail_read(dest, offset, remaining);
                return Err(e.into());
            }
            debug!(from = self.current_sample_in_file, to = start, position, "Seeked decode pipeline");
            self.current_sample_in_file = start;
        } else if self.buffer_num_samples > 0 {
            let count = remaining.min(self.buffer_num_samples);
            self.copy_from_buffer(dest, offset, count);
            offset += count;
            remaining -= count;
        }

        while remaining > 0 {
            self.release_buffer();

            let outcome = match self.pipeline.as_mut() {
                Some(pipeline) => pipeline.read_sample(StreamSelector::FirstAudio),
                None => return Err(FormatError::NotOpen("reader")),
            };
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Decode pipeline read failed");
                    self.fail_read(dest, offset, remaining);
                    return Err(e.into());
                }
            };

            self.read_result = outcome.flags;
            if outcome.flags.intersects(ReadFlags::STOP_READING) {
                break;
            }
            let Some(sample) = outcome.sample else {
                continue;
            };

            let data = sample.to_contiguous_buffer();
            let frame_bytes = self.frame_bytes();
            if data.len() % frame_bytes != 0 {
                warn!(bytes = data.len(), frame_bytes, "Decoded chunk ends mid-frame");
            }
            self.buffer_num_samples = data.len() / frame_bytes;
            self.buffer_offset = 0;
            self.buffer = data;

            let count = remaining.min(self.buffer_num_samples);
            self.copy_from_buffer(dest, offset, count);
            offset += count;
            remaining -= count;
        }

        if remaining > 0 {
            zero_fill(dest, offset, remaining);
        }

        if self
            .read_result
            .difference(ReadFlags::END_OF_STREAM)
            .intersects(ReadFlags::STOP_READING)
        {
            error!(flags = self.read_result.bits(), "Decode pipeline stopped with an error flag");
            self.release_buffer();
            return Err(FormatError::ReaderFailed);
        }
        Ok(())
    }
}

impl Drop for Mp4AudioReader {
    fn drop(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.shutdown() {
                warn!(error = %e, "Decode pipeline shutdown failed");
            }
        }
        self.release_buffer();
        self.session.take();
    }
}
