//! # MP4 Audio Writer
//!
//! Packages caller audio into timestamped samples for a platform encode
//! pipeline. Input is non-interleaved 32-bit integer audio; the encoder
//! receives interleaved 16-bit PCM (`sample >> 16`).
//!
//! Every submitted sample is stamped with the running presentation time
//! and a duration of `trunc(10^7 / sample_rate * num_samples)` in 100 ns
//! units. The running time advances only after the pipeline accepts a
//! sample.

use bridge_traits::{
    pipeline::{
        AudioSubtype, EncodePipeline, MediaBuffer, MediaPlatform, MediaSample, MediaType,
        PipelineAttributes, PlatformSession, HNS_PER_SECOND,
    },
    stream::SharedOutputStream,
};
use tracing::{debug, error, info, instrument, trace};

use crate::{
    bytestream::{OutputByteStream, StreamDescriptor},
    error::{FormatError, Result},
    format::{
        check_writer_options, QualityTier, MP4_CONTENT_TYPE, MP4_FORMAT_NAME,
        WRITER_BITS_PER_SAMPLE,
    },
    traits::{AudioFormatWriter, WriterOptions},
};

const BYTES_PER_ENCODED_SAMPLE: usize = 2;
const SAMPLE_BUFFER_ALIGNMENT: usize = 4;

/// Writer producing MP4/AAC through the platform's encode pipeline.
///
/// Like [`Mp4AudioReader`](crate::reader::Mp4AudioReader), construction
/// never fails outright; a writer whose pipeline could not be set up reports
/// zeroed format fields and rejects writes. The container is finalised by
/// [`finish`](Self::finish) or, failing that, on drop.
pub struct Mp4AudioWriter {
    sink: Option<Box<dyn EncodePipeline>>,
    stream_index: u32,
    sample_time: i64,
    sample_duration: f64,
    sample_rate: u32,
    num_channels: u32,
    bits_per_sample: u32,
    bytes_per_second: u32,
    construction_error: Option<FormatError>,
    session: Option<PlatformSession>,
}

impl Mp4AudioWriter {
    /// Set up the encode pipeline. Options outside the format's writable
    /// capabilities leave a closed writer without starting the platform.
    #[instrument(skip(stream, platform, attributes))]
    pub fn new(
        stream: SharedOutputStream,
        platform: &dyn MediaPlatform,
        options: &WriterOptions,
        attributes: &PipelineAttributes,
    ) -> Self {
        let mut writer = Self {
            sink: None,
            stream_index: 0,
            sample_time: 0,
            sample_duration: 0.0,
            sample_rate: 0,
            num_channels: 0,
            bits_per_sample: 0,
            bytes_per_second: 0,
            construction_error: None,
            session: None,
        };

        let num_channels = match check_writer_options(options) {
            Ok(num_channels) => num_channels,
            Err(e) => {
                writer.construction_error = Some(e);
                return writer;
            }
        };

        match platform.startup() {
            Ok(session) => writer.session = Some(session),
            Err(e) => {
                error!(error = %e, "Failed to start media platform");
                writer.construction_error = Some(e.into());
                return writer;
            }
        }

        if let Err(e) = writer.open(stream, platform, options, num_channels, attributes) {
            error!(error = %e, "Failed to open MP4 writer");
            writer.sink = None;
            writer.sample_rate = 0;
            writer.num_channels = 0;
            writer.bits_per_sample = 0;
            writer.bytes_per_second = 0;
            writer.construction_error = Some(e);
        }
        writer
    }

    fn open(
        &mut self,
        stream: SharedOutputStream,
        platform: &dyn MediaPlatform,
        options: &WriterOptions,
        num_channels: u32,
        attributes: &PipelineAttributes,
    ) -> Result<()> {
        let tier = QualityTier::from_index(options.quality_option_index)
            .ok_or(FormatError::UnsupportedQuality(options.quality_option_index))?;
        let bytes_per_second = tier.bytes_per_second(num_channels);

        let descriptor = StreamDescriptor::new().with_content_type(MP4_CONTENT_TYPE);
        let byte_stream = OutputByteStream::new(stream, &descriptor, platform.work_queue());
        let mut sink = platform.create_sink_writer(byte_stream, attributes)?;

        let output_type = MediaType::audio(AudioSubtype::Aac)
            .with_bits_per_sample(WRITER_BITS_PER_SAMPLE)
            .with_samples_per_second(options.sample_rate)
            .with_num_channels(num_channels)
            .with_avg_bytes_per_second(bytes_per_second);
        let stream_index = sink.add_stream(&output_type)?;

        let input_type = MediaType::audio(AudioSubtype::Pcm)
            .with_bits_per_sample(WRITER_BITS_PER_SAMPLE)
            .with_samples_per_second(options.sample_rate)
            .with_num_channels(num_channels);
        sink.set_input_media_type(stream_index, &input_type)?;
        sink.begin_writing()?;

        info!(
            sample_rate = options.sample_rate,
            num_channels,
            bytes_per_second,
            quality = tier.label(),
            "Opened MP4 writer"
        );

        self.sink = Some(sink);
        self.stream_index = stream_index;
        self.sample_rate = options.sample_rate;
        self.num_channels = num_channels;
        self.bits_per_sample = WRITER_BITS_PER_SAMPLE;
        self.bytes_per_second = bytes_per_second;
        self.sample_duration = HNS_PER_SECOND as f64 / f64::from(options.sample_rate);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    pub fn construction_error(&self) -> Option<&FormatError> {
        self.construction_error.as_ref()
    }

    pub fn take_construction_error(&mut self) -> Option<FormatError> {
        self.construction_error.take()
    }

    /// Presentation time of the next sample, in 100 ns units.
    pub fn sample_time(&self) -> i64 {
        self.sample_time
    }

    /// Average encoded bytes per second requested from the encoder.
    pub fn bytes_per_second(&self) -> u32 {
        self.bytes_per_second
    }

    /// Finalise the container and report the result.
    pub fn finish(mut self) -> Result<()> {
        self.finalize_sink()
    }

    fn finalize_sink(&mut self) -> Result<()> {
        match self.sink.take() {
            Some(mut sink) => {
                sink.finalize()?;
                debug!(sample_time = self.sample_time, "Finalized MP4 writer");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Interleave and narrow `num_samples` frames to 16-bit little-endian PCM.
    fn pack_samples(&self, channels: &[&[i32]], num_samples: usize) -> Result<MediaBuffer> {
        let num_channels = self.num_channels as usize;
        let length = num_samples * num_channels * BYTES_PER_ENCODED_SAMPLE;
        let mut buffer = MediaBuffer::aligned(length, SAMPLE_BUFFER_ALIGNMENT);

        let out = buffer.as_mut_slice();
        for frame in 0..num_samples {
            for channel in 0..num_channels {
                let value = channels.get(channel).map_or(0, |c| c[frame]);
                let narrowed = (value >> 16) as i16;
                let at = (frame * num_channels + channel) * BYTES_PER_ENCODED_SAMPLE;
                out[at..at + BYTES_PER_ENCODED_SAMPLE].copy_from_slice(&narrowed.to_le_bytes());
            }
        }

        buffer.set_current_length(length)?;
        Ok(buffer)
    }
}

impl AudioFormatWriter for Mp4AudioWriter {
    fn format_name(&self) -> &str {
        MP4_FORMAT_NAME
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn num_channels(&self) -> u32 {
        self.num_channels
    }

    fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    fn write(&mut self, channels: &[&[i32]], num_samples: usize) -> Result<()> {
        if self.sink.is_none() {
            return Err(FormatError::NotOpen("writer"));
        }
        if let Some(short) = channels.iter().position(|c| c.len() < num_samples) {
            return Err(FormatError::InvalidBuffer(format!(
                "channel {} holds {} samples, {} needed",
                short,
                channels[short].len(),
                num_samples
            )));
        }
        if num_samples == 0 {
            return Ok(());
        }

        let buffer = self.pack_samples(channels, num_samples)?;
        let duration = (self.sample_duration * num_samples as f64) as i64;

        let mut sample = MediaSample::new();
        sample.add_buffer(buffer);
        sample.set_sample_time(self.sample_time);
        sample.set_sample_duration(duration);

        let stream_index = self.stream_index;
        let Some(sink) = self.sink.as_mut() else {
            return Err(FormatError::NotOpen("writer"));
        };
        if let Err(e) = sink.write_sample(stream_index, &sample) {
            error!(error = %e, sample_time = self.sample_time, "Encode pipeline rejected sample");
            return Err(e.into());
        }

        trace!(sample_time = self.sample_time, duration, num_samples, "Submitted sample");
        self.sample_time += duration;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let stream_index = self.stream_index;
        let sink = self.sink.as_mut().ok_or(FormatError::NotOpen("writer"))?;
        sink.flush(stream_index)?;
        Ok(())
    }
}

impl Drop for Mp4AudioWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finalize_sink() {
            error!(error = %e, "Failed to finalize MP4 writer");
        }
        self.session.take();
    }
}
