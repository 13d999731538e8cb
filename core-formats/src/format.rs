//! # MP4 Audio Format
//!
//! Capability descriptor and factory for MP4/AAC readers and writers.
//!
//! ## Capabilities
//!
//! | Property | Value |
//! |----------|-------|
//! | Extensions | `.mp4`, `.aac`, `.3gp` |
//! | Sample rates | 44100, 48000 |
//! | Bit depths | 16 (write), 32 (read) |
//! | Layouts | mono, stereo, 5.1 |
//! | Quality | 8 AAC bitrate tiers |

use std::sync::Arc;

use bridge_traits::{
    pipeline::{ContainerType, MediaPlatform, PipelineAttributes},
    stream::{SharedInputStream, SharedOutputStream},
};
use tracing::{instrument, warn};

use crate::{
    bytestream::StreamDescriptor,
    config::FormatsConfig,
    error::{FormatError, Result},
    reader::Mp4AudioReader,
    traits::{AudioFormat, AudioFormatReader, AudioFormatWriter, ChannelLayout, WriterOptions},
    writer::Mp4AudioWriter,
};

pub const MP4_FORMAT_NAME: &str = "MP4 file";

pub const MP4_FILE_EXTENSIONS: [&str; 3] = [".mp4", ".aac", ".3gp"];

/// MIME type attached to streams the writer produces.
pub const MP4_CONTENT_TYPE: &str = "audio/mp4";

pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [44100, 48000];

pub const SUPPORTED_BIT_DEPTHS: [u32; 2] = [WRITER_BITS_PER_SAMPLE, READER_BITS_PER_SAMPLE];

/// Depth of PCM handed to the encoder.
pub const WRITER_BITS_PER_SAMPLE: u32 = 16;

/// Depth of PCM delivered by the decoder.
pub const READER_BITS_PER_SAMPLE: u32 = 32;

pub const QUALITY_OPTIONS: [&str; 8] = [
    "0 - 96 kbps",
    "1 - 128 kbps",
    "2 - 160 kbps",
    "3 - 192 kbps",
    "4 - 96 kbps per channel",
    "5 - 128 kbps per channel",
    "6 - 160 kbps per channel",
    "7 - 192 kbps per channel",
];

/// AAC bitrate tier selected by a quality option index.
///
/// Tiers 0-3 are per stream, tiers 4-7 repeat the same rates per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityTier(u8);

impl QualityTier {
    const BASE_BYTES_PER_SECOND: u32 = 12000;
    const STEP_BYTES_PER_SECOND: u32 = 4000;

    pub fn from_index(index: i32) -> Option<Self> {
        u8::try_from(index)
            .ok()
            .filter(|i| usize::from(*i) < QUALITY_OPTIONS.len())
            .map(Self)
    }

    pub fn index(&self) -> u8 {
        self.0
    }

    pub fn is_per_channel(&self) -> bool {
        self.0 >= 4
    }

    pub fn label(&self) -> &'static str {
        QUALITY_OPTIONS[usize::from(self.0)]
    }

    /// Average encoded bytes per second for a stream of `channels` channels.
    pub fn bytes_per_second(&self, channels: u32) -> u32 {
        let rate = Self::BASE_BYTES_PER_SECOND + u32::from(self.0 % 4) * Self::STEP_BYTES_PER_SECOND;
        if self.is_per_channel() {
            rate * channels
        } else {
            rate
        }
    }
}

/// MP4/AAC audio format backed by a [`MediaPlatform`].
pub struct Mp4AudioFormat {
    platform: Arc<dyn MediaPlatform>,
    config: FormatsConfig,
}

impl Mp4AudioFormat {
    pub fn new(platform: Arc<dyn MediaPlatform>) -> Self {
        Self::with_config(platform, FormatsConfig::default())
    }

    pub fn with_config(platform: Arc<dyn MediaPlatform>, config: FormatsConfig) -> Self {
        Self { platform, config }
    }

    pub fn config(&self) -> &FormatsConfig {
        &self.config
    }

    /// Writer options for the given shape using the configured default quality.
    pub fn default_writer_options(&self, sample_rate: u32, num_channels: u32) -> WriterOptions {
        WriterOptions::new(sample_rate, num_channels, WRITER_BITS_PER_SAMPLE)
            .with_quality_option_index(self.config.default_quality_index)
    }

    fn pipeline_attributes(&self) -> PipelineAttributes {
        PipelineAttributes::default().with_hardware_transforms(self.config.enable_hardware_transforms)
    }

    /// Open a reader; `descriptor` can name the origin to help container detection.
    #[instrument(skip(self, stream))]
    pub fn open_reader(
        &self,
        stream: SharedInputStream,
        descriptor: &StreamDescriptor,
    ) -> Result<Mp4AudioReader> {
        let descriptor = StreamDescriptor {
            is_remote: descriptor.is_remote || self.config.using_network,
            ..descriptor.clone()
        };
        let mut reader = Mp4AudioReader::new(
            stream,
            self.platform.as_ref(),
            &descriptor,
            &self.pipeline_attributes(),
        );

        if reader.is_valid() {
            return Ok(reader);
        }
        let err = reader.take_construction_error().unwrap_or_else(|| {
            FormatError::InvalidStream(format!(
                "{} bits, {} Hz, {} channels, {} samples",
                reader.bits_per_sample(),
                reader.sample_rate(),
                reader.num_channels(),
                reader.length_in_samples()
            ))
        });
        warn!(error = %err, "create_reader_for: stream is not readable");
        Err(err)
    }

    /// Check writer options and return the channel count to write.
    pub fn validate_writer_options(&self, options: &WriterOptions) -> Result<u32> {
        check_writer_options(options)
    }

    #[instrument(skip(self, stream), fields(sample_rate = options.sample_rate))]
    pub fn open_writer(
        &self,
        stream: SharedOutputStream,
        options: &WriterOptions,
    ) -> Result<Mp4AudioWriter> {
        let num_channels = self.validate_writer_options(options)?;
        let options = WriterOptions {
            num_channels,
            ..options.clone()
        };
        let attributes = self
            .pipeline_attributes()
            .with_container(ContainerType::Mpeg4);

        let mut writer = Mp4AudioWriter::new(stream, self.platform.as_ref(), &options, &attributes);
        if writer.is_open() {
            return Ok(writer);
        }
        Err(writer
            .take_construction_error()
            .unwrap_or(FormatError::NotOpen("writer")))
    }
}

/// Check writer options against the writable capabilities, returning the
/// channel count to write. Checks run in a fixed order: sample rate, layout
/// or count, bit depth, metadata, quality.
pub(crate) fn check_writer_options(options: &WriterOptions) -> Result<u32> {
    if !SUPPORTED_SAMPLE_RATES.contains(&options.sample_rate) {
        warn!(sample_rate = options.sample_rate, "create_writer_for: unsupported sample rate");
        return Err(FormatError::UnsupportedSampleRate(options.sample_rate));
    }

    let num_channels = match options.channel_layout {
        Some(layout) => {
            if !is_writable_layout(&layout) {
                warn!(%layout, "create_writer_for: unsupported channel layout");
                return Err(FormatError::UnsupportedChannelLayout(layout.to_string()));
            }
            layout.num_channels()
        }
        None => {
            if ChannelLayout::from_channel_count(options.num_channels).is_none() {
                warn!(
                    num_channels = options.num_channels,
                    "create_writer_for: unsupported channel count"
                );
                return Err(FormatError::UnsupportedChannelCount(options.num_channels));
            }
            options.num_channels
        }
    };

    if options.bits_per_sample != WRITER_BITS_PER_SAMPLE {
        warn!(
            bits_per_sample = options.bits_per_sample,
            "create_writer_for: unsupported bit depth"
        );
        return Err(FormatError::UnsupportedBitDepth(options.bits_per_sample));
    }

    if !options.metadata.is_empty() {
        warn!(
            entries = options.metadata.len(),
            "create_writer_for: metadata is not supported"
        );
        return Err(FormatError::MetadataNotSupported(options.metadata.len()));
    }

    if QualityTier::from_index(options.quality_option_index).is_none() {
        warn!(
            quality_option_index = options.quality_option_index,
            "create_writer_for: unsupported quality option"
        );
        return Err(FormatError::UnsupportedQuality(options.quality_option_index));
    }

    Ok(num_channels)
}

fn is_writable_layout(layout: &ChannelLayout) -> bool {
    matches!(
        layout,
        ChannelLayout::Mono | ChannelLayout::Stereo | ChannelLayout::Surround51
    )
}

impl AudioFormat for Mp4AudioFormat {
    fn name(&self) -> &str {
        MP4_FORMAT_NAME
    }

    fn file_extensions(&self) -> &[&'static str] {
        &MP4_FILE_EXTENSIONS
    }

    fn possible_sample_rates(&self) -> &[u32] {
        &SUPPORTED_SAMPLE_RATES
    }

    fn possible_bit_depths(&self) -> &[u32] {
        &SUPPORTED_BIT_DEPTHS
    }

    fn can_do_mono(&self) -> bool {
        true
    }

    fn can_do_stereo(&self) -> bool {
        true
    }

    fn is_compressed(&self) -> bool {
        true
    }

    fn is_channel_layout_supported(&self, layout: &ChannelLayout) -> bool {
        is_writable_layout(layout)
    }

    fn quality_options(&self) -> &[&'static str] {
        &QUALITY_OPTIONS
    }

    fn create_reader_for(&self, stream: SharedInputStream) -> Result<Box<dyn AudioFormatReader>> {
        let reader = self.open_reader(stream, &StreamDescriptor::new())?;
        Ok(Box::new(reader))
    }

    fn create_writer_for(
        &self,
        stream: SharedOutputStream,
        options: &WriterOptions,
    ) -> Result<Box<dyn AudioFormatWriter>> {
        let writer = self.open_writer(stream, options)?;
        Ok(Box::new(writer))
    }
}
