//! # Audio Format Traits
//!
//! Platform-agnostic interfaces for pluggable audio file formats.
//!
//! ## Overview
//!
//! A host registers [`AudioFormat`]s with a
//! [`FormatRegistry`](crate::registry::FormatRegistry) and asks it for readers
//! and writers by file name. Readers deliver non-interleaved 32-bit integer
//! channels; writers accept the same and convert to the format's own depth.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐     ┌───────────────────┐
//! │ AudioFormatReader │ ──▶ │ AudioFormatWriter │   write_from_reader
//! └───────────────────┘     └───────────────────┘
//!           ▲                         ▲
//!           └──────── AudioFormat ────┘   create_reader_for / create_writer_for
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use bridge_traits::stream::{SharedInputStream, SharedOutputStream};
use tracing::debug;

use crate::error::{FormatError, Result};

// ============================================================================
// Channel Layout
// ============================================================================

/// Speaker arrangement of a multichannel stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    Mono,
    Stereo,
    /// 5.1: L, R, C, LFE, Ls, Rs.
    Surround51,
    /// Channels with no speaker assignment.
    Discrete(u32),
}

impl ChannelLayout {
    pub fn num_channels(&self) -> u32 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
            ChannelLayout::Surround51 => 6,
            ChannelLayout::Discrete(n) => *n,
        }
    }

    /// Named layout for a channel count, if one exists.
    pub fn from_channel_count(channels: u32) -> Option<Self> {
        match channels {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            6 => Some(ChannelLayout::Surround51),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelLayout::Mono => f.write_str("mono"),
            ChannelLayout::Stereo => f.write_str("stereo"),
            ChannelLayout::Surround51 => f.write_str("5.1"),
            ChannelLayout::Discrete(n) => write!(f, "discrete({})", n),
        }
    }
}

// ============================================================================
// Writer Options
// ============================================================================

/// Parameters for creating a writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    pub sample_rate: u32,
    pub num_channels: u32,
    pub bits_per_sample: u32,
    /// Index into [`AudioFormat::quality_options`].
    pub quality_option_index: i32,
    /// Overrides `num_channels` when set.
    pub channel_layout: Option<ChannelLayout>,
    pub metadata: HashMap<String, String>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            num_channels: 2,
            bits_per_sample: 16,
            quality_option_index: 0,
            channel_layout: None,
            metadata: HashMap::new(),
        }
    }
}

impl WriterOptions {
    pub fn new(sample_rate: u32, num_channels: u32, bits_per_sample: u32) -> Self {
        Self {
            sample_rate,
            num_channels,
            bits_per_sample,
            ..Default::default()
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_num_channels(mut self, num_channels: u32) -> Self {
        self.num_channels = num_channels;
        self
    }

    pub fn with_bits_per_sample(mut self, bits: u32) -> Self {
        self.bits_per_sample = bits;
        self
    }

    pub fn with_quality_option_index(mut self, index: i32) -> Self {
        self.quality_option_index = index;
        self
    }

    pub fn with_channel_layout(mut self, layout: ChannelLayout) -> Self {
        self.channel_layout = Some(layout);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Channel count after applying the layout override.
    pub fn effective_num_channels(&self) -> u32 {
        self.channel_layout
            .map(|layout| layout.num_channels())
            .unwrap_or(self.num_channels)
    }
}

// ============================================================================
// Reader / Writer Traits
// ============================================================================

/// Source of decoded audio with random access by sample index.
pub trait AudioFormatReader: Send {
    fn format_name(&self) -> &str;

    fn sample_rate(&self) -> u32;

    fn bits_per_sample(&self) -> u32;

    fn length_in_samples(&self) -> i64;

    fn num_channels(&self) -> u32;

    fn uses_floating_point_data(&self) -> bool;

    fn channel_layout(&self) -> Option<ChannelLayout> {
        ChannelLayout::from_channel_count(self.num_channels())
    }

    /// Fill `dest[ch][start_offset_in_dest..start_offset_in_dest + num_samples]`
    /// with samples starting at `start_sample_in_file`.
    ///
    /// Regions past the end of the audio are zero-filled. Destination
    /// channels beyond the reader's channel count are zero-filled.
    fn read_samples(
        &mut self,
        dest: &mut [&mut [i32]],
        start_offset_in_dest: usize,
        start_sample_in_file: i64,
        num_samples: usize,
    ) -> Result<()>;
}

/// Sink for audio, fed with non-interleaved 32-bit integer channels.
pub trait AudioFormatWriter: Send {
    fn format_name(&self) -> &str;

    fn sample_rate(&self) -> u32;

    fn num_channels(&self) -> u32;

    fn bits_per_sample(&self) -> u32;

    /// Write `num_samples` frames from `channels`. Missing channels are written as silence.
    fn write(&mut self, channels: &[&[i32]], num_samples: usize) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Copy `num_samples` frames (all remaining when `None`) starting at
    /// `start_sample` from `reader`, `block_size` frames at a time.
    ///
    /// Returns the number of frames written.
    fn write_from_reader(
        &mut self,
        reader: &mut dyn AudioFormatReader,
        start_sample: i64,
        num_samples: Option<i64>,
        block_size: usize,
    ) -> Result<i64> {
        if block_size == 0 {
            return Err(FormatError::InvalidBuffer("block size must be > 0".to_string()));
        }

        let available = (reader.length_in_samples() - start_sample).max(0);
        let total = num_samples.map_or(available, |n| n.min(available).max(0));
        let channels = reader.num_channels().max(1) as usize;
        let mut buffers = vec![vec![0i32; block_size]; channels];

        let mut position = start_sample;
        let mut remaining = total;
        while remaining > 0 {
            let frames = remaining.min(block_size as i64) as usize;
            {
                let mut dest: Vec<&mut [i32]> =
                    buffers.iter_mut().map(|b| &mut b[..frames]).collect();
                reader.read_samples(&mut dest, 0, position, frames)?;
            }
            let source: Vec<&[i32]> = buffers.iter().map(|b| &b[..frames]).collect();
            self.write(&source, frames)?;

            position += frames as i64;
            remaining -= frames as i64;
        }

        debug!(frames = total, "Copied reader into writer");
        Ok(total)
    }
}

// ============================================================================
// Format Trait
// ============================================================================

/// A pluggable audio file format.
pub trait AudioFormat: Send + Sync {
    fn name(&self) -> &str;

    /// Extensions including the leading dot, lowercase.
    fn file_extensions(&self) -> &[&'static str];

    /// True if the path's extension is one of [`file_extensions`](Self::file_extensions).
    fn can_handle_file(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let extension = format!(".{}", extension.to_lowercase());
        self.file_extensions().iter().any(|e| *e == extension)
    }

    fn possible_sample_rates(&self) -> &[u32];

    fn possible_bit_depths(&self) -> &[u32];

    fn can_do_mono(&self) -> bool;

    fn can_do_stereo(&self) -> bool;

    fn is_compressed(&self) -> bool;

    fn is_channel_layout_supported(&self, layout: &ChannelLayout) -> bool;

    fn quality_options(&self) -> &[&'static str];

    fn create_reader_for(&self, stream: SharedInputStream) -> Result<Box<dyn AudioFormatReader>>;

    fn create_writer_for(
        &self,
        stream: SharedOutputStream,
        options: &WriterOptions,
    ) -> Result<Box<dyn AudioFormatWriter>>;
}
