//! # WAV Sink Writer
//!
//! Software encode pipeline writing 16-bit PCM WAV through hound.
//!
//! No AAC encoder ships with the desktop bridge. Streams requesting AAC in
//! an MP4 container are written as PCM WAV with the same sample rate and
//! channel count; a warning is logged when that substitution happens.

use std::io::BufWriter;
use std::sync::Arc;

use bridge_traits::{
    byte_stream::ByteStream,
    error::{BridgeError, Result},
    pipeline::{
        AudioSubtype, ContainerType, EncodePipeline, MediaSample, MediaType, PipelineAttributes,
    },
};
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info, instrument, trace, warn};

use crate::media_io::ByteStreamWriter;

const PCM_BITS_PER_SAMPLE: u16 = 16;

const WRITE_BUFFER_BYTES: usize = 64 * 1024;

fn hound_error(error: hound::Error) -> BridgeError {
    match error {
        hound::Error::IoError(e) => BridgeError::Io(e),
        other => BridgeError::OperationFailed(format!("wav writer: {}", other)),
    }
}

/// Encode pipeline producing a WAV file on a [`ByteStream`].
pub struct WavSinkWriter {
    stream: Arc<dyn ByteStream>,
    container: Option<ContainerType>,
    output_type: Option<MediaType>,
    input_type: Option<MediaType>,
    writer: Option<WavWriter<BufWriter<ByteStreamWriter>>>,
    samples_written: u64,
    last_sample_time: Option<i64>,
    finalized: bool,
}

impl WavSinkWriter {
    #[instrument(skip(stream, attributes))]
    pub fn open(stream: Arc<dyn ByteStream>, attributes: &PipelineAttributes) -> Result<Self> {
        if attributes.container == Some(ContainerType::Mpeg4) {
            warn!("MP4 container requested; desktop sink writes WAV");
        }
        Ok(Self {
            stream,
            container: attributes.container,
            output_type: None,
            input_type: None,
            writer: None,
            samples_written: 0,
            last_sample_time: None,
            finalized: false,
        })
    }

    pub fn container(&self) -> Option<ContainerType> {
        self.container
    }

    /// Frames accepted so far.
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    fn check_stream(&self, stream_index: u32) -> Result<()> {
        if stream_index != 0 || self.output_type.is_none() {
            return Err(BridgeError::InvalidArgument(format!(
                "unknown stream index {}",
                stream_index
            )));
        }
        Ok(())
    }

    fn spec(&self) -> Result<WavSpec> {
        let input = self
            .input_type
            .as_ref()
            .ok_or_else(|| BridgeError::Unexpected("input media type not set".to_string()))?;
        let channels = input.num_channels.unwrap_or(0);
        let sample_rate = input.samples_per_second.unwrap_or(0);
        if channels == 0 || sample_rate == 0 {
            return Err(BridgeError::InvalidArgument(format!(
                "incomplete input type: {} Hz, {} channels",
                sample_rate, channels
            )));
        }
        let channels = u16::try_from(channels)
            .map_err(|_| BridgeError::InvalidArgument(format!("{} channels", channels)))?;
        Ok(WavSpec {
            channels,
            sample_rate,
            bits_per_sample: PCM_BITS_PER_SAMPLE,
            sample_format: SampleFormat::Int,
        })
    }
}

impl EncodePipeline for WavSinkWriter {
    fn add_stream(&mut self, output_type: &MediaType) -> Result<u32> {
        if self.output_type.is_some() {
            return Err(BridgeError::NotAvailable(
                "desktop sink writes a single stream".to_string(),
            ));
        }
        if output_type.subtype == AudioSubtype::Aac {
            warn!(
                avg_bytes_per_second = ?output_type.avg_bytes_per_second,
                "AAC encoding unavailable; writing 16-bit PCM"
            );
        }
        self.output_type = Some(output_type.clone());
        Ok(0)
    }

    fn set_input_media_type(&mut self, stream_index: u32, input_type: &MediaType) -> Result<()> {
        self.check_stream(stream_index)?;
        if input_type.subtype != AudioSubtype::Pcm
            || input_type.bits_per_sample != Some(u32::from(PCM_BITS_PER_SAMPLE))
        {
            return Err(BridgeError::InvalidArgument(format!(
                "input must be 16-bit PCM, got {:?} {:?}",
                input_type.subtype, input_type.bits_per_sample
            )));
        }
        if let Some(output) = &self.output_type {
            if output.samples_per_second != input_type.samples_per_second
                || output.num_channels != input_type.num_channels
            {
                return Err(BridgeError::InvalidArgument(
                    "input and output shapes differ; resampling is not supported".to_string(),
                ));
            }
        }
        self.input_type = Some(input_type.clone());
        Ok(())
    }

    fn begin_writing(&mut self) -> Result<()> {
        if self.writer.is_some() || self.finalized {
            return Err(BridgeError::Unexpected("writing already started".to_string()));
        }
        let spec = self.spec()?;
        let sink = BufWriter::with_capacity(
            WRITE_BUFFER_BYTES,
            ByteStreamWriter::new(Arc::clone(&self.stream)),
        );
        let writer = WavWriter::new(sink, spec).map_err(hound_error)?;
        info!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            "Started WAV sink"
        );
        self.writer = Some(writer);
        Ok(())
    }

    fn write_sample(&mut self, stream_index: u32, sample: &MediaSample) -> Result<()> {
        self.check_stream(stream_index)?;
        let channels = self.spec()?.channels as u64;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| BridgeError::Unexpected("writing has not started".to_string()))?;

        if let (Some(previous), Some(time)) = (self.last_sample_time, sample.sample_time()) {
            if time < previous {
                warn!(previous, time, "Sample time went backwards");
            }
        }

        let data = sample.to_contiguous_buffer();
        for pair in data.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(hound_error)?;
        }

        let frames = data.len() as u64 / 2 / channels;
        self.samples_written += frames;
        self.last_sample_time = sample.sample_time();
        trace!(
            frames,
            time = ?sample.sample_time(),
            duration = ?sample.sample_duration(),
            "Wrote sample"
        );
        Ok(())
    }

    fn flush(&mut self, stream_index: u32) -> Result<()> {
        self.check_stream(stream_index)?;
        match self.writer.as_mut() {
            Some(writer) => writer.flush().map_err(hound_error),
            None => Ok(()),
        }
    }

    fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(hound_error)?;
        }
        self.stream.flush()?;
        self.stream.close()?;
        debug!(frames = self.samples_written, "Finalized WAV sink");
        Ok(())
    }
}
