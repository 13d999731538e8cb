//! # Symphonia Source Reader
//!
//! Software decode pipeline: Symphonia probes and demuxes the container,
//! decodes the selected audio track and hands out interleaved 32-bit PCM.
//!
//! Positions cross this boundary in 100 ns units and are converted to frames
//! with rounding, so a frame index converted to time and back lands on the
//! same frame.

use std::sync::Arc;

use bridge_traits::{
    byte_stream::ByteStream,
    error::{BridgeError, Result},
    pipeline::{
        AudioSubtype, DecodePipeline, MediaBuffer, MediaSample, MediaType, PipelineAttributes,
        ReadFlags, ReadOutcome, StreamSelector, HNS_PER_SECOND,
    },
};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::units::TimeBase;
use tracing::{debug, error, info, instrument, warn};

use crate::format_hint::hint_for_stream;
use crate::media_io::ByteStreamSource;
use crate::sample_converter::interleave_to_le_bytes;

/// Decode errors tolerated in a row before a read reports `ERROR`.
const MAX_CONSECUTIVE_DECODE_ERRORS: usize = 10;

const OUTPUT_BITS_PER_SAMPLE: u32 = 32;

#[derive(Debug, Clone, Copy)]
struct SelectedTrack {
    index: usize,
    id: u32,
    sample_rate: u32,
    num_channels: u32,
    time_base: Option<TimeBase>,
    n_frames: Option<u64>,
}

impl SelectedTrack {
    fn ts_to_frames(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(tb) => {
                (u128::from(ts) * u128::from(tb.numer) * u128::from(self.sample_rate)
                    / u128::from(tb.denom)) as u64
            }
            None => ts,
        }
    }

    fn frames_to_ts(&self, frames: u64) -> u64 {
        match self.time_base {
            Some(tb) => {
                (u128::from(frames) * u128::from(tb.denom)
                    / (u128::from(tb.numer) * u128::from(self.sample_rate)).max(1)) as u64
            }
            None => frames,
        }
    }

    fn frames_to_hns(&self, frames: u64) -> i64 {
        (u128::from(frames) * HNS_PER_SECOND as u128 / u128::from(self.sample_rate)) as i64
    }
}

/// Decode pipeline backed by Symphonia.
pub struct SymphoniaSourceReader {
    format: Box<dyn FormatReader>,
    decoder: Option<Box<dyn Decoder>>,
    track: Option<SelectedTrack>,
    /// Frame a seek asked for; decoded frames before it are dropped.
    seek_target: Option<u64>,
    end_of_stream: bool,
    shut_down: bool,
}

impl SymphoniaSourceReader {
    #[instrument(skip(stream, attributes))]
    pub fn open(stream: Arc<dyn ByteStream>, attributes: &PipelineAttributes) -> Result<Self> {
        if attributes.enable_hardware_transforms {
            debug!("Hardware transforms requested; using software decoders");
        }

        let hint = hint_for_stream(stream.attributes());
        let source = MediaSourceStream::new(Box::new(ByteStreamSource::new(stream)), Default::default());
        let probed = symphonia::default::get_probe()
            .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| {
                error!("Format probe failed: {}", e);
                BridgeError::OperationFailed(format!("probe failed: {}", e))
            })?;

        info!(tracks = probed.format.tracks().len(), "Opened source reader");
        Ok(Self {
            format: probed.format,
            decoder: None,
            track: None,
            seek_target: None,
            end_of_stream: false,
            shut_down: false,
        })
    }

    fn first_audio_track(&self) -> Option<usize> {
        self.format.tracks().iter().position(|track| {
            track.codec_params.codec != CODEC_TYPE_NULL && track.codec_params.sample_rate.is_some()
        })
    }

    fn resolve(&self, stream: StreamSelector) -> Result<usize> {
        let index = match stream {
            StreamSelector::FirstAudio | StreamSelector::AllStreams => self.first_audio_track(),
            StreamSelector::Index(index) => Some(index as usize),
        };
        index
            .filter(|index| *index < self.format.tracks().len())
            .ok_or_else(|| BridgeError::InvalidArgument(format!("no stream for {:?}", stream)))
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        let track = &self.format.tracks()[index];
        let params = &track.codec_params;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| BridgeError::InvalidArgument(format!("track {} has no sample rate", index)))?;
        let num_channels = params.channels.map(|c| c.count() as u32).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| {
                error!("Failed to create decoder: {}", e);
                BridgeError::OperationFailed(format!("no decoder for track {}: {}", index, e))
            })?;

        let selected = SelectedTrack {
            index,
            id: track.id,
            sample_rate,
            num_channels,
            time_base: params.time_base,
            n_frames: params.n_frames,
        };
        debug!(?selected, "Selected track");
        self.track = Some(selected);
        self.decoder = Some(decoder);
        Ok(())
    }

    fn deselect(&mut self) {
        self.track = None;
        self.decoder = None;
    }

    fn selected(&self) -> Result<SelectedTrack> {
        if self.shut_down {
            return Err(BridgeError::Unexpected("source reader is shut down".to_string()));
        }
        self.track
            .ok_or_else(|| BridgeError::InvalidArgument("no stream selected".to_string()))
    }
}

impl DecodePipeline for SymphoniaSourceReader {
    fn set_stream_selection(&mut self, stream: StreamSelector, selected: bool) -> Result<()> {
        match (stream, selected) {
            (StreamSelector::AllStreams, false) => {
                self.deselect();
                Ok(())
            }
            (_, true) => {
                let index = self.resolve(stream)?;
                self.select_track(index)
            }
            (_, false) => {
                let index = self.resolve(stream)?;
                if self.track.is_some_and(|track| track.index == index) {
                    self.deselect();
                }
                Ok(())
            }
        }
    }

    fn set_current_media_type(&mut self, _stream: StreamSelector, media_type: &MediaType) -> Result<()> {
        self.selected()?;
        if media_type.subtype != AudioSubtype::Pcm {
            return Err(BridgeError::InvalidArgument(format!(
                "cannot decode to {:?}",
                media_type.subtype
            )));
        }
        match media_type.bits_per_sample {
            Some(OUTPUT_BITS_PER_SAMPLE) | None => Ok(()),
            Some(bits) => Err(BridgeError::InvalidArgument(format!(
                "cannot decode to {} bit PCM",
                bits
            ))),
        }
    }

    fn current_media_type(&self, _stream: StreamSelector) -> Result<MediaType> {
        let track = self.selected()?;
        Ok(MediaType::audio(AudioSubtype::Pcm)
            .with_bits_per_sample(OUTPUT_BITS_PER_SAMPLE)
            .with_samples_per_second(track.sample_rate)
            .with_num_channels(track.num_channels))
    }

    fn duration(&self) -> Result<u64> {
        let track = self.selected()?;
        let frames = track
            .n_frames
            .ok_or_else(|| BridgeError::NotAvailable("stream duration is unknown".to_string()))?;
        // One tick past the last frame, so converting back to frames never
        // truncates below n_frames.
        Ok(track.frames_to_hns(frames) as u64 + 1)
    }

    fn read_sample(&mut self, _stream: StreamSelector) -> Result<ReadOutcome> {
        let mut track = self.selected()?;
        if self.end_of_stream {
            return Ok(ReadOutcome::flagged(ReadFlags::END_OF_STREAM));
        }

        let mut decode_errors = 0;
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("Reached end of stream");
                    self.end_of_stream = true;
                    return Ok(ReadOutcome::flagged(ReadFlags::END_OF_STREAM));
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Track list changed");
                    return Ok(ReadOutcome::flagged(ReadFlags::NEW_STREAM));
                }
                Err(e) => {
                    error!("Failed to read packet: {}", e);
                    return Ok(ReadOutcome::flagged(ReadFlags::ERROR));
                }
            };

            if packet.track_id() != track.id {
                continue;
            }

            let Some(decoder) = self.decoder.as_mut() else {
                return Err(BridgeError::Unexpected("selected track has no decoder".to_string()));
            };
            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    decode_errors += 1;
                    warn!(
                        "Skipping packet with decode error (attempt {}/{}): {}",
                        decode_errors, MAX_CONSECUTIVE_DECODE_ERRORS, e
                    );
                    if decode_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                        return Ok(ReadOutcome::flagged(ReadFlags::ERROR));
                    }
                    continue;
                }
                Err(e) => {
                    error!("Fatal decode error: {}", e);
                    return Ok(ReadOutcome::flagged(ReadFlags::ERROR));
                }
            };

            let channels = decoded.spec().channels.count() as u32;
            if channels != track.num_channels {
                warn!(from = track.num_channels, to = channels, "Decoded channel count changed");
                track.num_channels = channels;
                self.track = Some(track);
                return Ok(ReadOutcome::flagged(ReadFlags::CURRENT_MEDIA_TYPE_CHANGED));
            }

            let packet_start = track.ts_to_frames(packet.ts());
            let frames = decoded.frames() as u64;
            let skip = self
                .seek_target
                .map_or(0, |target| target.saturating_sub(packet_start));
            if skip >= frames {
                continue;
            }
            self.seek_target = None;

            let data = interleave_to_le_bytes(decoded, skip as usize);
            let first_frame = packet_start + skip;
            let timestamp = track.frames_to_hns(first_frame);

            let mut sample = MediaSample::new();
            sample.add_buffer(MediaBuffer::from_bytes(data));
            sample.set_sample_time(timestamp);
            sample.set_sample_duration(track.frames_to_hns(frames - skip));
            return Ok(ReadOutcome::sample(timestamp, sample));
        }
    }

    fn set_current_position(&mut self, position: i64) -> Result<()> {
        let track = self.selected()?;
        let frame = (position.max(0) as f64 * f64::from(track.sample_rate) / HNS_PER_SECOND as f64)
            .round() as u64;

        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: track.frames_to_ts(frame),
                    track_id: track.id,
                },
            )
            .map_err(|e| {
                error!("Seek failed: {}", e);
                BridgeError::SeekFailed { offset: position }
            })?;

        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
        self.seek_target = Some(frame);
        self.end_of_stream = false;
        debug!(frame, actual_ts = seeked.actual_ts, "Seeked source reader");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.deselect();
        self.shut_down = true;
        Ok(())
    }
}
