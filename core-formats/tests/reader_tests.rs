//! Sample reader tests
//!
//! A scripted decode pipeline stands in for the platform so chunk sizes,
//! seeks and stop flags are fully controlled.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bridge_traits::{
    error::Result as BridgeResult, AudioSubtype, BridgeError, ByteStream, DecodePipeline,
    EncodePipeline, InlineWorkQueue, MediaBuffer, MediaPlatform, MediaSample, MediaType,
    PipelineAttributes, PlatformSession, ReadFlags, ReadOutcome, StreamSelector, WorkQueue,
    HNS_PER_SECOND,
};
use bytes::{BufMut, BytesMut};
use core_formats::{
    AudioFormatReader, ChannelLayout, FormatError, Mp4AudioFormat, Mp4AudioReader,
    StreamDescriptor,
};
use parking_lot::Mutex;

// ============================================================================
// Scripted platform
// ============================================================================

#[derive(Debug, Clone)]
struct Script {
    sample_rate: u32,
    channels: u32,
    bits_per_sample: u32,
    /// Frames the pipeline actually delivers.
    total_frames: usize,
    /// Frames the duration claims.
    reported_frames: usize,
    chunk_frames: usize,
    /// Raise the ERROR flag after this many delivered chunks.
    error_after_chunks: Option<usize>,
    fail_open: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            bits_per_sample: 32,
            total_frames: 4800,
            reported_frames: 4800,
            chunk_frames: 480,
            error_after_chunks: None,
            fail_open: false,
        }
    }
}

#[derive(Debug, Default)]
struct PipelineLog {
    seeks: Vec<i64>,
    reads: usize,
    chunks: usize,
    shutdowns: usize,
}

fn frame_value(frame: i64, channel: usize) -> i32 {
    (frame as i32 + 1) * 1000 + channel as i32
}

struct ScriptedPipeline {
    script: Script,
    position: usize,
    log: Arc<Mutex<PipelineLog>>,
    shut_down: bool,
}

impl DecodePipeline for ScriptedPipeline {
    fn set_stream_selection(&mut self, _stream: StreamSelector, _selected: bool) -> BridgeResult<()> {
        Ok(())
    }

    fn set_current_media_type(
        &mut self,
        _stream: StreamSelector,
        media_type: &MediaType,
    ) -> BridgeResult<()> {
        if media_type.subtype != AudioSubtype::Pcm {
            return Err(BridgeError::InvalidArgument("pcm only".to_string()));
        }
        Ok(())
    }

    fn current_media_type(&self, _stream: StreamSelector) -> BridgeResult<MediaType> {
        Ok(MediaType::audio(AudioSubtype::Pcm)
            .with_bits_per_sample(self.script.bits_per_sample)
            .with_samples_per_second(self.script.sample_rate)
            .with_num_channels(self.script.channels))
    }

    fn duration(&self) -> BridgeResult<u64> {
        let hns = self.script.reported_frames as i64 * HNS_PER_SECOND
            / i64::from(self.script.sample_rate);
        Ok(hns as u64 + 1)
    }

    fn read_sample(&mut self, _stream: StreamSelector) -> BridgeResult<ReadOutcome> {
        if self.shut_down {
            return Err(BridgeError::Unexpected("shut down".to_string()));
        }
        let mut log = self.log.lock();
        log.reads += 1;

        if self.script.error_after_chunks == Some(log.chunks) {
            return Ok(ReadOutcome::flagged(ReadFlags::ERROR));
        }
        if self.position >= self.script.total_frames {
            return Ok(ReadOutcome::flagged(ReadFlags::END_OF_STREAM));
        }

        let frames = self
            .script
            .chunk_frames
            .min(self.script.total_frames - self.position);
        let channels = self.script.channels as usize;
        let mut data = BytesMut::with_capacity(frames * channels * 4);
        for frame in self.position..self.position + frames {
            for channel in 0..channels {
                data.put_i32_le(frame_value(frame as i64, channel));
            }
        }
        let mut sample = MediaSample::new();
        sample.add_buffer(MediaBuffer::from_bytes(data));

        let timestamp =
            self.position as i64 * HNS_PER_SECOND / i64::from(self.script.sample_rate);
        self.position += frames;
        log.chunks += 1;
        Ok(ReadOutcome::sample(timestamp, sample))
    }

    fn set_current_position(&mut self, position: i64) -> BridgeResult<()> {
        let frame = (position as f64 * f64::from(self.script.sample_rate)
            / HNS_PER_SECOND as f64)
            .round() as usize;
        self.log.lock().seeks.push(frame as i64);
        self.position = frame;
        Ok(())
    }

    fn shutdown(&mut self) -> BridgeResult<()> {
        self.log.lock().shutdowns += 1;
        self.shut_down = true;
        Ok(())
    }
}

struct ScriptedPlatform {
    script: Script,
    log: Arc<Mutex<PipelineLog>>,
    sessions: Arc<AtomicUsize>,
}

impl ScriptedPlatform {
    fn new(script: Script) -> Self {
        Self {
            script,
            log: Arc::new(Mutex::new(PipelineLog::default())),
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn active_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl MediaPlatform for ScriptedPlatform {
    fn startup(&self) -> BridgeResult<PlatformSession> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        let sessions = Arc::clone(&self.sessions);
        Ok(PlatformSession::new(move || {
            sessions.fetch_sub(1, Ordering::SeqCst);
        }))
    }

    fn work_queue(&self) -> Arc<dyn WorkQueue> {
        Arc::new(InlineWorkQueue)
    }

    fn create_source_reader(
        &self,
        _stream: Arc<dyn ByteStream>,
        _attributes: &PipelineAttributes,
    ) -> BridgeResult<Box<dyn DecodePipeline>> {
        if self.script.fail_open {
            return Err(BridgeError::OperationFailed("no parser for stream".to_string()));
        }
        Ok(Box::new(ScriptedPipeline {
            script: self.script.clone(),
            position: 0,
            log: Arc::clone(&self.log),
            shut_down: false,
        }))
    }

    fn create_sink_writer(
        &self,
        _stream: Arc<dyn ByteStream>,
        _attributes: &PipelineAttributes,
    ) -> BridgeResult<Box<dyn EncodePipeline>> {
        Err(BridgeError::NotAvailable("decode only".to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn open(platform: &ScriptedPlatform) -> Mp4AudioReader {
    let stream = Arc::new(Mutex::new(Cursor::new(Vec::<u8>::new())));
    Mp4AudioReader::new(
        stream,
        platform,
        &StreamDescriptor::new().with_origin_name("clip.m4a"),
        &PipelineAttributes::default(),
    )
}

fn buffers(channels: usize, len: usize, fill: i32) -> Vec<Vec<i32>> {
    vec![vec![fill; len]; channels]
}

fn read(
    reader: &mut Mp4AudioReader,
    dest: &mut [Vec<i32>],
    offset: usize,
    start: i64,
    count: usize,
) -> core_formats::Result<()> {
    let mut slices: Vec<&mut [i32]> = dest.iter_mut().map(|c| c.as_mut_slice()).collect();
    reader.read_samples(&mut slices, offset, start, count)
}

fn assert_frames(dest: &[Vec<i32>], offset: usize, first_frame: i64, count: usize) {
    for (channel, samples) in dest.iter().enumerate() {
        for i in 0..count {
            assert_eq!(
                samples[offset + i],
                frame_value(first_frame + i as i64, channel),
                "channel {} slot {}",
                channel,
                offset + i
            );
        }
    }
}

fn assert_zeros(dest: &[Vec<i32>], range: std::ops::Range<usize>) {
    for samples in dest {
        assert!(samples[range.clone()].iter().all(|v| *v == 0), "{:?}", range);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_reports_decoded_format() {
    let platform = ScriptedPlatform::new(Script::default());
    let reader = open(&platform);

    assert!(reader.is_open());
    assert!(reader.is_valid());
    assert_eq!(reader.format_name(), "MP4 file");
    assert_eq!(reader.sample_rate(), 48000);
    assert_eq!(reader.bits_per_sample(), 32);
    assert_eq!(reader.num_channels(), 2);
    assert_eq!(reader.length_in_samples(), 4800);
    assert_eq!(reader.channel_layout(), Some(ChannelLayout::Stereo));
    assert!(!reader.uses_floating_point_data());
    assert!(reader.construction_error().is_none());
}

#[test]
fn test_repeated_read_returns_same_samples() {
    let platform = ScriptedPlatform::new(Script::default());
    let mut reader = open(&platform);
    let mut first = buffers(2, 50, -1);
    let mut second = buffers(2, 50, -1);

    read(&mut reader, &mut first, 0, 100, 50).unwrap();
    read(&mut reader, &mut second, 0, 100, 50).unwrap();

    assert_frames(&first, 0, 100, 50);
    assert_eq!(first, second);
    assert_eq!(platform.log.lock().seeks, vec![100, 100]);
}

#[test]
fn test_sequential_reads_continue_from_held_chunk() {
    let platform = ScriptedPlatform::new(Script::default());
    let mut reader = open(&platform);
    let mut dest = buffers(2, 700, -1);

    read(&mut reader, &mut dest, 0, 0, 100).unwrap();
    assert_eq!(reader.buffered_samples(), 380);
    assert_eq!(platform.log.lock().reads, 1);

    read(&mut reader, &mut dest, 100, 100, 200).unwrap();
    assert_eq!(reader.buffered_samples(), 180);
    assert_eq!(platform.log.lock().reads, 1);

    read(&mut reader, &mut dest, 300, 300, 400).unwrap();
    assert_eq!(reader.buffered_samples(), 260);
    assert_eq!(reader.current_sample_in_file(), 700);

    let log = platform.log.lock();
    assert_eq!(log.reads, 2);
    assert!(log.seeks.is_empty());
    drop(log);
    assert_frames(&dest, 0, 0, 700);
}

#[test]
fn test_backward_read_seeks_pipeline() {
    let platform = ScriptedPlatform::new(Script::default());
    let mut reader = open(&platform);
    let mut dest = buffers(2, 1000, -1);

    read(&mut reader, &mut dest, 0, 0, 1000).unwrap();
    let mut again = buffers(2, 100, -1);
    read(&mut reader, &mut again, 0, 200, 100).unwrap();

    assert_frames(&again, 0, 200, 100);
    assert_eq!(platform.log.lock().seeks, vec![200]);
    assert_eq!(reader.current_sample_in_file(), 300);
}

#[test]
fn test_read_past_end_is_zero_filled() {
    let platform = ScriptedPlatform::new(Script::default());
    let mut reader = open(&platform);

    let mut tail = buffers(2, 200, -1);
    read(&mut reader, &mut tail, 0, 4700, 200).unwrap();
    assert_frames(&tail, 0, 4700, 100);
    assert_zeros(&tail, 100..200);

    let reads_before = platform.log.lock().reads;
    let mut beyond = buffers(2, 64, -1);
    read(&mut reader, &mut beyond, 0, 5000, 64).unwrap();
    assert_zeros(&beyond, 0..64);
    assert_eq!(platform.log.lock().reads, reads_before);
}

#[test]
fn test_negative_start_zero_fills_lead() {
    let platform = ScriptedPlatform::new(Script::default());
    let mut reader = open(&platform);
    let mut dest = buffers(2, 30, -1);

    read(&mut reader, &mut dest, 0, -10, 30).unwrap();

    assert_zeros(&dest, 0..10);
    assert_frames(&dest, 10, 0, 20);
}

#[test]
fn test_destination_offset_and_extra_channels() {
    let platform = ScriptedPlatform::new(Script::default());
    let mut reader = open(&platform);
    let mut dest = buffers(3, 20, -1);

    read(&mut reader, &mut dest, 5, 40, 10).unwrap();

    for channel in &dest {
        assert!(channel[..5].iter().all(|v| *v == -1));
        assert!(channel[15..].iter().all(|v| *v == -1));
    }
    assert_frames(&dest[..2], 5, 40, 10);
    assert!(dest[2][5..15].iter().all(|v| *v == 0));
}

#[test]
fn test_short_destination_is_rejected() {
    let platform = ScriptedPlatform::new(Script::default());
    let mut reader = open(&platform);
    let mut dest = buffers(2, 8, -1);

    let err = read(&mut reader, &mut dest, 4, 0, 8).unwrap_err();
    assert!(matches!(err, FormatError::InvalidBuffer(_)));
    assert_eq!(platform.log.lock().reads, 0);
}

#[test]
fn test_unsupported_rate_leaves_reader_failed() {
    let platform = ScriptedPlatform::new(Script {
        sample_rate: 22050,
        ..Script::default()
    });
    let mut reader = open(&platform);

    assert!(!reader.is_open());
    assert!(!reader.is_valid());
    assert_eq!(reader.sample_rate(), 0);
    assert_eq!(reader.num_channels(), 0);
    assert_eq!(reader.length_in_samples(), 0);
    assert!(matches!(
        reader.construction_error(),
        Some(FormatError::UnsupportedSampleRate(22050))
    ));

    let mut dest = buffers(2, 16, -1);
    let err = read(&mut reader, &mut dest, 0, 0, 16).unwrap_err();
    assert!(matches!(err, FormatError::NotOpen(_)));
    assert_zeros(&dest, 0..16);

    drop(reader);
    assert_eq!(platform.active_sessions(), 0);
}

#[test]
fn test_format_rejects_unreadable_streams() {
    let platform: Arc<dyn MediaPlatform> = Arc::new(ScriptedPlatform::new(Script {
        sample_rate: 22050,
        ..Script::default()
    }));
    let format = Mp4AudioFormat::new(platform);
    let stream = Arc::new(Mutex::new(Cursor::new(Vec::<u8>::new())));

    let err = format
        .open_reader(stream, &StreamDescriptor::new())
        .err()
        .unwrap();
    assert!(matches!(err, FormatError::UnsupportedSampleRate(22050)));

    let depth = ScriptedPlatform::new(Script {
        bits_per_sample: 16,
        ..Script::default()
    });
    let reader = open(&depth);
    assert!(matches!(
        reader.construction_error(),
        Some(FormatError::UnsupportedBitDepth(16))
    ));
}

#[test]
fn test_pipeline_creation_failure_is_kept() {
    let platform = ScriptedPlatform::new(Script {
        fail_open: true,
        ..Script::default()
    });
    let mut reader = open(&platform);

    let err = reader.take_construction_error().unwrap();
    assert!(err.is_platform_error());
    assert!(reader.construction_error().is_none());
    assert!(!reader.is_open());
}

#[test]
fn test_error_flag_is_sticky() {
    let platform = ScriptedPlatform::new(Script {
        error_after_chunks: Some(1),
        ..Script::default()
    });
    let mut reader = open(&platform);
    let mut dest = buffers(2, 1000, -1);

    let err = read(&mut reader, &mut dest, 0, 0, 1000).unwrap_err();
    assert!(matches!(err, FormatError::ReaderFailed));
    assert_frames(&dest, 0, 0, 480);
    assert_zeros(&dest, 480..1000);
    assert_eq!(reader.buffered_samples(), 0);

    let reads = platform.log.lock().reads;
    let mut later = buffers(2, 10, -1);
    let err = read(&mut reader, &mut later, 0, 0, 10).unwrap_err();
    assert!(matches!(err, FormatError::ReaderFailed));
    assert_zeros(&later, 0..10);
    assert_eq!(platform.log.lock().reads, reads);
}

#[test]
fn test_early_end_of_stream_zero_fills_remainder() {
    let platform = ScriptedPlatform::new(Script {
        reported_frames: 5000,
        ..Script::default()
    });
    let mut reader = open(&platform);
    assert_eq!(reader.length_in_samples(), 5000);
    let mut dest = buffers(2, 200, -1);

    read(&mut reader, &mut dest, 0, 4700, 200).unwrap();

    assert_frames(&dest, 0, 4700, 100);
    assert_zeros(&dest, 100..200);

    // End of stream is not an error; earlier frames stay readable.
    let mut again = buffers(2, 10, -1);
    read(&mut reader, &mut again, 0, 0, 10).unwrap();
    assert_frames(&again, 0, 0, 10);
}

#[test]
fn test_drop_shuts_down_pipeline_and_releases_session() {
    let platform = ScriptedPlatform::new(Script::default());
    let reader = open(&platform);
    assert_eq!(platform.active_sessions(), 1);

    drop(reader);

    assert_eq!(platform.log.lock().shutdowns, 1);
    assert_eq!(platform.active_sessions(), 0);
}
