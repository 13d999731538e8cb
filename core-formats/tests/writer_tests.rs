//! Sample writer tests
//!
//! A recording encode pipeline captures every media type and sample the
//! writer submits.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bridge_traits::{
    error::Result as BridgeResult, AttributeKey, AudioSubtype, BridgeError, ByteStream,
    ContainerType, DecodePipeline, EncodePipeline, InlineWorkQueue, MediaPlatform, MediaSample,
    MediaType, PipelineAttributes, PlatformSession, WorkQueue,
};
use core_formats::{
    AudioFormatReader, AudioFormatWriter, ChannelLayout, FormatError, Mp4AudioFormat,
    Mp4AudioWriter, WriterOptions,
};
use parking_lot::Mutex;

// ============================================================================
// Recording platform
// ============================================================================

#[derive(Debug, Clone)]
struct SubmittedSample {
    time: Option<i64>,
    duration: Option<i64>,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct SinkLog {
    created: usize,
    content_type: Option<String>,
    attributes: Option<PipelineAttributes>,
    output_type: Option<MediaType>,
    input_type: Option<MediaType>,
    samples: Vec<SubmittedSample>,
    flushes: usize,
    finalized: usize,
    fail_begin: bool,
    reject_writes: bool,
}

struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
}

impl EncodePipeline for RecordingSink {
    fn add_stream(&mut self, output_type: &MediaType) -> BridgeResult<u32> {
        self.log.lock().output_type = Some(output_type.clone());
        Ok(0)
    }

    fn set_input_media_type(&mut self, stream_index: u32, input_type: &MediaType) -> BridgeResult<()> {
        assert_eq!(stream_index, 0);
        self.log.lock().input_type = Some(input_type.clone());
        Ok(())
    }

    fn begin_writing(&mut self) -> BridgeResult<()> {
        if self.log.lock().fail_begin {
            return Err(BridgeError::OperationFailed("encoder unavailable".to_string()));
        }
        Ok(())
    }

    fn write_sample(&mut self, _stream_index: u32, sample: &MediaSample) -> BridgeResult<()> {
        let mut log = self.log.lock();
        if log.reject_writes {
            return Err(BridgeError::OperationFailed("encoder queue full".to_string()));
        }
        log.samples.push(SubmittedSample {
            time: sample.sample_time(),
            duration: sample.sample_duration(),
            data: sample.to_contiguous_buffer().to_vec(),
        });
        Ok(())
    }

    fn flush(&mut self, _stream_index: u32) -> BridgeResult<()> {
        self.log.lock().flushes += 1;
        Ok(())
    }

    fn finalize(&mut self) -> BridgeResult<()> {
        self.log.lock().finalized += 1;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPlatform {
    log: Arc<Mutex<SinkLog>>,
    sessions: Arc<AtomicUsize>,
}

impl MediaPlatform for RecordingPlatform {
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
        Err(BridgeError::NotAvailable("encode only".to_string()))
    }

    fn create_sink_writer(
        &self,
        stream: Arc<dyn ByteStream>,
        attributes: &PipelineAttributes,
    ) -> BridgeResult<Box<dyn EncodePipeline>> {
        let mut log = self.log.lock();
        log.created += 1;
        log.content_type = stream.attributes().get_string(&AttributeKey::CONTENT_TYPE).ok();
        log.attributes = Some(attributes.clone());
        Ok(Box::new(RecordingSink {
            log: Arc::clone(&self.log),
        }))
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    log: Arc<Mutex<SinkLog>>,
    sessions: Arc<AtomicUsize>,
    format: Mp4AudioFormat,
}

impl Harness {
    fn new() -> Self {
        let platform = RecordingPlatform::default();
        let log = Arc::clone(&platform.log);
        let sessions = Arc::clone(&platform.sessions);
        Self {
            log,
            sessions,
            format: Mp4AudioFormat::new(Arc::new(platform)),
        }
    }

    fn open(&self, options: &WriterOptions) -> core_formats::Result<Mp4AudioWriter> {
        let stream = Arc::new(Mutex::new(Cursor::new(Vec::<u8>::new())));
        self.format.open_writer(stream, options)
    }

    fn samples(&self) -> Vec<SubmittedSample> {
        self.log.lock().samples.clone()
    }
}

fn stereo_48k() -> WriterOptions {
    WriterOptions::new(48000, 2, 16).with_quality_option_index(4)
}

fn silence(channels: usize, frames: usize) -> Vec<Vec<i32>> {
    vec![vec![0; frames]; channels]
}

fn write(writer: &mut Mp4AudioWriter, channels: &[Vec<i32>], frames: usize) -> core_formats::Result<()> {
    let slices: Vec<&[i32]> = channels.iter().map(|c| c.as_slice()).collect();
    writer.write(&slices, frames)
}

fn decode_i16(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Reader producing `frame << 16` on every channel.
struct RampReader {
    length: i64,
    channels: u32,
}

impl AudioFormatReader for RampReader {
    fn format_name(&self) -> &str {
        "ramp"
    }

    fn sample_rate(&self) -> u32 {
        48000
    }

    fn bits_per_sample(&self) -> u32 {
        32
    }

    fn length_in_samples(&self) -> i64 {
        self.length
    }

    fn num_channels(&self) -> u32 {
        self.channels
    }

    fn uses_floating_point_data(&self) -> bool {
        false
    }

    fn read_samples(
        &mut self,
        dest: &mut [&mut [i32]],
        start_offset_in_dest: usize,
        start_sample_in_file: i64,
        num_samples: usize,
    ) -> core_formats::Result<()> {
        for channel in dest.iter_mut() {
            for i in 0..num_samples {
                channel[start_offset_in_dest + i] = ((start_sample_in_file + i as i64) as i32) << 16;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_chunks_are_stamped_with_running_time() {
    let harness = Harness::new();
    let mut writer = harness.open(&stereo_48k()).unwrap();

    for frames in [480, 960, 240] {
        write(&mut writer, &silence(2, frames), frames).unwrap();
    }

    let samples = harness.samples();
    let times: Vec<Option<i64>> = samples.iter().map(|s| s.time).collect();
    let durations: Vec<Option<i64>> = samples.iter().map(|s| s.duration).collect();
    assert_eq!(times, vec![Some(0), Some(100_000), Some(300_000)]);
    assert_eq!(durations, vec![Some(100_000), Some(200_000), Some(50_000)]);
    assert_eq!(writer.sample_time(), 350_000);
    assert_eq!(samples[1].data.len(), 960 * 2 * 2);
}

#[test]
fn test_durations_are_truncated_per_chunk() {
    let harness = Harness::new();
    let options = WriterOptions::new(44100, 1, 16);
    let mut writer = harness.open(&options).unwrap();

    write(&mut writer, &silence(1, 1000), 1000).unwrap();
    write(&mut writer, &silence(1, 1000), 1000).unwrap();

    let samples = harness.samples();
    // 10^7 / 44100 * 1000 = 226757.37...
    assert_eq!(samples[0].duration, Some(226_757));
    assert_eq!(samples[1].time, Some(226_757));
    assert_eq!(writer.sample_time(), 453_514);
}

#[test]
fn test_media_types_and_bitrate() {
    let harness = Harness::new();
    let writer = harness.open(&stereo_48k()).unwrap();
    assert_eq!(writer.bytes_per_second(), 24000);
    assert_eq!(writer.sample_rate(), 48000);
    assert_eq!(writer.num_channels(), 2);
    assert_eq!(writer.bits_per_sample(), 16);
    assert_eq!(writer.format_name(), "MP4 file");

    let log = harness.log.lock();
    let output = log.output_type.clone().unwrap();
    assert_eq!(output.subtype, AudioSubtype::Aac);
    assert_eq!(output.bits_per_sample, Some(16));
    assert_eq!(output.samples_per_second, Some(48000));
    assert_eq!(output.num_channels, Some(2));
    assert_eq!(output.avg_bytes_per_second, Some(24000));

    let input = log.input_type.clone().unwrap();
    assert_eq!(input.subtype, AudioSubtype::Pcm);
    assert_eq!(input.block_align(), Some(4));

    assert_eq!(log.content_type.as_deref(), Some("audio/mp4"));
    let attributes = log.attributes.clone().unwrap();
    assert_eq!(attributes.container, Some(ContainerType::Mpeg4));
    assert!(attributes.enable_hardware_transforms);
}

#[test]
fn test_per_stream_tier_ignores_channel_count() {
    let harness = Harness::new();
    let options = WriterOptions::new(44100, 1, 16).with_quality_option_index(1);
    let writer = harness.open(&options).unwrap();
    assert_eq!(writer.bytes_per_second(), 16000);
}

#[test]
fn test_layout_overrides_channel_count() {
    let harness = Harness::new();
    let options = stereo_48k().with_channel_layout(ChannelLayout::Surround51);
    let writer = harness.open(&options).unwrap();

    assert_eq!(writer.num_channels(), 6);
    assert_eq!(writer.bytes_per_second(), 72000);
}

#[test]
fn test_unsupported_options_are_rejected_before_platform_use() {
    let harness = Harness::new();
    let cases = [
        (stereo_48k().with_quality_option_index(9), "quality"),
        (stereo_48k().with_sample_rate(22050), "rate"),
        (stereo_48k().with_bits_per_sample(24), "depth"),
        (stereo_48k().with_num_channels(3), "channels"),
        (stereo_48k().with_metadata("title", "Take 3"), "metadata"),
        (stereo_48k().with_channel_layout(ChannelLayout::Discrete(4)), "layout"),
    ];

    for (options, label) in cases {
        let err = harness.open(&options).err().unwrap();
        assert!(err.is_construction_rejection(), "{}: {}", label, err);
        match label {
            "quality" => assert!(matches!(err, FormatError::UnsupportedQuality(9))),
            "rate" => assert!(matches!(err, FormatError::UnsupportedSampleRate(22050))),
            "depth" => assert!(matches!(err, FormatError::UnsupportedBitDepth(24))),
            "channels" => assert!(matches!(err, FormatError::UnsupportedChannelCount(3))),
            "metadata" => assert!(matches!(err, FormatError::MetadataNotSupported(1))),
            _ => assert!(matches!(err, FormatError::UnsupportedChannelLayout(_))),
        }
    }

    assert_eq!(harness.log.lock().created, 0);
    assert_eq!(harness.sessions.load(Ordering::SeqCst), 0);
}

#[test]
fn test_sample_rate_is_checked_first() {
    let harness = Harness::new();
    let options = WriterOptions::new(96000, 3, 24).with_quality_option_index(-1);
    let err = harness.open(&options).err().unwrap();
    assert!(matches!(err, FormatError::UnsupportedSampleRate(96000)));
}

#[test]
fn test_failed_submission_does_not_advance_time() {
    let harness = Harness::new();
    let mut writer = harness.open(&stereo_48k()).unwrap();
    write(&mut writer, &silence(2, 480), 480).unwrap();

    harness.log.lock().reject_writes = true;
    let err = write(&mut writer, &silence(2, 480), 480).unwrap_err();
    assert!(err.is_platform_error());
    assert_eq!(writer.sample_time(), 100_000);

    harness.log.lock().reject_writes = false;
    write(&mut writer, &silence(2, 480), 480).unwrap();
    let samples = harness.samples();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[1].time, Some(100_000));
}

#[test]
fn test_samples_are_narrowed_to_16_bits() {
    let harness = Harness::new();
    let options = WriterOptions::new(48000, 1, 16);
    let mut writer = harness.open(&options).unwrap();
    let input = vec![vec![i32::MAX, -1, 0x0001_0000, i32::MIN, 0x1234_5678, 0x0000_ffff]];

    write(&mut writer, &input, 6).unwrap();

    let samples = harness.samples();
    assert_eq!(
        decode_i16(&samples[0].data),
        vec![i16::MAX, -1, 1, i16::MIN, 0x1234, 0]
    );
}

#[test]
fn test_channels_are_interleaved_and_missing_ones_silent() {
    let harness = Harness::new();
    let mut writer = harness.open(&stereo_48k()).unwrap();

    write(&mut writer, &[vec![1 << 16, 2 << 16], vec![-1 << 16, -2 << 16]], 2).unwrap();
    write(&mut writer, &[vec![3 << 16, 4 << 16]], 2).unwrap();

    let samples = harness.samples();
    assert_eq!(decode_i16(&samples[0].data), vec![1, -1, 2, -2]);
    assert_eq!(decode_i16(&samples[1].data), vec![3, 0, 4, 0]);
}

#[test]
fn test_short_or_empty_writes() {
    let harness = Harness::new();
    let mut writer = harness.open(&stereo_48k()).unwrap();

    let err = write(&mut writer, &[vec![0; 10], vec![0; 5]], 10).unwrap_err();
    assert!(matches!(err, FormatError::InvalidBuffer(_)));

    write(&mut writer, &silence(2, 0), 0).unwrap();
    assert!(harness.samples().is_empty());
    assert_eq!(writer.sample_time(), 0);
}

#[test]
fn test_encoder_failure_leaves_writer_closed() {
    let platform = RecordingPlatform::default();
    platform.log.lock().fail_begin = true;
    let stream = Arc::new(Mutex::new(Cursor::new(Vec::<u8>::new())));

    let mut writer = Mp4AudioWriter::new(
        stream,
        &platform,
        &stereo_48k(),
        &PipelineAttributes::default(),
    );

    assert!(!writer.is_open());
    assert_eq!(writer.sample_rate(), 0);
    assert_eq!(writer.num_channels(), 0);
    assert_eq!(writer.bits_per_sample(), 0);
    assert_eq!(writer.bytes_per_second(), 0);
    assert!(writer.construction_error().unwrap().is_platform_error());

    let err = write(&mut writer, &silence(2, 16), 16).unwrap_err();
    assert!(matches!(err, FormatError::NotOpen(_)));
    assert!(matches!(writer.flush(), Err(FormatError::NotOpen(_))));

    drop(writer);
    assert_eq!(platform.log.lock().finalized, 0);
    assert_eq!(platform.sessions.load(Ordering::SeqCst), 0);
}

#[test]
fn test_direct_construction_validates_options() {
    let platform = RecordingPlatform::default();
    let cases = [
        (WriterOptions::new(22050, 2, 16), "rate"),
        (WriterOptions::new(48000, 2, 24), "depth"),
        (stereo_48k().with_metadata("artist", "Quartet"), "metadata"),
    ];

    for (options, label) in cases {
        let stream = Arc::new(Mutex::new(Cursor::new(Vec::<u8>::new())));
        let writer = Mp4AudioWriter::new(stream, &platform, &options, &PipelineAttributes::default());

        assert!(!writer.is_open(), "{}", label);
        assert_eq!(writer.sample_rate(), 0);
        let err = writer.construction_error().unwrap();
        assert!(err.is_construction_rejection(), "{}: {}", label, err);
    }

    assert_eq!(platform.log.lock().created, 0);
    assert_eq!(platform.sessions.load(Ordering::SeqCst), 0);
}

#[test]
fn test_open_writer_reports_encoder_failure() {
    let harness = Harness::new();
    harness.log.lock().fail_begin = true;

    let err = harness.open(&stereo_48k()).err().unwrap();
    assert!(err.is_platform_error());
    assert_eq!(harness.sessions.load(Ordering::SeqCst), 0);
}

#[test]
fn test_flush_and_finish() {
    let harness = Harness::new();
    let mut writer = harness.open(&stereo_48k()).unwrap();
    write(&mut writer, &silence(2, 480), 480).unwrap();

    writer.flush().unwrap();
    assert_eq!(harness.log.lock().flushes, 1);
    assert_eq!(harness.sessions.load(Ordering::SeqCst), 1);

    writer.finish().unwrap();
    assert_eq!(harness.log.lock().finalized, 1);
    assert_eq!(harness.sessions.load(Ordering::SeqCst), 0);
}

#[test]
fn test_drop_finalizes_once() {
    let harness = Harness::new();
    let writer = harness.open(&stereo_48k()).unwrap();

    drop(writer);

    assert_eq!(harness.log.lock().finalized, 1);
    assert_eq!(harness.sessions.load(Ordering::SeqCst), 0);
}

#[test]
fn test_write_from_reader_copies_in_blocks() {
    let harness = Harness::new();
    let mut writer = harness.open(&stereo_48k()).unwrap();
    let mut reader = RampReader {
        length: 1000,
        channels: 2,
    };

    let copied = writer.write_from_reader(&mut reader, 0, None, 256).unwrap();

    assert_eq!(copied, 1000);
    let samples = harness.samples();
    let sizes: Vec<usize> = samples.iter().map(|s| s.data.len() / 4).collect();
    assert_eq!(sizes, vec![256, 256, 256, 232]);
    let last = decode_i16(&samples[3].data);
    assert_eq!(&last[last.len() - 2..], &[999, 999]);
}

#[test]
fn test_write_from_reader_bounds() {
    let harness = Harness::new();
    let mut writer = harness.open(&stereo_48k()).unwrap();
    let mut reader = RampReader {
        length: 1000,
        channels: 2,
    };

    assert_eq!(writer.write_from_reader(&mut reader, 900, Some(500), 64).unwrap(), 100);
    assert_eq!(decode_i16(&harness.samples()[0].data)[0], 900);
    assert_eq!(writer.write_from_reader(&mut reader, 1200, None, 64).unwrap(), 0);
    assert!(matches!(
        writer.write_from_reader(&mut reader, 0, None, 0),
        Err(FormatError::InvalidBuffer(_))
    ));
}
