//! Desktop Media Platform Implementation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bridge_traits::{
    background::WorkQueue,
    byte_stream::ByteStream,
    error::Result,
    pipeline::{DecodePipeline, EncodePipeline, MediaPlatform, PipelineAttributes, PlatformSession},
};
use tracing::debug;

use crate::background::RayonWorkQueue;
use crate::sink_writer::WavSinkWriter;
use crate::source_reader::SymphoniaSourceReader;

/// Software media platform: Symphonia decoding, WAV encoding and a rayon
/// work queue.
pub struct DesktopMediaPlatform {
    work_queue: Arc<dyn WorkQueue>,
    sessions: Arc<AtomicUsize>,
}

impl DesktopMediaPlatform {
    pub fn new() -> Self {
        Self::with_work_queue(Arc::new(RayonWorkQueue::global()))
    }

    pub fn with_work_queue(work_queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            work_queue,
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sessions started and not yet released.
    pub fn active_sessions(&self) -> usize {
        self.sessions.load(Ordering::Acquire)
    }
}

impl Default for DesktopMediaPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaPlatform for DesktopMediaPlatform {
    fn startup(&self) -> Result<PlatformSession> {
        let active = self.sessions.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(active, "Media platform session started");

        let sessions = Arc::clone(&self.sessions);
        Ok(PlatformSession::new(move || {
            let remaining = sessions.fetch_sub(1, Ordering::AcqRel) - 1;
            debug!(active = remaining, "Media platform session released");
        }))
    }

    fn work_queue(&self) -> Arc<dyn WorkQueue> {
        Arc::clone(&self.work_queue)
    }

    fn create_source_reader(
        &self,
        stream: Arc<dyn ByteStream>,
        attributes: &PipelineAttributes,
    ) -> Result<Box<dyn DecodePipeline>> {
        Ok(Box::new(SymphoniaSourceReader::open(stream, attributes)?))
    }

    fn create_sink_writer(
        &self,
        stream: Arc<dyn ByteStream>,
        attributes: &PipelineAttributes,
    ) -> Result<Box<dyn EncodePipeline>> {
        Ok(Box::new(WavSinkWriter::open(stream, attributes)?))
    }
}
