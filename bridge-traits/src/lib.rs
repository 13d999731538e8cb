//! # Host Bridge Traits
//!
//! Platform abstraction traits shared by the format layer and each media
//! platform implementation.
//!
//! ## Overview
//!
//! This crate defines the contract between the audio format code and the
//! platform that actually decodes and encodes. The format layer wraps caller
//! byte streams into platform [`ByteStream`]s, hands them to a
//! [`MediaPlatform`] and drives the resulting pipelines.
//!
//! ## Traits
//!
//! ### Caller Streams
//! - [`InputStream`](stream::InputStream) / [`OutputStream`](stream::OutputStream) - Minimal random-access streams supplied by the host
//!
//! ### Platform Objects
//! - [`ByteStream`](byte_stream::ByteStream) - Seekable, shareable stream with async I/O
//! - [`Attributes`](attributes::Attributes) - GUID-keyed property bags
//! - [`AsyncCallback`](byte_stream::AsyncCallback) - Completion receiver for async operations
//! - [`WorkQueue`](background::WorkQueue) - Worker threads that run completions
//!
//! ### Pipelines
//! - [`DecodePipeline`](pipeline::DecodePipeline) - Container parsing and decoding to PCM
//! - [`EncodePipeline`](pipeline::EncodePipeline) - Encoding and container muxing
//! - [`MediaPlatform`](pipeline::MediaPlatform) - Platform init and pipeline factories
//!
//! ### Utilities
//! - [`LoggerSink`](log::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Software pipelines |
//! | Windows  | TBD                 | 📋 Planned (native codecs) |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Report unsupported operations as `BridgeError::NotImplemented`
//! - Include context (offsets, lengths, stream indices) in messages
//!
//! ## Thread Safety
//!
//! Byte streams, callbacks, work queues and platforms are `Send + Sync` on
//! native targets: completions run on platform worker threads.

pub mod attributes;
pub mod background;
pub mod byte_stream;
pub mod error;
pub mod log;
pub mod pipeline;
pub mod platform;
pub mod stream;

pub use error::BridgeError;

// Re-export commonly used types
pub use attributes::{AttributeKey, AttributeStore, AttributeValue, Attributes};
pub use background::{InlineWorkQueue, WorkQueue};
pub use byte_stream::{
    AsyncCallback, AsyncResult, AsyncState, ByteStream, ByteStreamCapabilities,
    CallbackParameters, CompletionStatus, SeekOrigin, WorkQueueId,
};
pub use pipeline::{
    AudioSubtype, ContainerType, DecodePipeline, EncodePipeline, MediaBuffer, MediaPlatform,
    MediaSample, MediaType, PipelineAttributes, PlatformSession, ReadFlags, ReadOutcome,
    StreamSelector, HNS_PER_SECOND,
};
pub use stream::{InputStream, OutputStream, SharedInputStream, SharedOutputStream};
pub use log::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
