//! # Audio Formats
//!
//! MP4/AAC reading and writing on top of a platform media pipeline.
//!
//! ## Overview
//!
//! This crate handles:
//! - Byte-stream adapters exposing caller streams to the platform
//! - Buffered random-access reads of decoded 32-bit PCM
//! - Timestamped 16-bit PCM submission to an encoder
//! - Format capabilities, quality tiers and a registry for lookup by file name
//!
//! The platform itself (decoders, encoders, work queues) is supplied through
//! [`bridge_traits::MediaPlatform`].

pub mod bytestream;
pub mod config;
pub mod error;
pub mod format;
pub mod reader;
pub mod registry;
pub mod traits;
pub mod writer;

pub use bytestream::{AsyncWriteRequest, InputByteStream, OutputByteStream, StreamDescriptor};
pub use config::FormatsConfig;
pub use error::{FormatError, Result};
pub use format::{Mp4AudioFormat, QualityTier, MP4_FORMAT_NAME, QUALITY_OPTIONS};
pub use reader::Mp4AudioReader;
pub use registry::FormatRegistry;
pub use traits::{AudioFormat, AudioFormatReader, AudioFormatWriter, ChannelLayout, WriterOptions};
pub use writer::Mp4AudioWriter;
