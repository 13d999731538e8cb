//! # Desktop Bridge Implementations
//!
//! Software media platform for desktop targets (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate implements the bridge pipeline traits with pure-Rust
//! libraries:
//! - `SymphoniaSourceReader` decodes MP4/AAC (and other containers) using `symphonia`
//! - `WavSinkWriter` writes 16-bit PCM WAV using `hound`
//! - `RayonWorkQueue` runs asynchronous completions on a `rayon` pool
//! - `DesktopMediaPlatform` ties them together and counts sessions
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use bridge_desktop::DesktopMediaPlatform;
//! use core_formats::Mp4AudioFormat;
//!
//! let format = Mp4AudioFormat::new(Arc::new(DesktopMediaPlatform::new()));
//! ```

mod background;
mod format_hint;
mod media_io;
mod platform;
mod sample_converter;
mod sink_writer;
mod source_reader;

pub use background::RayonWorkQueue;
pub use format_hint::{extension_of, hint_for_stream};
pub use media_io::{ByteStreamSource, ByteStreamWriter};
pub use platform::DesktopMediaPlatform;
pub use sink_writer::WavSinkWriter;
pub use source_reader::SymphoniaSourceReader;
