//! # Format Error Types
//!
//! Error types for the MP4/AAC reader, writer and byte-stream adapters.

use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur while reading or writing an audio format.
#[derive(Error, Debug)]
pub enum FormatError {
    // ========================================================================
    // Construction Rejections
    // ========================================================================
    /// Requested sample rate is not one the format can write.
    #[error("Unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    /// Requested or reported bit depth is not supported.
    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u32),

    /// Channel count has no matching layout.
    #[error("Unsupported channel count: {0}")]
    UnsupportedChannelCount(u32),

    /// Explicit channel layout is not supported.
    #[error("Unsupported channel layout: {0}")]
    UnsupportedChannelLayout(String),

    /// Metadata was supplied but the writer cannot store it.
    #[error("Metadata is not supported ({0} entries supplied)")]
    MetadataNotSupported(usize),

    /// Quality option index is outside the advertised list.
    #[error("Unsupported quality option index: {0}")]
    UnsupportedQuality(i32),

    // ========================================================================
    // Platform Errors
    // ========================================================================
    /// A platform call failed; the platform's own error is kept.
    #[error("Platform error: {0}")]
    Platform(#[from] BridgeError),

    // ========================================================================
    // State Errors
    // ========================================================================
    /// The reader or writer failed construction and has no pipeline.
    #[error("{0} is not open")]
    NotOpen(&'static str),

    /// A previous read hit a decode error; the reader no longer produces data.
    #[error("Reader stopped after a previous decode error")]
    ReaderFailed,

    /// Opened stream did not describe decodable audio.
    #[error("Invalid audio stream: {0}")]
    InvalidStream(String),

    /// Destination buffers are too small or missing.
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),

    /// No registered format handles the requested file.
    #[error("No format handles {0}")]
    NoMatchingFormat(String),

    /// Configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FormatError {
    /// Returns true if the error was raised by writer/reader parameter validation.
    pub fn is_construction_rejection(&self) -> bool {
        matches!(
            self,
            FormatError::UnsupportedSampleRate(_)
                | FormatError::UnsupportedBitDepth(_)
                | FormatError::UnsupportedChannelCount(_)
                | FormatError::UnsupportedChannelLayout(_)
                | FormatError::MetadataNotSupported(_)
                | FormatError::UnsupportedQuality(_)
        )
    }

    /// Returns true if the error came from the platform or a caller stream.
    pub fn is_platform_error(&self) -> bool {
        matches!(self, FormatError::Platform(_))
    }

    /// Returns true for unsupported operations on a byte-stream adapter.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, FormatError::Platform(e) if e.is_not_implemented())
    }
}

/// Result type for format operations.
pub type Result<T> = std::result::Result<T, FormatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_rejections() {
        assert!(FormatError::UnsupportedQuality(9).is_construction_rejection());
        assert!(FormatError::MetadataNotSupported(1).is_construction_rejection());
        assert!(!FormatError::ReaderFailed.is_construction_rejection());
    }

    #[test]
    fn test_platform_errors() {
        let err: FormatError = BridgeError::NotImplemented("read").into();
        assert!(err.is_platform_error());
        assert!(err.is_not_implemented());

        let err: FormatError = BridgeError::WriteFailed(4).into();
        assert!(!err.is_not_implemented());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            FormatError::UnsupportedSampleRate(22050).to_string(),
            "Unsupported sample rate: 22050 Hz"
        );
        assert_eq!(FormatError::NotOpen("writer").to_string(), "writer is not open");
    }
}
