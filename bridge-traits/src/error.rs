use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The operation exists on the interface but this object does not support it.
    #[error("Operation not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The object was asked to do something its current state cannot satisfy.
    #[error("Unexpected state: {0}")]
    Unexpected(String),

    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("Attribute has a different type: {0}")]
    AttributeTypeMismatch(String),

    #[error("Attribute is read-only: {0}")]
    AttributeReadOnly(String),

    #[error("Stream write of {0} bytes failed")]
    WriteFailed(usize),

    #[error("Stream read failed")]
    ReadFailed,

    #[error("Seek to {offset} failed")]
    SeekFailed { offset: i64 },

    #[error("Seek to {offset} is outside the stream (length {length})")]
    SeekOutOfRange { offset: i64, length: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns true for errors raised by calling an unsupported operation.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, BridgeError::NotImplemented(_))
    }

    /// Returns true for failures reported by the wrapped caller stream.
    pub fn is_stream_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::WriteFailed(_)
                | BridgeError::ReadFailed
                | BridgeError::SeekFailed { .. }
                | BridgeError::SeekOutOfRange { .. }
                | BridgeError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
