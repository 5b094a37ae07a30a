use thiserror::Error;

/// All errors produced by the StrandLink reliability layer.
#[derive(Debug, Error)]
pub enum StrandLinkError {
    #[error("invalid chunk size: {0} (must be between 1 and {max} bytes)", max = u32::MAX)]
    InvalidChunkSize(usize),

    #[error("maximum send attempts ({attempts}) exhausted for chunk {seq}")]
    RetriesExhausted { seq: u32, attempts: u32 },

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("timer has been shut down")]
    TimerShutDown,

    #[error("transfer interrupted")]
    Interrupted,

    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("unknown frame type: 0x{0:02x}")]
    UnknownFrameType(u8),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StrandLinkError {
    /// Classify a link-layer I/O failure.
    ///
    /// `ErrorKind::Interrupted` is reported as [`StrandLinkError::Interrupted`];
    /// everything else is a plain I/O fault.
    pub fn from_link(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::Interrupted {
            StrandLinkError::Interrupted
        } else {
            StrandLinkError::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, StrandLinkError>;
