//! Configuration for transfers, the retransmission timer and the
//! sequenced-ack variant.

use std::time::Duration;

use crate::error::{Result, StrandLinkError};
use crate::retry::RetryPolicy;

/// Default chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 20;
/// Largest chunk a DATA frame's 32-bit length field can describe.
pub const MAX_CHUNK_SIZE: usize = u32::MAX as usize;

/// Configuration for the retransmission timer.
#[derive(Debug, Clone, Default)]
pub struct TimerConfig {
    /// Emit timer lifecycle events at `DEBUG` instead of `TRACE`.
    pub debug: bool,
}

/// Configuration for a [`crate::protocol::TransportProtocol`].
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Maximum number of payload bytes per chunk.
    pub chunk_size: usize,
    /// Diagnostic verbosity. Never changes protocol behaviour.
    pub debug: bool,
    /// What to do when the link layer refuses a chunk.
    pub retry: RetryPolicy,
    /// Timer settings.
    pub timer: TimerConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            debug: false,
            retry: RetryPolicy::default(),
            timer: TimerConfig::default(),
        }
    }
}

impl TransferConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self.timer.debug = debug;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(StrandLinkError::InvalidChunkSize(self.chunk_size));
        }
        Ok(())
    }
}

/// Configuration for [`crate::variant::sequenced::SequencedAck`].
#[derive(Debug, Clone)]
pub struct SequencedConfig {
    /// SYN / FIN transmissions before the handshake is abandoned.
    pub max_handshake_attempts: u32,
    /// Retransmissions allowed per data chunk. `None` retries forever.
    pub max_retransmits: Option<u32>,
    /// Shortest wait for an acknowledgement, even when the timer has already
    /// run out. Keeps a 1 ms initial timeout from degenerating into a spin.
    pub ack_wait_floor: Duration,
}

impl Default for SequencedConfig {
    fn default() -> Self {
        Self {
            max_handshake_attempts: 10,
            max_retransmits: None,
            ack_wait_floor: Duration::from_millis(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.chunk_size, 20);
        assert!(!config.debug);
        assert!(config.retry.max_attempts.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let config = TransferConfig::default().with_chunk_size(0);
        assert!(matches!(
            config.validate(),
            Err(StrandLinkError::InvalidChunkSize(0))
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn chunk_size_beyond_frame_length_field_rejected() {
        let too_big = MAX_CHUNK_SIZE + 1;
        let config = TransferConfig::default().with_chunk_size(too_big);
        assert!(matches!(
            config.validate(),
            Err(StrandLinkError::InvalidChunkSize(n)) if n == too_big
        ));
        TransferConfig::default()
            .with_chunk_size(MAX_CHUNK_SIZE)
            .validate()
            .unwrap();
    }

    #[test]
    fn debug_flag_propagates_to_timer() {
        let config = TransferConfig::default().with_debug(true);
        assert!(config.debug);
        assert!(config.timer.debug);
    }
}
