//! Per-transfer delivery statistics.

use std::time::Duration;

use crate::rtt::RttEstimator;

/// Summary of one completed `transmit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    /// Payload length in bytes.
    pub bytes: usize,
    /// Chunks confirmed delivered.
    pub chunks: usize,
    /// Calls made to the link layer's `send` for data chunks.
    pub attempts: u64,
    /// Sends the link layer refused with `Ok(false)`.
    pub refusals: u64,
    /// Chunks the variant asked to resend after an acknowledgement timeout.
    pub retransmits: u64,
    /// Timer intervals that expired during the transfer.
    pub timeouts: u64,
    /// Wall-clock duration of the data phase, handshakes excluded.
    pub elapsed: Duration,
    /// RTT estimate at the end of the transfer.
    pub rtt: RttEstimator,
}

impl TransferReport {
    /// Payload bytes per second over the data phase.
    pub fn throughput_bps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs
    }
}
