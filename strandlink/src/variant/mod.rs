//! Transport variants: the handshake, framing and acknowledgement hooks a
//! concrete protocol plugs into the transmission engine.
//!
//! The engine owns chunking, the retry discipline and lifecycle ordering.
//! A variant decides what goes on the wire around and inside that:
//!
//! ```text
//!  inst_handlers ─▶ timer launch ─▶ start_handlers ─▶ connect
//!        ─▶ [ encode_chunk ─▶ send ─▶ confirm_chunk ]* ─▶ disconnect
//!        ─▶ timer shutdown ─▶ report_stats
//! ```

pub mod null;
pub mod sequenced;

use std::sync::Arc;

use bytes::Bytes;

use crate::config::TransferConfig;
use crate::error::Result;
use crate::link::{DataReceiveListener, LinkLayer};
use crate::retry::{self, SendOutcome};
use crate::stats::TransferReport;
use crate::timer::Timer;

/// What the engine should do after a chunk was handed to the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The chunk is delivered; move on to the next one.
    Delivered,
    /// The chunk was not acknowledged in time; send it again.
    Retransmit,
}

/// Borrowed view of a running session handed to variant hooks.
pub struct SessionContext<'a> {
    pub link: &'a dyn LinkLayer,
    pub timer: &'a Timer,
    pub config: &'a TransferConfig,
    pub debug: bool,
}

impl SessionContext<'_> {
    /// Send a buffer with the session's retry policy.
    pub fn send(&self, data: &[u8], seq: u32) -> Result<SendOutcome> {
        retry::send_with_retry(self.link, data, seq, &self.config.retry)
    }
}

/// Hooks a concrete transport supplies to the engine.
pub trait TransportVariant: Send {
    /// Prepare per-transfer handler state. Runs before the timer starts.
    fn inst_handlers(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start acknowledgement handling. Runs once the timer is running.
    fn start_handlers(&mut self, _ctx: &SessionContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Block until the remote end is ready for data chunks.
    fn connect(&mut self, ctx: &SessionContext<'_>) -> Result<()>;

    /// Block until teardown is acknowledged or local policy gives up.
    fn disconnect(&mut self, ctx: &SessionContext<'_>) -> Result<()>;

    /// Wrap the application listener before it is registered on the link.
    fn receive_listener(
        &self,
        app: Arc<dyn DataReceiveListener>,
    ) -> Arc<dyn DataReceiveListener> {
        app
    }

    /// Frame a chunk for the wire.
    fn encode_chunk(&mut self, _seq: u32, chunk: Bytes) -> Bytes {
        chunk
    }

    /// Decide whether a chunk the link accepted has been delivered.
    fn confirm_chunk(&mut self, _seq: u32, _ctx: &SessionContext<'_>) -> Result<Confirmation> {
        Ok(Confirmation::Delivered)
    }

    /// Report statistics once a transfer completes.
    fn report_stats(&self, report: &TransferReport) {
        tracing::info!(
            bytes = report.bytes,
            chunks = report.chunks,
            attempts = report.attempts,
            refusals = report.refusals,
            retransmits = report.retransmits,
            timeouts = report.timeouts,
            elapsed_ms = report.elapsed.as_millis() as u64,
            estimated_rtt_ms = report.rtt.estimated_rtt(),
            timeout_ms = report.rtt.timeout_ms(),
            "transfer complete"
        );
    }
}

impl<V: TransportVariant + ?Sized> TransportVariant for Box<V> {
    fn inst_handlers(&mut self) -> Result<()> {
        (**self).inst_handlers()
    }

    fn start_handlers(&mut self, ctx: &SessionContext<'_>) -> Result<()> {
        (**self).start_handlers(ctx)
    }

    fn connect(&mut self, ctx: &SessionContext<'_>) -> Result<()> {
        (**self).connect(ctx)
    }

    fn disconnect(&mut self, ctx: &SessionContext<'_>) -> Result<()> {
        (**self).disconnect(ctx)
    }

    fn receive_listener(
        &self,
        app: Arc<dyn DataReceiveListener>,
    ) -> Arc<dyn DataReceiveListener> {
        (**self).receive_listener(app)
    }

    fn encode_chunk(&mut self, seq: u32, chunk: Bytes) -> Bytes {
        (**self).encode_chunk(seq, chunk)
    }

    fn confirm_chunk(&mut self, seq: u32, ctx: &SessionContext<'_>) -> Result<Confirmation> {
        (**self).confirm_chunk(seq, ctx)
    }

    fn report_stats(&self, report: &TransferReport) {
        (**self).report_stats(report)
    }
}
