//! Chunked transmission engine.
//!
//! [`TransportProtocol`] moves one payload per [`transmit`] call across a
//! best-effort [`LinkLayer`]. The payload is cut into chunks, each chunk is
//! timed by a fresh [`Timer`] and re-sent until the link accepts it and the
//! variant confirms it, strictly one chunk at a time.
//!
//! Session lifecycle:
//!
//! ```text
//! Idle ─▶ TimerStarted ─▶ Connected ─▶ Sending{0..n} ─▶ Disconnected ─▶ TimerStopped ─▶ Idle
//!   ▲                                                                                   │
//!   └──────────────────────────────── any error ────────────────────────────────────────┘
//! ```
//!
//! [`transmit`]: TransportProtocol::transmit

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::chunk::{self, ChunkPlan};
use crate::config::TransferConfig;
use crate::error::{Result, StrandLinkError};
use crate::link::{DataReceiveListener, LinkLayer};
use crate::source::PayloadSource;
use crate::stats::TransferReport;
use crate::timer::Timer;
use crate::variant::{Confirmation, SessionContext, TransportVariant};

/// Per-chunk progress goes to `INFO` in debug mode, `DEBUG` otherwise.
macro_rules! chunk_event {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Where a transfer currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transfer in progress.
    Idle,
    /// Handlers installed and the timer clock running.
    TimerStarted,
    /// The remote end accepted the connection.
    Connected,
    /// Chunk `chunk` is being sent or awaiting confirmation.
    Sending { chunk: usize },
    /// Teardown finished.
    Disconnected,
    /// Timer shut down; statistics about to be reported.
    TimerStopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::TimerStarted => write!(f, "TimerStarted"),
            SessionState::Connected => write!(f, "Connected"),
            SessionState::Sending { chunk } => write!(f, "Sending({chunk})"),
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::TimerStopped => write!(f, "TimerStopped"),
        }
    }
}

/// Reliable chunked transfer over a best-effort link.
pub struct TransportProtocol<V: TransportVariant> {
    link: Arc<dyn LinkLayer>,
    /// Application listener as supplied, before the variant wrapped it.
    listener: Arc<dyn DataReceiveListener>,
    variant: V,
    config: TransferConfig,
    state: SessionState,
    /// Chunks confirmed delivered over the protocol's lifetime.
    count_sent: u64,
    last_report: Option<TransferReport>,
}

impl<V: TransportVariant> TransportProtocol<V> {
    /// Bind a variant to a link and register the receive listener on it.
    pub fn new(
        link: Arc<dyn LinkLayer>,
        listener: Arc<dyn DataReceiveListener>,
        variant: V,
        config: TransferConfig,
    ) -> Result<Self> {
        config.validate()?;
        link.subscribe_receive_listener(variant.receive_listener(Arc::clone(&listener)));
        Ok(Self {
            link,
            listener,
            variant,
            config,
            state: SessionState::Idle,
            count_sent: 0,
            last_report: None,
        })
    }

    /// Send one payload reliably.
    ///
    /// Blocks until every chunk is confirmed and the connection is closed,
    /// or until a fatal error. `debug` raises diagnostic verbosity for this
    /// call only. The timer is torn down and the state returns to
    /// [`SessionState::Idle`] on every exit path.
    pub fn transmit(
        &mut self,
        source: impl Into<PayloadSource>,
        debug: bool,
    ) -> Result<TransferReport> {
        let result = self.run(source.into(), debug || self.config.debug);
        if let Err(err) = &result {
            tracing::warn!(%err, state = %self.state, "transfer aborted");
        }
        self.state = SessionState::Idle;
        result
    }

    fn run(&mut self, source: PayloadSource, debug: bool) -> Result<TransferReport> {
        let payload = source.resolve()?;
        let plan = ChunkPlan::new(payload.len(), self.config.chunk_size)?;
        tracing::debug!(
            len = payload.len(),
            chunk_size = plan.chunk_size,
            full_chunks = plan.chunk_count,
            remainder = plan.remainder,
            "payload planned"
        );

        self.variant.inst_handlers()?;
        let mut timer_config = self.config.timer.clone();
        timer_config.debug |= debug;
        let timer = Timer::new(&timer_config);
        timer.launch()?;

        let ctx = SessionContext {
            link: self.link.as_ref(),
            timer: &timer,
            config: &self.config,
            debug,
        };
        self.variant.start_handlers(&ctx)?;
        self.state = SessionState::TimerStarted;

        tracing::info!("establishing connection");
        self.variant.connect(&ctx)?;
        self.state = SessionState::Connected;
        tracing::info!("connection established");

        let started = Instant::now();
        let mut delivered = 0usize;
        let mut attempts = 0u64;
        let mut refusals = 0u64;
        let mut retransmits = 0u64;

        for (index, chunk) in chunk::split(&payload, plan.chunk_size)?.enumerate() {
            let seq = u32::try_from(index).map_err(|_| {
                StrandLinkError::Internal(format!("chunk index {index} exceeds sequence space"))
            })?;
            self.state = SessionState::Sending { chunk: index };
            let len = chunk.len();
            let wire = self.variant.encode_chunk(seq, chunk);

            loop {
                timer.start(seq)?;
                let outcome = ctx.send(&wire, seq)?;
                attempts += u64::from(outcome.attempts);
                refusals += u64::from(outcome.refusals);
                chunk_event!(debug, seq, len, attempt = outcome.attempts, "chunk sent");

                match self.variant.confirm_chunk(seq, &ctx)? {
                    Confirmation::Delivered => {
                        timer.stop(seq, true);
                        break;
                    }
                    Confirmation::Retransmit => {
                        retransmits += 1;
                        chunk_event!(
                            debug,
                            seq,
                            timeout_ms = timer.timeout().as_millis() as u64,
                            "chunk unconfirmed, resending"
                        );
                    }
                }
            }

            delivered += 1;
            self.count_sent += 1;
        }
        let elapsed = started.elapsed();

        tracing::info!("closing connection");
        self.variant.disconnect(&ctx)?;
        self.state = SessionState::Disconnected;

        let rtt = timer.rtt();
        let timeouts = timer.timeouts();
        timer.shutdown();
        self.state = SessionState::TimerStopped;

        let report = TransferReport {
            bytes: payload.len(),
            chunks: delivered,
            attempts,
            refusals,
            retransmits,
            timeouts,
            elapsed,
            rtt,
        };
        self.variant.report_stats(&report);
        self.last_report = Some(report);
        Ok(report)
    }

    /// Chunks confirmed delivered since the protocol was created.
    pub fn count_sent(&self) -> u64 {
        self.count_sent
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn link(&self) -> &Arc<dyn LinkLayer> {
        &self.link
    }

    /// The application listener this protocol was created with.
    pub fn listener(&self) -> &Arc<dyn DataReceiveListener> {
        &self.listener
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn variant(&self) -> &V {
        &self.variant
    }

    /// Report of the most recent successful transfer.
    pub fn last_report(&self) -> Option<&TransferReport> {
        self.last_report.as_ref()
    }
}

impl<V: TransportVariant> fmt::Debug for TransportProtocol<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportProtocol")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("count_sent", &self.count_sent)
            .finish_non_exhaustive()
    }
}
