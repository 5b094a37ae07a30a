//! Sequenced-ack variant: stop-and-wait acknowledgements over [`Frame`]s.
//!
//! - `connect` sends SYN until a SYN_ACK arrives.
//! - Each chunk travels as `DATA { seq }` and is confirmed by `ACK { seq }`.
//!   An acknowledgement that does not arrive before the retransmission
//!   timer runs out makes the engine resend the chunk.
//! - `disconnect` sends FIN until a FIN_ACK arrives, or gives up locally
//!   after `max_handshake_attempts`.
//!
//! [`SequencedResponder`] is the matching peer: it answers SYN, DATA and
//! FIN and hands each new payload to the application exactly once.
//!
//! Waiting never holds the timer lock. Acknowledgements and timer expiry
//! both wake the waiting sender through the same condvar.
//!
//! Every acknowledged exchange feeds the RTT estimate. While the timeout is
//! still shorter than the link's round trip the acknowledgement only lands
//! after the interval has expired, so it is timed from the first
//! transmission instead. That can overestimate the round trip but never
//! underestimates it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::config::SequencedConfig;
use crate::error::{Result, StrandLinkError};
use crate::frame::Frame;
use crate::link::{DataReceiveListener, LinkLayer};
use crate::retry::{self, RetryPolicy};
use crate::timer::Timer;
use crate::variant::{Confirmation, SessionContext, TransportVariant};

/// Timer id used for the opening handshake.
const HANDSHAKE_SEQ: u32 = 0;
/// Upper bound on a single acknowledgement wait.
const MAX_ACK_WAIT: Duration = Duration::from_secs(1);
/// Send attempts the responder makes for each reply.
const REPLY_ATTEMPTS: u32 = 3;

#[derive(Debug, Default)]
struct AckSlots {
    syn_acked: bool,
    fin_acked: bool,
    /// Highest data sequence number acknowledged so far.
    highest_acked: Option<u32>,
}

/// Data chunk awaiting its acknowledgement.
#[derive(Debug, Clone, Copy)]
struct InFlight {
    seq: u32,
    first_sent: Instant,
    resends: u32,
}

#[derive(Default)]
struct AckState {
    slots: Mutex<AckSlots>,
    signal: Condvar,
}

/// Sender side of the sequenced-ack protocol.
pub struct SequencedAck {
    config: SequencedConfig,
    acks: Arc<AckState>,
    /// Sequence number the next encoded chunk will carry.
    next_seq: u32,
    in_flight: Option<InFlight>,
}

impl SequencedAck {
    pub fn new(config: SequencedConfig) -> Self {
        Self {
            config,
            acks: Arc::new(AckState::default()),
            next_seq: 0,
            in_flight: None,
        }
    }

    /// Minimum time to wait for an acknowledgement on the given attempt.
    fn wait_floor(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.config
            .ack_wait_floor
            .saturating_mul(1u32 << shift)
            .min(MAX_ACK_WAIT)
    }

    /// Block until `acked` holds, or until both the running timer interval
    /// and the attempt's wait floor have elapsed.
    fn await_ack(
        &self,
        ctx: &SessionContext<'_>,
        attempt: u32,
        acked: impl Fn(&AckSlots) -> bool,
    ) -> bool {
        let floor = Instant::now() + self.wait_floor(attempt);
        let mut slots = self.acks.slots.lock();
        loop {
            if acked(&*slots) {
                return true;
            }
            let now = Instant::now();
            let deadline = match ctx.timer.remaining() {
                Some(remaining) => (now + remaining).max(floor),
                None => floor,
            };
            if now >= deadline {
                return false;
            }
            self.acks.signal.wait_until(&mut slots, deadline);
        }
    }

    /// Send `frame` until `acked` holds, restarting the timer on each try.
    fn exchange(
        &self,
        ctx: &SessionContext<'_>,
        frame: &Frame,
        timer_seq: u32,
        acked: impl Fn(&AckSlots) -> bool,
    ) -> Result<bool> {
        let encoded = frame.encode();
        let first_sent = Instant::now();
        for attempt in 1..=self.config.max_handshake_attempts {
            ctx.timer.start(timer_seq)?;
            ctx.send(&encoded, timer_seq)?;
            if self.await_ack(ctx, attempt, &acked) {
                record_round_trip(ctx.timer, timer_seq, first_sent, attempt == 1);
                return Ok(true);
            }
            tracing::debug!(
                frame = ?frame.frame_type(),
                attempt,
                timeout_ms = ctx.timer.timeout().as_millis() as u64,
                "handshake frame unanswered"
            );
        }
        ctx.timer.stop(timer_seq, false);
        Ok(false)
    }
}

impl Default for SequencedAck {
    fn default() -> Self {
        Self::new(SequencedConfig::default())
    }
}

impl TransportVariant for SequencedAck {
    fn inst_handlers(&mut self) -> Result<()> {
        *self.acks.slots.lock() = AckSlots::default();
        self.next_seq = 0;
        self.in_flight = None;
        Ok(())
    }

    fn start_handlers(&mut self, ctx: &SessionContext<'_>) -> Result<()> {
        let acks = Arc::clone(&self.acks);
        ctx.timer.set_timeout_listener(move |_seq| {
            let _slots = acks.slots.lock();
            acks.signal.notify_all();
        });
        Ok(())
    }

    fn connect(&mut self, ctx: &SessionContext<'_>) -> Result<()> {
        if self.exchange(ctx, &Frame::Syn, HANDSHAKE_SEQ, |s| s.syn_acked)? {
            tracing::debug!("SYN acknowledged");
            return Ok(());
        }
        Err(StrandLinkError::HandshakeFailed(format!(
            "no SYN_ACK after {} attempts",
            self.config.max_handshake_attempts
        )))
    }

    fn disconnect(&mut self, ctx: &SessionContext<'_>) -> Result<()> {
        if self.exchange(ctx, &Frame::Fin, self.next_seq, |s| s.fin_acked)? {
            tracing::debug!("FIN acknowledged");
        } else {
            tracing::warn!(
                attempts = self.config.max_handshake_attempts,
                "no FIN_ACK received, closing anyway"
            );
        }
        Ok(())
    }

    fn receive_listener(
        &self,
        app: Arc<dyn DataReceiveListener>,
    ) -> Arc<dyn DataReceiveListener> {
        Arc::new(AckListener {
            acks: Arc::clone(&self.acks),
            app,
        })
    }

    fn encode_chunk(&mut self, seq: u32, chunk: Bytes) -> Bytes {
        self.next_seq = self.next_seq.max(seq.wrapping_add(1));
        self.in_flight = Some(InFlight {
            seq,
            first_sent: Instant::now(),
            resends: 0,
        });
        Frame::Data {
            seq,
            payload: chunk,
        }
        .encode()
    }

    fn confirm_chunk(&mut self, seq: u32, ctx: &SessionContext<'_>) -> Result<Confirmation> {
        let flight = match self.in_flight {
            Some(flight) if flight.seq == seq => flight,
            _ => InFlight {
                seq,
                first_sent: Instant::now(),
                resends: 0,
            },
        };

        if self.await_ack(ctx, flight.resends + 1, |s| {
            s.highest_acked.is_some_and(|acked| acked >= seq)
        }) {
            self.in_flight = None;
            record_round_trip(ctx.timer, seq, flight.first_sent, flight.resends == 0);
            return Ok(Confirmation::Delivered);
        }

        let resends = flight.resends + 1;
        if let Some(max) = self.config.max_retransmits {
            if resends > max {
                return Err(StrandLinkError::RetriesExhausted {
                    seq,
                    attempts: resends,
                });
            }
        }
        tracing::debug!(seq, resends, "ACK timed out, retransmitting");
        self.in_flight = Some(InFlight { resends, ..flight });
        Ok(Confirmation::Retransmit)
    }
}

/// Fold the round trip of an acknowledged exchange into the estimate.
///
/// A first transmission still being timed is stopped with a sample as
/// usual. Otherwise its interval has expired or been restarted and the
/// round trip is measured from `first_sent`.
fn record_round_trip(timer: &Timer, seq: u32, first_sent: Instant, first_attempt: bool) {
    if first_attempt && timer.stop(seq, true) {
        return;
    }
    timer.stop(seq, false);
    timer.record_sample(first_sent.elapsed());
}

/// Listener installed on the sender's link: records acknowledgements and
/// forwards any inbound data payloads to the application.
struct AckListener {
    acks: Arc<AckState>,
    app: Arc<dyn DataReceiveListener>,
}

impl DataReceiveListener for AckListener {
    fn on_data(&self, data: Bytes) {
        let frame = match Frame::decode(&data) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(%err, len = data.len(), "dropping undecodable frame");
                return;
            }
        };

        {
            let mut slots = self.acks.slots.lock();
            match frame {
                Frame::SynAck => slots.syn_acked = true,
                Frame::FinAck => slots.fin_acked = true,
                Frame::Ack { seq } => {
                    slots.highest_acked = Some(slots.highest_acked.map_or(seq, |h| h.max(seq)));
                }
                Frame::Data { payload, .. } => {
                    drop(slots);
                    self.app.on_data(payload);
                    return;
                }
                Frame::Syn | Frame::Fin => {
                    tracing::debug!("ignoring peer handshake on sender");
                    return;
                }
            }
        }
        self.acks.signal.notify_all();
    }
}

/// Where an inbound data chunk sits relative to the next expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrival {
    /// Already delivered; acknowledged again but not delivered.
    Duplicate,
    /// The next chunk in order.
    Next,
    /// Beyond the next chunk; never delivered and never acknowledged.
    Ahead,
}

impl Arrival {
    fn classify(seq: u32, next_expected: u32) -> Self {
        match seq.cmp(&next_expected) {
            std::cmp::Ordering::Less => Arrival::Duplicate,
            std::cmp::Ordering::Equal => Arrival::Next,
            std::cmp::Ordering::Greater => Arrival::Ahead,
        }
    }
}

#[derive(Debug, Default)]
struct ResponderState {
    /// Sequence number of the next payload to hand to the application.
    next_expected: u32,
    delivered: u64,
    closed: bool,
}

/// Receiver side of the sequenced-ack protocol.
///
/// Replies go out on the link the responder was attached to. Payloads are
/// delivered in order, once each; duplicates are re-acknowledged but not
/// delivered again, and chunks ahead of the sequence are dropped unanswered.
pub struct SequencedResponder {
    link: Arc<dyn LinkLayer>,
    app: Arc<dyn DataReceiveListener>,
    state: Mutex<ResponderState>,
}

impl SequencedResponder {
    /// Create a responder and subscribe it to `link`.
    pub fn attach(
        link: Arc<dyn LinkLayer>,
        app: Arc<dyn DataReceiveListener>,
    ) -> Arc<SequencedResponder> {
        let responder = Arc::new(SequencedResponder {
            link: Arc::clone(&link),
            app,
            state: Mutex::new(ResponderState::default()),
        });
        link.subscribe_receive_listener(Arc::clone(&responder) as Arc<dyn DataReceiveListener>);
        responder
    }

    /// Payloads handed to the application.
    pub fn delivered(&self) -> u64 {
        self.state.lock().delivered
    }

    /// Whether a FIN has been received since the last SYN.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn reply(&self, frame: Frame) {
        let policy = RetryPolicy::bounded(REPLY_ATTEMPTS);
        if let Err(err) = retry::send_with_retry(self.link.as_ref(), &frame.encode(), 0, &policy) {
            tracing::debug!(%err, frame = ?frame.frame_type(), "responder reply failed");
        }
    }
}

impl DataReceiveListener for SequencedResponder {
    fn on_data(&self, data: Bytes) {
        let frame = match Frame::decode(&data) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(%err, len = data.len(), "responder dropping undecodable frame");
                return;
            }
        };

        match frame {
            Frame::Syn => {
                {
                    let mut state = self.state.lock();
                    state.next_expected = 0;
                    state.closed = false;
                }
                self.reply(Frame::SynAck);
            }
            Frame::Data { seq, payload } => {
                let arrival = {
                    let mut state = self.state.lock();
                    let arrival = Arrival::classify(seq, state.next_expected);
                    if arrival == Arrival::Next {
                        state.next_expected = state.next_expected.wrapping_add(1);
                        state.delivered += 1;
                    }
                    arrival
                };
                match arrival {
                    Arrival::Next => self.app.on_data(payload),
                    Arrival::Duplicate => {
                        tracing::debug!(seq, "responder suppressed duplicate chunk");
                    }
                    Arrival::Ahead => {
                        tracing::debug!(seq, "responder dropped chunk ahead of sequence");
                        return;
                    }
                }
                self.reply(Frame::Ack { seq });
            }
            Frame::Fin => {
                self.state.lock().closed = true;
                self.reply(Frame::FinAck);
            }
            Frame::SynAck | Frame::Ack { .. } | Frame::FinAck => {
                tracing::debug!(frame = ?frame.frame_type(), "responder ignoring acknowledgement");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::loopback::LoopbackLink;

    fn collector() -> (Arc<Mutex<Vec<Bytes>>>, Arc<dyn DataReceiveListener>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, Arc::new(move |data: Bytes| sink.lock().push(data)))
    }

    #[test]
    fn chunks_are_framed_as_data() {
        let mut variant = SequencedAck::default();
        let framed = variant.encode_chunk(3, Bytes::from_static(b"abc"));
        assert_eq!(
            Frame::decode(&framed).unwrap(),
            Frame::Data {
                seq: 3,
                payload: Bytes::from_static(b"abc")
            }
        );
        assert_eq!(variant.next_seq, 4);
    }

    #[test]
    fn listener_records_acks_and_forwards_data() {
        let variant = SequencedAck::default();
        let (seen, app) = collector();
        let listener = variant.receive_listener(app);

        listener.on_data(Frame::SynAck.encode());
        listener.on_data(Frame::Ack { seq: 4 }.encode());
        listener.on_data(Frame::Ack { seq: 2 }.encode());
        listener.on_data(
            Frame::Data {
                seq: 0,
                payload: Bytes::from_static(b"reply"),
            }
            .encode(),
        );
        listener.on_data(Bytes::from_static(&[0xee]));

        let slots = variant.acks.slots.lock();
        assert!(slots.syn_acked);
        assert!(!slots.fin_acked);
        assert_eq!(slots.highest_acked, Some(4));
        assert_eq!(seen.lock().as_slice(), &[Bytes::from_static(b"reply")]);
    }

    #[test]
    fn inst_handlers_clears_previous_session() {
        let mut variant = SequencedAck::default();
        let listener = variant.receive_listener(Arc::new(crate::link::DiscardListener));
        listener.on_data(Frame::Ack { seq: 9 }.encode());
        variant.encode_chunk(9, Bytes::new());

        variant.inst_handlers().unwrap();
        assert_eq!(variant.acks.slots.lock().highest_acked, None);
        assert_eq!(variant.next_seq, 0);
    }

    #[test]
    fn wait_floor_doubles_and_caps() {
        let variant = SequencedAck::new(SequencedConfig {
            ack_wait_floor: Duration::from_millis(10),
            ..SequencedConfig::default()
        });
        assert_eq!(variant.wait_floor(1), Duration::from_millis(10));
        assert_eq!(variant.wait_floor(3), Duration::from_millis(40));
        assert_eq!(variant.wait_floor(40), MAX_ACK_WAIT);
    }

    #[test]
    fn responder_acks_and_deduplicates() {
        let (sender_end, responder_end) = LoopbackLink::pair();
        let (acks, ack_sink) = collector();
        sender_end.subscribe_receive_listener(ack_sink);

        let (payloads, app) = collector();
        let responder = SequencedResponder::attach(Arc::new(responder_end), app);

        sender_end.send(&Frame::Syn.encode()).unwrap();
        for seq in [0, 1, 1, 2] {
            let chunk = Frame::Data {
                seq,
                payload: Bytes::from(format!("chunk-{seq}")),
            };
            sender_end.send(&chunk.encode()).unwrap();
        }
        sender_end.send(&Frame::Fin.encode()).unwrap();

        assert_eq!(responder.delivered(), 3);
        assert!(responder.is_closed());
        assert_eq!(
            payloads.lock().as_slice(),
            &[
                Bytes::from_static(b"chunk-0"),
                Bytes::from_static(b"chunk-1"),
                Bytes::from_static(b"chunk-2"),
            ]
        );

        let replies: Vec<Frame> = acks
            .lock()
            .iter()
            .map(|b| Frame::decode(b).unwrap())
            .collect();
        assert_eq!(
            replies,
            vec![
                Frame::SynAck,
                Frame::Ack { seq: 0 },
                Frame::Ack { seq: 1 },
                Frame::Ack { seq: 1 },
                Frame::Ack { seq: 2 },
                Frame::FinAck,
            ]
        );
    }

    #[test]
    fn responder_drops_chunk_ahead_of_sequence() {
        let (sender_end, responder_end) = LoopbackLink::pair();
        let (acks, ack_sink) = collector();
        sender_end.subscribe_receive_listener(ack_sink);

        let (payloads, app) = collector();
        let responder = SequencedResponder::attach(Arc::new(responder_end), app);

        sender_end.send(&Frame::Syn.encode()).unwrap();
        let ahead = Frame::Data {
            seq: 2,
            payload: Bytes::from_static(b"early"),
        };
        sender_end.send(&ahead.encode()).unwrap();
        assert_eq!(responder.delivered(), 0);
        assert!(payloads.lock().is_empty());
        assert_eq!(acks.lock().len(), 1);

        let next = Frame::Data {
            seq: 0,
            payload: Bytes::from_static(b"first"),
        };
        sender_end.send(&next.encode()).unwrap();
        assert_eq!(responder.delivered(), 1);
        assert_eq!(payloads.lock().as_slice(), &[Bytes::from_static(b"first")]);
        assert_eq!(
            Frame::decode(&acks.lock()[1]).unwrap(),
            Frame::Ack { seq: 0 }
        );
    }

    #[test]
    fn arrival_classification() {
        assert_eq!(Arrival::classify(3, 5), Arrival::Duplicate);
        assert_eq!(Arrival::classify(5, 5), Arrival::Next);
        assert_eq!(Arrival::classify(6, 5), Arrival::Ahead);
    }

    fn ago(ms: u64) -> Instant {
        Instant::now()
            .checked_sub(Duration::from_millis(ms))
            .unwrap()
    }

    #[test]
    fn round_trip_sampled_by_running_interval() {
        let timer = Timer::new(&crate::config::TimerConfig::default());
        let sent = ago(30);
        timer.start_at(1, sent).unwrap();

        record_round_trip(&timer, 1, sent, true);

        assert!(!timer.is_running());
        assert!(timer.rtt().sample_rtt() >= 30);
    }

    #[test]
    fn round_trip_after_expiry_measured_from_first_send() {
        let timer = Timer::new(&crate::config::TimerConfig::default());
        let sent = ago(40);
        timer.start_at(2, sent).unwrap();
        // The clock force-stops expired intervals without a sample.
        timer.stop(2, false);

        record_round_trip(&timer, 2, sent, true);

        assert!(timer.rtt().sample_rtt() >= 40);
        assert!(timer.timeout() > Duration::from_millis(1));
    }

    #[test]
    fn retransmitted_round_trip_ignores_restarted_interval() {
        let timer = Timer::new(&crate::config::TimerConfig::default());
        let first = ago(50);
        timer.start_at(3, first).unwrap();
        // Restarted for the resend 5 ms ago.
        timer.start_at(3, ago(5)).unwrap();

        record_round_trip(&timer, 3, first, false);

        assert!(!timer.is_running());
        assert!(timer.rtt().sample_rtt() >= 50);
    }
}
