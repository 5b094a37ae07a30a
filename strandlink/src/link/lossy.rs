//! Link wrapper that misbehaves with configurable probability.
//!
//! Each send is independently:
//! - **refused** with probability `refuse`: `Ok(false)` is returned and
//!   nothing is forwarded, which exercises the engine's retry loop;
//! - **dropped** with probability `drop`: `Ok(true)` is returned but the
//!   buffer never reaches the inner link, which exercises acknowledgement
//!   timeouts and retransmission.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::link::{DataReceiveListener, LinkLayer};

pub struct LossyLink<L> {
    inner: L,
    /// Probability a send is refused, clamped to [0.0, 1.0].
    refuse: f64,
    /// Probability an accepted send is silently lost, clamped to [0.0, 1.0].
    drop: f64,
    refused: AtomicU64,
    dropped: AtomicU64,
}

impl<L: LinkLayer> LossyLink<L> {
    pub fn new(inner: L, refuse: f64, drop: f64) -> Self {
        Self {
            inner,
            refuse: refuse.clamp(0.0, 1.0),
            drop: drop.clamp(0.0, 1.0),
            refused: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn refused_count(&self) -> u64 {
        self.refused.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L: LinkLayer> LinkLayer for LossyLink<L> {
    fn send(&self, data: &[u8]) -> io::Result<bool> {
        if rand::random::<f64>() < self.refuse {
            self.refused.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }
        if rand::random::<f64>() < self.drop {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(len = data.len(), "lossy link dropped buffer");
            return Ok(true);
        }
        self.inner.send(data)
    }

    fn subscribe_receive_listener(&self, listener: Arc<dyn DataReceiveListener>) {
        self.inner.subscribe_receive_listener(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::loopback::LoopbackLink;

    #[test]
    fn zero_probabilities_pass_through() {
        let (a, b) = LoopbackLink::pair();
        let lossy = LossyLink::new(a, 0.0, 0.0);
        for _ in 0..100 {
            assert!(lossy.send(b"ok").unwrap());
        }
        assert_eq!(lossy.refused_count(), 0);
        assert_eq!(lossy.dropped_count(), 0);
        assert_eq!(b.backlog_len(), 100);
    }

    #[test]
    fn certain_refusal_never_forwards() {
        let (a, b) = LoopbackLink::pair();
        let lossy = LossyLink::new(a, 1.0, 0.0);
        for _ in 0..10 {
            assert!(!lossy.send(b"no").unwrap());
        }
        assert_eq!(lossy.refused_count(), 10);
        assert_eq!(b.backlog_len(), 0);
    }

    #[test]
    fn certain_drop_reports_success() {
        let (a, b) = LoopbackLink::pair();
        let lossy = LossyLink::new(a, 0.0, 1.0);
        assert!(lossy.send(b"lost").unwrap());
        assert_eq!(lossy.dropped_count(), 1);
        assert_eq!(b.backlog_len(), 0);
        assert_eq!(lossy.inner().sent_count(), 0);
    }

    #[test]
    fn probabilities_are_clamped() {
        let (a, _b) = LoopbackLink::pair();
        let lossy = LossyLink::new(a, -1.0, 2.0);
        assert!(lossy.send(b"x").unwrap());
        assert_eq!(lossy.dropped_count(), 1);
    }
}
