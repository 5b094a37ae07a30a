//! In-memory link connecting two endpoints inside one process.
//!
//! A send on one endpoint is delivered synchronously, on the sending
//! thread, to the listener of the other endpoint. Buffers sent before the
//! peer has subscribed are queued and flushed when it does.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;

use crate::link::{DataReceiveListener, LinkLayer};

#[derive(Default)]
struct Endpoint {
    listener: Mutex<Option<Arc<dyn DataReceiveListener>>>,
    /// Buffers that arrived before a listener was registered.
    backlog: SegQueue<Bytes>,
    delivered: AtomicU64,
}

impl Endpoint {
    fn deliver(&self, data: Bytes) {
        let listener = {
            let guard = self.listener.lock();
            match guard.as_ref() {
                Some(listener) => Arc::clone(listener),
                None => {
                    self.backlog.push(data);
                    return;
                }
            }
        };
        self.delivered.fetch_add(1, Ordering::Relaxed);
        listener.on_data(data);
    }
}

/// One end of an in-memory link pair.
pub struct LoopbackLink {
    local: Arc<Endpoint>,
    peer: Arc<Endpoint>,
    closed: Arc<AtomicBool>,
    sent: AtomicU64,
}

impl LoopbackLink {
    /// Create two connected endpoints.
    pub fn pair() -> (LoopbackLink, LoopbackLink) {
        let a = Arc::new(Endpoint::default());
        let b = Arc::new(Endpoint::default());
        let closed = Arc::new(AtomicBool::new(false));
        (
            LoopbackLink {
                local: Arc::clone(&a),
                peer: Arc::clone(&b),
                closed: Arc::clone(&closed),
                sent: AtomicU64::new(0),
            },
            LoopbackLink {
                local: b,
                peer: a,
                closed,
                sent: AtomicU64::new(0),
            },
        )
    }

    /// Tear the link down. Further sends on either end fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Buffers accepted by this endpoint's `send`.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Buffers handed to this endpoint's listener.
    pub fn delivered_count(&self) -> u64 {
        self.local.delivered.load(Ordering::Relaxed)
    }

    /// Buffers waiting for this endpoint to subscribe a listener.
    pub fn backlog_len(&self) -> usize {
        self.local.backlog.len()
    }
}

impl LinkLayer for LoopbackLink {
    fn send(&self, data: &[u8]) -> io::Result<bool> {
        if self.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "loopback link closed",
            ));
        }
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.peer.deliver(Bytes::copy_from_slice(data));
        Ok(true)
    }

    fn subscribe_receive_listener(&self, listener: Arc<dyn DataReceiveListener>) {
        let pending: Vec<Bytes> = {
            let mut guard = self.local.listener.lock();
            *guard = Some(Arc::clone(&listener));
            std::iter::from_fn(|| self.local.backlog.pop()).collect()
        };
        for data in pending {
            self.local.delivered.fetch_add(1, Ordering::Relaxed);
            listener.on_data(data);
        }
    }
}
