//! Link-layer and receive-listener contracts, plus in-memory links.
//!
//! The reliability layer never looks behind these traits: a link may be a
//! UDP socket, a serial line or one of the in-memory links in this module.

pub mod loopback;
pub mod lossy;

use std::io;
use std::sync::Arc;

use bytes::Bytes;

/// Callback target for inbound data.
pub trait DataReceiveListener: Send + Sync {
    /// Called by the link layer with every received buffer.
    fn on_data(&self, data: Bytes);
}

impl<F> DataReceiveListener for F
where
    F: Fn(Bytes) + Send + Sync,
{
    fn on_data(&self, data: Bytes) {
        self(data)
    }
}

/// A best-effort link able to send buffers and deliver received ones.
pub trait LinkLayer: Send + Sync {
    /// Send `data` to the remote end.
    ///
    /// `Ok(false)` is a transient refusal; the caller may retry the same
    /// buffer. `Err` is an I/O fault or an interruption and is fatal to the
    /// transfer in progress.
    fn send(&self, data: &[u8]) -> io::Result<bool>;

    /// Register the listener that receives inbound data.
    fn subscribe_receive_listener(&self, listener: Arc<dyn DataReceiveListener>);
}

impl<L: LinkLayer + ?Sized> LinkLayer for Arc<L> {
    fn send(&self, data: &[u8]) -> io::Result<bool> {
        (**self).send(data)
    }

    fn subscribe_receive_listener(&self, listener: Arc<dyn DataReceiveListener>) {
        (**self).subscribe_receive_listener(listener)
    }
}

/// Listener that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardListener;

impl DataReceiveListener for DiscardListener {
    fn on_data(&self, _data: Bytes) {}
}
