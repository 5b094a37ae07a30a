//! Null variant: no handshake, no framing, no acknowledgements.
//!
//! Chunks go on the wire as raw payload slices and count as delivered as
//! soon as the link accepts them. Suitable for links that are already
//! reliable and for exercising the engine on its own.

use crate::error::Result;
use crate::variant::{SessionContext, TransportVariant};

#[derive(Debug, Clone, Copy, Default)]
pub struct NullVariant;

impl NullVariant {
    pub fn new() -> Self {
        Self
    }
}

impl TransportVariant for NullVariant {
    fn connect(&mut self, _ctx: &SessionContext<'_>) -> Result<()> {
        tracing::trace!("null variant: connect");
        Ok(())
    }

    fn disconnect(&mut self, _ctx: &SessionContext<'_>) -> Result<()> {
        tracing::trace!("null variant: disconnect");
        Ok(())
    }
}
