//! StrandLink -- reliability layer over a best-effort link for the Strand
//! Protocol stack.
//!
//! Two cooperating pieces:
//! - **Adaptive retransmission timer**: EWMA round-trip estimation
//!   (α = 1/8, β = 1/4, timeout = EST + 4·DEV) with a background clock
//!   that raises timeout events.
//! - **Chunked transmission engine**: splits a payload into fixed-size
//!   chunks and pushes them through the link one at a time, retrying
//!   refused sends and delegating handshakes and acknowledgements to a
//!   pluggable transport variant.

pub mod chunk;
pub mod config;
pub mod error;
pub mod frame;
pub mod link;
pub mod protocol;
pub mod retry;
pub mod rtt;
pub mod source;
pub mod stats;
pub mod timer;
pub mod variant;

// Re-export key public types at crate root.
pub use chunk::ChunkPlan;
pub use config::{SequencedConfig, TimerConfig, TransferConfig};
pub use error::{Result, StrandLinkError};
pub use frame::Frame;
pub use link::{DataReceiveListener, LinkLayer};
pub use protocol::{SessionState, TransportProtocol};
pub use retry::{Backoff, RetryPolicy};
pub use rtt::RttEstimator;
pub use source::PayloadSource;
pub use stats::TransferReport;
pub use timer::Timer;
pub use variant::null::NullVariant;
pub use variant::sequenced::{SequencedAck, SequencedResponder};
pub use variant::{Confirmation, SessionContext, TransportVariant};
