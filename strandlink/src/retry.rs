//! Retry discipline for chunks the link layer refuses.
//!
//! The default policy retries immediately and forever, which is what a
//! link that only ever refuses transiently needs. Bounded attempts and
//! exponential backoff are available for links that can fail permanently.

use std::thread;
use std::time::Duration;

use crate::error::{Result, StrandLinkError};
use crate::link::LinkLayer;

/// Delay inserted between consecutive send attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,
    /// Wait `initial`, then double on every further attempt, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

/// How many times, and how fast, a refused chunk is re-sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Total send attempts per chunk, including the first. `None` is unbounded.
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Retry forever with no delay.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Give up after `max_attempts` attempts.
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            backoff: Backoff::None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows(&self, attempts: u32) -> bool {
        match self.max_attempts {
            None => true,
            Some(max) => attempts < max,
        }
    }

    /// Delay before the attempt following `attempts` failed ones.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Exponential { initial, max } => {
                let shift = attempts.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

/// Result of handing one buffer to the link layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendOutcome {
    /// Calls made to `LinkLayer::send`, the successful one included.
    pub attempts: u32,
    /// Calls the link refused with `Ok(false)`.
    pub refusals: u32,
}

/// Send `data` until the link accepts it or `policy` gives up.
///
/// The identical buffer is re-sent on every attempt. Link I/O errors end
/// the loop immediately.
pub fn send_with_retry(
    link: &dyn LinkLayer,
    data: &[u8],
    seq: u32,
    policy: &RetryPolicy,
) -> Result<SendOutcome> {
    let mut attempts: u32 = 0;
    loop {
        attempts = attempts.saturating_add(1);
        if link.send(data).map_err(StrandLinkError::from_link)? {
            return Ok(SendOutcome {
                attempts,
                refusals: attempts - 1,
            });
        }

        tracing::debug!(seq, attempt = attempts, len = data.len(), "link refused send");
        if !policy.allows(attempts) {
            return Err(StrandLinkError::RetriesExhausted { seq, attempts });
        }
        let delay = policy.delay_for(attempts);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::link::DataReceiveListener;

    /// Refuses the first `refusals` sends, then accepts.
    struct FlakyLink {
        refusals: u32,
        calls: AtomicU32,
    }

    impl LinkLayer for FlakyLink {
        fn send(&self, _data: &[u8]) -> io::Result<bool> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(call >= self.refusals)
        }

        fn subscribe_receive_listener(&self, _listener: Arc<dyn DataReceiveListener>) {}
    }

    struct BrokenLink;

    impl LinkLayer for BrokenLink {
        fn send(&self, _data: &[u8]) -> io::Result<bool> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }

        fn subscribe_receive_listener(&self, _listener: Arc<dyn DataReceiveListener>) {}
    }

    #[test]
    fn retries_until_accepted() {
        let link = FlakyLink {
            refusals: 2,
            calls: AtomicU32::new(0),
        };
        let outcome = send_with_retry(&link, b"chunk", 0, &RetryPolicy::unbounded()).unwrap();
        assert_eq!(
            outcome,
            SendOutcome {
                attempts: 3,
                refusals: 2
            }
        );
    }

    #[test]
    fn bounded_policy_gives_up() {
        let link = FlakyLink {
            refusals: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let err = send_with_retry(&link, b"chunk", 4, &RetryPolicy::bounded(3)).unwrap_err();
        assert!(matches!(
            err,
            StrandLinkError::RetriesExhausted {
                seq: 4,
                attempts: 3
            }
        ));
        assert_eq!(link.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn io_error_is_fatal() {
        let err = send_with_retry(&BrokenLink, b"chunk", 0, &RetryPolicy::unbounded()).unwrap_err();
        assert!(matches!(err, StrandLinkError::Io(_)));
    }

    #[test]
    fn unbounded_always_allows() {
        let policy = RetryPolicy::unbounded();
        assert!(policy.allows(0));
        assert!(policy.allows(u32::MAX - 1));
        assert_eq!(policy.delay_for(10), Duration::ZERO);
    }

    #[test]
    fn bounded_stops_at_limit() {
        let policy = RetryPolicy::bounded(3);
        assert!(policy.allows(1));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }

    #[test]
    fn bounded_never_below_one_attempt() {
        assert_eq!(RetryPolicy::bounded(0).max_attempts, Some(1));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = RetryPolicy::unbounded().with_backoff(Backoff::Exponential {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
        });
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
        assert_eq!(policy.delay_for(4), Duration::from_millis(50));
        assert_eq!(policy.delay_for(64), Duration::from_millis(50));
    }
}
