//! Retransmission timer with a background clock thread.
//!
//! The timer tracks at most one in-flight unit, identified by a sequence id.
//! `start` begins (or restarts) an interval, `stop` ends it and optionally
//! folds the elapsed time into the [`RttEstimator`]. A background clock
//! thread watches the running interval and, once it has been open longer
//! than the current timeout, raises a timeout event and force-stops it
//! without taking an RTT sample.
//!
//! All state sits behind one `parking_lot::Mutex`. The clock blocks on a
//! `Condvar` while idle and sleeps with a deadline while an interval is
//! running; `start`, `stop` and `shutdown` notify it so it re-evaluates
//! immediately.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::TimerConfig;
use crate::error::{Result, StrandLinkError};
use crate::rtt::RttEstimator;

/// Name given to the clock thread.
const CLOCK_THREAD_NAME: &str = "strandlink-timer";

/// Callback invoked with the sequence id of every expired interval.
pub type TimeoutListener = Arc<dyn Fn(u32) + Send + Sync>;

macro_rules! timer_event {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::debug!($($arg)+)
        } else {
            tracing::trace!($($arg)+)
        }
    };
}

/// Point-in-time copy of the timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub running: bool,
    pub alive: bool,
    pub sequence_id: Option<u32>,
    pub started_at: Option<Instant>,
    pub rtt: RttEstimator,
    pub timeout_event: bool,
    pub timeouts: u64,
}

#[derive(Debug)]
struct TimerState {
    running: bool,
    alive: bool,
    sequence_id: Option<u32>,
    started_at: Option<Instant>,
    rtt: RttEstimator,
    timeout_event: bool,
    timeouts: u64,
}

impl TimerState {
    fn new() -> Self {
        Self {
            running: false,
            alive: true,
            sequence_id: None,
            started_at: None,
            rtt: RttEstimator::new(),
            timeout_event: false,
            timeouts: 0,
        }
    }

    fn begin(&mut self, seq: u32, now: Instant, debug: bool) {
        self.sequence_id = Some(seq);
        self.started_at = Some(now);
        self.running = true;
        timer_event!(debug, seq, "timer started");
    }

    /// End the running interval if `ack` covers it. Returns whether it did.
    fn end(&mut self, ack: u32, update_rtt: bool, now: Instant, debug: bool) -> bool {
        let (Some(seq), Some(started_at)) = (self.sequence_id, self.started_at) else {
            return false;
        };
        if !self.running || ack < seq {
            return false;
        }

        self.running = false;
        if update_rtt {
            self.rtt.update_duration(now.saturating_duration_since(started_at));
            timer_event!(
                debug,
                seq,
                ack,
                sample_rtt_ms = self.rtt.sample_rtt(),
                estimated_rtt_ms = self.rtt.estimated_rtt(),
                deviation_rtt_ms = self.rtt.deviation_rtt(),
                timeout_ms = self.rtt.timeout_ms(),
                "timer stopped"
            );
        } else {
            timer_event!(debug, seq, ack, "timer stopped");
        }
        true
    }

    fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            running: self.running,
            alive: self.alive,
            sequence_id: self.sequence_id,
            started_at: self.started_at,
            rtt: self.rtt,
            timeout_event: self.timeout_event,
            timeouts: self.timeouts,
        }
    }
}

struct Shared {
    state: Mutex<TimerState>,
    wake: Condvar,
    listener: Mutex<Option<TimeoutListener>>,
    debug: bool,
}

/// Adaptive retransmission timer.
///
/// Every method takes `&self`; the timer can be shared between the
/// transmission driver and acknowledgement listeners. Dropping the timer
/// shuts the clock thread down.
pub struct Timer {
    shared: Arc<Shared>,
    clock: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    /// Create an idle timer. The clock thread is not running until
    /// [`Timer::launch`] is called.
    pub fn new(config: &TimerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TimerState::new()),
                wake: Condvar::new(),
                listener: Mutex::new(None),
                debug: config.debug,
            }),
            clock: Mutex::new(None),
        }
    }

    /// Spawn the background clock thread.
    ///
    /// Calling it again while the clock is running does nothing.
    pub fn launch(&self) -> Result<()> {
        if !self.shared.state.lock().alive {
            return Err(StrandLinkError::TimerShutDown);
        }

        let mut clock = self.clock.lock();
        if clock.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(CLOCK_THREAD_NAME.into())
            .spawn(move || run_clock(shared))?;
        *clock = Some(handle);
        Ok(())
    }

    /// Register a callback fired (without the timer lock held) whenever an
    /// interval expires.
    pub fn set_timeout_listener(&self, listener: impl Fn(u32) + Send + Sync + 'static) {
        *self.shared.listener.lock() = Some(Arc::new(listener));
    }

    /// Begin timing `seq`. See [`Timer::start_at`].
    pub fn start(&self, seq: u32) -> Result<()> {
        self.start_at(seq, Instant::now())
    }

    /// Begin timing `seq` as of `now`.
    ///
    /// - Idle: a new interval starts.
    /// - Already timing `seq`: the interval restarts at `now`.
    /// - Timing another id: that interval is stopped without an RTT sample
    ///   and a new one starts for `seq`.
    ///
    /// Fails only once the timer has been shut down.
    pub fn start_at(&self, seq: u32, now: Instant) -> Result<()> {
        let debug = self.shared.debug;
        {
            let mut state = self.shared.state.lock();
            if !state.alive {
                return Err(StrandLinkError::TimerShutDown);
            }

            let running = state.running;
            let current_seq = state.sequence_id;
            match current_seq {
                Some(current) if running && current == seq => {
                    state.started_at = Some(now);
                    timer_event!(debug, seq, "timer restarted");
                }
                Some(current) if running => {
                    state.end(current, false, now, debug);
                    state.begin(seq, now, debug);
                }
                _ => state.begin(seq, now, debug),
            }
        }
        self.shared.wake.notify_all();
        Ok(())
    }

    /// Stop timing if `ack` covers the running interval. See [`Timer::stop_at`].
    pub fn stop(&self, ack: u32, update_rtt: bool) -> bool {
        self.stop_at(ack, update_rtt, Instant::now())
    }

    /// Stop timing as of `now`.
    ///
    /// Acknowledgements lower than the running sequence id are stale and
    /// ignored. When `update_rtt` is set, `now - started_at` is folded into
    /// the RTT estimate. Returns whether an interval was stopped.
    pub fn stop_at(&self, ack: u32, update_rtt: bool, now: Instant) -> bool {
        let stopped = self
            .shared
            .state
            .lock()
            .end(ack, update_rtt, now, self.shared.debug);
        if stopped {
            self.shared.wake.notify_all();
        }
        stopped
    }

    /// Fold a round trip measured outside the running interval into the
    /// estimate. The interval itself, if any, is left untouched.
    ///
    /// Only for acknowledged exchanges whose interval had already expired
    /// or been restarted, so `stop` could not take the sample.
    pub fn record_sample(&self, sample: Duration) {
        let mut state = self.shared.state.lock();
        state.rtt.update_duration(sample);
        timer_event!(
            self.shared.debug,
            sample_rtt_ms = state.rtt.sample_rtt(),
            estimated_rtt_ms = state.rtt.estimated_rtt(),
            deviation_rtt_ms = state.rtt.deviation_rtt(),
            timeout_ms = state.rtt.timeout_ms(),
            "late sample recorded"
        );
    }

    /// Permanently halt the timer and join the clock thread. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.alive {
                timer_event!(self.shared.debug, "timer shutting down");
            }
            state.alive = false;
            state.running = false;
        }
        self.shared.wake.notify_all();

        let handle = self.clock.lock().take();
        if let Some(handle) = handle {
            // A timeout listener may shut the timer down from the clock itself.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!("timer clock thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    pub fn is_alive(&self) -> bool {
        self.shared.state.lock().alive
    }

    pub fn sequence_id(&self) -> Option<u32> {
        self.shared.state.lock().sequence_id
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.shared.state.lock().started_at
    }

    /// Current retransmission timeout.
    pub fn timeout(&self) -> Duration {
        self.shared.state.lock().rtt.timeout()
    }

    /// Copy of the RTT estimator.
    pub fn rtt(&self) -> RttEstimator {
        self.shared.state.lock().rtt
    }

    /// Time left before the running interval expires, or `None` when idle.
    pub fn remaining(&self) -> Option<Duration> {
        let state = self.shared.state.lock();
        if !state.running {
            return None;
        }
        let elapsed = state
            .started_at
            .map(|t| t.elapsed())
            .unwrap_or_default();
        Some(state.rtt.timeout().saturating_sub(elapsed))
    }

    /// Consume the timeout-event flag.
    pub fn take_timeout_event(&self) -> bool {
        std::mem::take(&mut self.shared.state.lock().timeout_event)
    }

    /// Number of intervals that have expired.
    pub fn timeouts(&self) -> u64 {
        self.shared.state.lock().timeouts
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.shared.state.lock().snapshot()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

fn run_clock(shared: Arc<Shared>) {
    timer_event!(shared.debug, "timer clock running");

    let mut state = shared.state.lock();
    while state.alive {
        if !state.running {
            shared.wake.wait(&mut state);
            continue;
        }

        let (Some(seq), Some(started_at)) = (state.sequence_id, state.started_at) else {
            state.running = false;
            continue;
        };

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(started_at);
        let timeout = state.rtt.timeout();

        if elapsed >= timeout {
            state.timeout_event = true;
            state.timeouts += 1;
            timer_event!(
                shared.debug,
                seq,
                timeout_ms = state.rtt.timeout_ms(),
                "timer expired"
            );
            state.end(seq, false, now, shared.debug);
            notify_listener(&shared, &mut state, seq);
        } else {
            shared.wake.wait_for(&mut state, timeout - elapsed);
        }
    }

    timer_event!(shared.debug, "timer clock complete");
}

fn notify_listener(shared: &Shared, state: &mut MutexGuard<'_, TimerState>, seq: u32) {
    let listener = shared.listener.lock().clone();
    if let Some(listener) = listener {
        MutexGuard::unlocked(state, || listener(seq));
    }
}
