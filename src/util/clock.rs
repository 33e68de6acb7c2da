//! Millisecond clocks and a per-channel debounce gate

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic millisecond time source
///
/// Shared between the timer thread, host event callbacks and the apply
/// context, so implementations must be `Send + Sync`.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock backed by `Instant`
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        // Offset by one so that 0 can mean "never" in timestamp atomics
        self.origin.elapsed().as_millis() as u64 + 1
    }
}

/// Manually advanced clock for tests and deterministic replays
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

/// Independent debounce channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleChannel {
    /// Full evaluation path of the heartbeat
    Main,
    /// Host-event driven re-evaluation (combat, equip, animation)
    Event,
    /// Jogging toggle input
    Toggle,
}

impl ThrottleChannel {
    const COUNT: usize = 3;

    #[inline]
    fn index(self) -> usize {
        match self {
            ThrottleChannel::Main => 0,
            ThrottleChannel::Event => 1,
            ThrottleChannel::Toggle => 2,
        }
    }
}

/// Rejects a channel more often than its interval
///
/// Lives on the apply context only; no interior mutability.
#[derive(Debug, Default)]
pub struct Throttle {
    last_pass_ms: [Option<u64>; ThrottleChannel::COUNT],
}

impl Throttle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true (and records the pass) if at least `interval_ms` elapsed
    /// since the previous pass on this channel
    pub fn try_pass(&mut self, channel: ThrottleChannel, now_ms: u64, interval_ms: u64) -> bool {
        let slot = &mut self.last_pass_ms[channel.index()];
        match *slot {
            Some(last) if now_ms.saturating_sub(last) < interval_ms => false,
            _ => {
                *slot = Some(now_ms);
                true
            }
        }
    }

    /// Forget every channel, the next call on each passes
    pub fn reset(&mut self) {
        self.last_pass_ms = [None; ThrottleChannel::COUNT];
    }
}
