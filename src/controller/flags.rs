//! State shared across threads
//!
//! The timer thread and host event callbacks only ever touch these atomics
//! and the parked post-load record; everything else belongs to the apply
//! context. Relaxed ordering is enough, there is no cross-flag ordering
//! dependency beyond visibility.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

/// Post-load blob the event side could not queue (inner `None`: no record)
type ParkedRecord = Option<Option<Vec<u8>>>;

#[derive(Debug, Default)]
pub struct SharedFlags {
    /// Timer thread keeps running while set
    running: AtomicBool,
    /// Host is rehydrating; no evaluation and no attribute writes
    loading: AtomicBool,
    /// A heartbeat task is queued and not yet serviced
    heartbeat_pending: AtomicBool,
    /// Post-load restore already claimed for this load
    restore_claimed: AtomicBool,
    /// Time of the last sprint input press, 0 when released
    last_sprint_input_ms: AtomicU64,
    /// Time of the last forced refresh
    last_refresh_ms: AtomicU64,
    /// Restore handoff waiting for the heartbeat
    parked_restore: Mutex<ParkedRecord>,
}

impl SharedFlags {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Relaxed)
    }

    pub fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::Relaxed);
    }

    /// Returns true if the caller won the right to enqueue a heartbeat
    pub fn claim_heartbeat(&self) -> bool {
        !self.heartbeat_pending.swap(true, Ordering::Relaxed)
    }

    pub fn release_heartbeat(&self) {
        self.heartbeat_pending.store(false, Ordering::Relaxed);
    }

    /// Exchange-based guard; true exactly once per load
    pub fn claim_restore(&self) -> bool {
        !self.restore_claimed.swap(true, Ordering::Relaxed)
    }

    pub fn rearm_restore(&self) {
        self.restore_claimed.store(false, Ordering::Relaxed);
    }

    pub fn note_sprint_input(&self, now_ms: u64) {
        self.last_sprint_input_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn clear_sprint_input(&self) {
        self.last_sprint_input_ms.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub fn sprint_input_ms(&self) -> u64 {
        self.last_sprint_input_ms.load(Ordering::Relaxed)
    }

    pub fn note_refresh(&self, now_ms: u64) {
        self.last_refresh_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn last_refresh_ms(&self) -> u64 {
        self.last_refresh_ms.load(Ordering::Relaxed)
    }

    /// Keep a post-load record for the apply context to pick up
    pub fn park_restore(&self, record: Option<Vec<u8>>) {
        *self.parked_restore.lock() = Some(record);
    }

    pub fn take_parked_restore(&self) -> ParkedRecord {
        self.parked_restore.lock().take()
    }

    pub fn clear_parked_restore(&self) {
        self.parked_restore.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_claim() {
        let flags = SharedFlags::new();
        assert!(flags.claim_heartbeat());
        assert!(!flags.claim_heartbeat());
        flags.release_heartbeat();
        assert!(flags.claim_heartbeat());
    }

    #[test]
    fn test_restore_claimed_once() {
        let flags = SharedFlags::new();
        assert!(flags.claim_restore());
        assert!(!flags.claim_restore());
        flags.rearm_restore();
        assert!(flags.claim_restore());
    }

    #[test]
    fn test_parked_restore_taken_once() {
        let flags = SharedFlags::new();
        assert_eq!(flags.take_parked_restore(), None);
        flags.park_restore(None);
        assert_eq!(flags.take_parked_restore(), Some(None));
        assert_eq!(flags.take_parked_restore(), None);

        flags.park_restore(Some(vec![7, 8]));
        flags.clear_parked_restore();
        assert_eq!(flags.take_parked_restore(), None);
    }

    #[test]
    fn test_sprint_input() {
        let flags = SharedFlags::new();
        assert_eq!(flags.sprint_input_ms(), 0);
        flags.note_sprint_input(1234);
        assert_eq!(flags.sprint_input_ms(), 1234);
        flags.clear_sprint_input();
        assert_eq!(flags.sprint_input_ms(), 0);
    }
}
