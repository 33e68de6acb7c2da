//! Tick driver and serialized task queue
//!
//! A background thread wakes at the heartbeat interval and enqueues one
//! heartbeat onto a bounded crossbeam channel. Event callbacks enqueue onto
//! the same channel. The apply context drains it; that is the only place
//! entity state and host attributes are touched.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info};

use crate::controller::flags::SharedFlags;
use crate::host::EntityId;

/// Why an event-driven evaluation was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalCause {
    Combat,
    Animation,
}

/// Unit of work for the apply context
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Heartbeat,
    Evaluate { entity: EntityId, cause: EvalCause },
    Equip(EntityId),
    ToggleJogging,
    /// Persisted blob handed over by the host after a load
    Restore(Option<Vec<u8>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Task queue is full")]
    Full,
    #[error("Task queue is disconnected")]
    Disconnected,
}

/// Bounded MPSC task queue
pub struct TaskQueue {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    pub fn sender(&self) -> TaskSender {
        TaskSender {
            sender: self.sender.clone(),
        }
    }

    #[inline]
    pub fn try_next(&self) -> Option<Task> {
        self.receiver.try_recv().ok()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }
}

/// Clonable producer handle
#[derive(Clone)]
pub struct TaskSender {
    sender: Sender<Task>,
}

impl TaskSender {
    #[inline]
    pub fn try_send(&self, task: Task) -> Result<(), QueueError> {
        self.sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Disconnected(_) => QueueError::Disconnected,
        })
    }
}

/// Background heartbeat thread
pub struct TickDriver {
    flags: Arc<SharedFlags>,
    handle: Option<JoinHandle<()>>,
}

impl TickDriver {
    /// Spawn the timer thread; it runs until [`TickDriver::stop`] or drop
    pub fn start(interval: Duration, sender: TaskSender, flags: Arc<SharedFlags>) -> io::Result<Self> {
        flags.set_running(true);
        let thread_flags = flags.clone();
        let handle = thread::Builder::new()
            .name("speed-heartbeat".to_string())
            .spawn(move || {
                debug!("Heartbeat thread started ({:?})", interval);
                while thread_flags.is_running() {
                    thread::sleep(interval);
                    if !thread_flags.is_running() {
                        break;
                    }
                    // One outstanding heartbeat at a time
                    if !thread_flags.claim_heartbeat() {
                        continue;
                    }
                    match sender.try_send(Task::Heartbeat) {
                        Ok(()) => {}
                        Err(QueueError::Full) => thread_flags.release_heartbeat(),
                        Err(QueueError::Disconnected) => break,
                    }
                }
                debug!("Heartbeat thread stopped");
            });
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                flags.set_running(false);
                return Err(e);
            }
        };
        info!("Tick driver running every {} ms", interval.as_millis());
        Ok(Self {
            flags,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.flags.is_running()
    }

    /// Clear the run flag and join; queued tasks stay in the queue
    pub fn stop(&mut self) {
        self.flags.set_running(false);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_backpressure() {
        let queue = TaskQueue::new(2);
        let sender = queue.sender();
        assert!(sender.try_send(Task::Heartbeat).is_ok());
        assert!(sender.try_send(Task::ToggleJogging).is_ok());
        assert_eq!(sender.try_send(Task::Heartbeat), Err(QueueError::Full));
        assert_eq!(queue.pending_count(), 2);
        assert_eq!(queue.try_next(), Some(Task::Heartbeat));
        assert_eq!(queue.try_next(), Some(Task::ToggleJogging));
        assert_eq!(queue.try_next(), None);
    }

    #[test]
    fn test_driver_enqueues_single_heartbeat() {
        let queue = TaskQueue::new(16);
        let flags = Arc::new(SharedFlags::new());
        let mut driver = TickDriver::start(Duration::from_millis(2), queue.sender(), flags.clone()).unwrap();
        thread::sleep(Duration::from_millis(40));
        driver.stop();
        assert!(!driver.is_running());
        // Never released, so only one heartbeat was queued
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.try_next(), Some(Task::Heartbeat));
    }

    #[test]
    fn test_released_heartbeat_requeues() {
        let queue = TaskQueue::new(16);
        let flags = Arc::new(SharedFlags::new());
        let mut driver = TickDriver::start(Duration::from_millis(2), queue.sender(), flags.clone()).unwrap();
        let mut seen = 0;
        for _ in 0..200 {
            if queue.try_next() == Some(Task::Heartbeat) {
                seen += 1;
                flags.release_heartbeat();
                if seen == 3 {
                    break;
                }
            }
            thread::sleep(Duration::from_millis(1));
        }
        driver.stop();
        assert_eq!(seen, 3);
    }
}
