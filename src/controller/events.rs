//! Host event handlers
//!
//! Callbacks may run on any thread. They only flip atomics or enqueue a
//! task; the apply context does the rest.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::config::ConfigHandle;
use crate::controller::driver::{EvalCause, QueueError, Task, TaskSender};
use crate::controller::flags::SharedFlags;
use crate::host::events::{EventBus, InputEvent, Subscription};
use crate::host::EntityId;
use crate::util::clock::Clock;

/// Clonable sink for host events
#[derive(Clone)]
pub struct ControllerEvents {
    flags: Arc<SharedFlags>,
    tasks: TaskSender,
    config: ConfigHandle,
    clock: Arc<dyn Clock>,
}

impl ControllerEvents {
    pub fn new(flags: Arc<SharedFlags>, tasks: TaskSender, config: ConfigHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            flags,
            tasks,
            config,
            clock,
        }
    }

    fn enqueue(&self, task: Task) -> bool {
        match self.tasks.try_send(task) {
            Ok(()) => true,
            Err(QueueError::Full) => {
                trace!("Task queue full, dropping event");
                false
            }
            Err(QueueError::Disconnected) => false,
        }
    }

    pub fn on_combat(&self, entity: EntityId) {
        if self.flags.is_loading() {
            return;
        }
        self.enqueue(Task::Evaluate {
            entity,
            cause: EvalCause::Combat,
        });
    }

    pub fn on_equip(&self, entity: EntityId) {
        if self.flags.is_loading() {
            return;
        }
        self.enqueue(Task::Equip(entity));
    }

    pub fn on_animation(&self, entity: EntityId) {
        if self.flags.is_loading() {
            return;
        }
        self.enqueue(Task::Evaluate {
            entity,
            cause: EvalCause::Animation,
        });
    }

    /// Sprint latch bookkeeping and jogging toggle detection
    pub fn on_input(&self, event: &InputEvent) {
        let cfg = self.config.snapshot();
        let input = &cfg.input;

        if event.user_event == input.sprint_event {
            if event.is_down() {
                // Only the first press starts the latch window
                if event.is_press() || self.flags.sprint_input_ms() == 0 {
                    self.flags.note_sprint_input(self.clock.now_ms());
                }
            } else {
                self.flags.clear_sprint_input();
            }
        }

        if self.flags.is_loading() || !event.is_press() {
            return;
        }
        let by_event = !input.toggle_event.is_empty() && event.user_event == input.toggle_event;
        let by_key = input.toggle_key != 0 && event.id_code == input.toggle_key;
        if by_event || by_key {
            self.enqueue(Task::ToggleJogging);
        }
    }

    pub fn on_pre_load(&self) {
        self.flags.set_loading(true);
        self.flags.clear_parked_restore();
        self.flags.rearm_restore();
    }

    /// Hand the persisted blob to the apply context, once per load
    ///
    /// If the queue is full the blob is parked instead; the next heartbeat
    /// starts the restore from there.
    pub fn on_post_load(&self, record: Option<&[u8]>) {
        if !self.flags.claim_restore() {
            return;
        }
        self.flags.set_loading(true);
        let record = record.map(<[u8]>::to_vec);
        if let Err(e) = self.tasks.try_send(Task::Restore(record.clone())) {
            warn!("Could not queue post-load restore ({}), parking it", e);
            self.flags.park_restore(record);
        }
    }

    /// Register every handler on `bus`
    pub fn install(&self, bus: &mut dyn EventBus) {
        let this = self.clone();
        bus.subscribe(Subscription::Combat(Box::new(move |e| this.on_combat(e))));
        let this = self.clone();
        bus.subscribe(Subscription::Equip(Box::new(move |e| this.on_equip(e))));
        let this = self.clone();
        bus.subscribe(Subscription::AnimationGraph(Box::new(move |e| this.on_animation(e))));
        let this = self.clone();
        bus.subscribe(Subscription::Input(Box::new(move |ev| this.on_input(ev))));
        let this = self.clone();
        bus.subscribe(Subscription::PreLoad(Box::new(move || this.on_pre_load())));
        let this = self.clone();
        bus.subscribe(Subscription::PostLoad(Box::new(move |rec| this.on_post_load(rec))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controller::driver::TaskQueue;
    use crate::host::events::LocalEventBus;
    use crate::util::clock::ManualClock;

    fn setup() -> (TaskQueue, Arc<SharedFlags>, ManualClock, LocalEventBus) {
        let queue = TaskQueue::new(32);
        let flags = Arc::new(SharedFlags::new());
        let clock = ManualClock::new(1000);
        let events = ControllerEvents::new(
            flags.clone(),
            queue.sender(),
            ConfigHandle::new(ControllerConfig::default()),
            Arc::new(clock.clone()),
        );
        let mut bus = LocalEventBus::new();
        events.install(&mut bus);
        (queue, flags, clock, bus)
    }

    #[test]
    fn test_toggle_on_press_only() {
        let (queue, _, _, bus) = setup();
        bus.emit_input(&InputEvent::button("Shout", 0, 1.0, 0.0));
        bus.emit_input(&InputEvent::button("Shout", 0, 1.0, 0.3));
        bus.emit_input(&InputEvent::button("Shout", 0, 0.0, 0.5));
        bus.emit_input(&InputEvent::button("Activate", 269, 1.0, 0.0));
        assert_eq!(queue.try_next(), Some(Task::ToggleJogging));
        assert_eq!(queue.try_next(), Some(Task::ToggleJogging));
        assert_eq!(queue.try_next(), None);
    }

    #[test]
    fn test_sprint_latch_set_and_cleared() {
        let (_, flags, clock, bus) = setup();
        bus.emit_input(&InputEvent::button("Sprint", 42, 1.0, 0.0));
        assert_eq!(flags.sprint_input_ms(), 1000);
        clock.advance(100);
        bus.emit_input(&InputEvent::button("Sprint", 42, 1.0, 0.1));
        assert_eq!(flags.sprint_input_ms(), 1000);
        bus.emit_input(&InputEvent::button("Sprint", 42, 0.0, 0.2));
        assert_eq!(flags.sprint_input_ms(), 0);
    }

    #[test]
    fn test_load_sequence() {
        let (queue, flags, _, bus) = setup();
        bus.emit_pre_load();
        assert!(flags.is_loading());
        bus.emit_combat(EntityId(1));
        assert_eq!(queue.try_next(), None);

        bus.emit_post_load(Some(&[1, 2, 3]));
        bus.emit_post_load(Some(&[4, 5, 6]));
        assert_eq!(queue.try_next(), Some(Task::Restore(Some(vec![1, 2, 3]))));
        assert_eq!(queue.try_next(), None);
    }

    #[test]
    fn test_post_load_parked_when_queue_full() {
        let queue = TaskQueue::new(1);
        let flags = Arc::new(SharedFlags::new());
        let events = ControllerEvents::new(
            flags.clone(),
            queue.sender(),
            ConfigHandle::new(ControllerConfig::default()),
            Arc::new(ManualClock::new(1000)),
        );
        events.on_combat(EntityId(3));
        events.on_pre_load();
        events.on_post_load(Some(&[9, 9]));

        assert!(flags.is_loading());
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(flags.take_parked_restore(), Some(Some(vec![9, 9])));
    }

    #[test]
    fn test_events_enqueue_tasks() {
        let (queue, _, _, bus) = setup();
        bus.emit_equip(EntityId(5));
        bus.emit_animation(EntityId(6));
        assert_eq!(queue.try_next(), Some(Task::Equip(EntityId(5))));
        assert_eq!(
            queue.try_next(),
            Some(Task::Evaluate {
                entity: EntityId(6),
                cause: EvalCause::Animation
            })
        );
    }
}
