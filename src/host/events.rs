//! Typed host event subscriptions
//!
//! Host event sources deliver on arbitrary threads. Subscribers only set
//! atomics or enqueue work; they never touch controller state directly.

use super::EntityId;

/// Raw input event
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    pub kind: InputKind,
    /// Mapped user-event name ("Sprint", "Shout", ...)
    pub user_event: String,
    /// Device key code
    pub id_code: u32,
    /// > 0 while held
    pub value: f32,
    /// 0 on the first down frame
    pub held_secs: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Button,
    Analog,
}

impl InputEvent {
    pub fn button(user_event: &str, id_code: u32, value: f32, held_secs: f32) -> Self {
        Self {
            kind: InputKind::Button,
            user_event: user_event.to_string(),
            id_code,
            value,
            held_secs,
        }
    }

    #[inline]
    pub fn is_down(&self) -> bool {
        self.value > 0.0
    }

    /// First down frame
    #[inline]
    pub fn is_press(&self) -> bool {
        self.is_down() && self.held_secs == 0.0
    }
}

pub type EntityCallback = Box<dyn Fn(EntityId) + Send + Sync>;

/// One typed subscription
pub enum Subscription {
    /// Combat started or stopped for an actor
    Combat(EntityCallback),
    /// Equip or unequip on an actor
    Equip(EntityCallback),
    /// Animation-graph notification from an actor
    AnimationGraph(EntityCallback),
    Input(Box<dyn Fn(&InputEvent) + Send + Sync>),
    PreLoad(Box<dyn Fn() + Send + Sync>),
    /// Carries the host-managed persisted blob, if any
    PostLoad(Box<dyn Fn(Option<&[u8]>) + Send + Sync>),
}

pub trait EventBus {
    fn subscribe(&mut self, subscription: Subscription);
}

/// In-process fan-out bus
#[derive(Default)]
pub struct LocalEventBus {
    subscriptions: Vec<Subscription>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn emit_combat(&self, entity: EntityId) {
        for sub in &self.subscriptions {
            if let Subscription::Combat(cb) = sub {
                cb(entity);
            }
        }
    }

    pub fn emit_equip(&self, entity: EntityId) {
        for sub in &self.subscriptions {
            if let Subscription::Equip(cb) = sub {
                cb(entity);
            }
        }
    }

    pub fn emit_animation(&self, entity: EntityId) {
        for sub in &self.subscriptions {
            if let Subscription::AnimationGraph(cb) = sub {
                cb(entity);
            }
        }
    }

    pub fn emit_input(&self, event: &InputEvent) {
        for sub in &self.subscriptions {
            if let Subscription::Input(cb) = sub {
                cb(event);
            }
        }
    }

    pub fn emit_pre_load(&self) {
        for sub in &self.subscriptions {
            if let Subscription::PreLoad(cb) = sub {
                cb();
            }
        }
    }

    pub fn emit_post_load(&self, record: Option<&[u8]>) {
        for sub in &self.subscriptions {
            if let Subscription::PostLoad(cb) = sub {
                cb(record);
            }
        }
    }
}

impl EventBus for LocalEventBus {
    fn subscribe(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_press_detection() {
        assert!(InputEvent::button("Shout", 0, 1.0, 0.0).is_press());
        assert!(!InputEvent::button("Shout", 0, 1.0, 0.2).is_press());
        assert!(!InputEvent::button("Shout", 0, 0.0, 0.0).is_press());
    }

    #[test]
    fn test_bus_routes_by_kind() {
        let combat = Arc::new(AtomicU32::new(0));
        let equip = Arc::new(AtomicU32::new(0));
        let mut bus = LocalEventBus::new();

        let c = combat.clone();
        bus.subscribe(Subscription::Combat(Box::new(move |e| {
            c.fetch_add(e.0, Ordering::Relaxed);
        })));
        let q = equip.clone();
        bus.subscribe(Subscription::Equip(Box::new(move |_| {
            q.fetch_add(1, Ordering::Relaxed);
        })));

        bus.emit_combat(EntityId(5));
        bus.emit_equip(EntityId(1));
        bus.emit_equip(EntityId(2));
        bus.emit_pre_load();

        assert_eq!(bus.len(), 2);
        assert_eq!(combat.load(Ordering::Relaxed), 5);
        assert_eq!(equip.load(Ordering::Relaxed), 2);
    }
}
