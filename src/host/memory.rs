//! In-memory host
//!
//! A self-contained host implementation used by the demo binary, the
//! benchmark and the test suite. Attributes are plain floats, every write is
//! logged so tests can count attribute churn.

use std::collections::HashMap;

use super::{
    ActorDirectory, ActorScope, AttributeAccess, AttributeChannel, BehaviorQuery, BehaviorState,
    EntityId, FormHandle, FormResolver, HostError, WorldQuery, WorldSample,
};
use crate::util::vec3::Vec3;

/// Default high-detail radius for `ActorScope::Nearby`
pub const DEFAULT_NEARBY_RADIUS: f32 = 8192.0;

/// One logged attribute write
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeWrite {
    pub entity: EntityId,
    pub channel: AttributeChannel,
    pub delta: f32,
}

/// Simulated actor
#[derive(Debug, Clone)]
pub struct ActorRecord {
    pub values: [f32; AttributeChannel::COUNT],
    pub maximums: [f32; AttributeChannel::COUNT],
    pub behavior: BehaviorState,
    pub world: WorldSample,
    pub graph_bools: HashMap<String, bool>,
    pub graph_floats: HashMap<String, f32>,
    /// Graph float variables that accept writes
    pub writable_graph_vars: Vec<String>,
    /// False simulates a missing attribute owner (e.g. mid-unload)
    pub available: bool,
}

impl ActorRecord {
    pub fn new(position: Vec3) -> Self {
        let mut values = [0.0; AttributeChannel::COUNT];
        values[AttributeChannel::SpeedMult.index()] = 100.0;
        values[AttributeChannel::AttackSpeed.index()] = 1.0;
        values[AttributeChannel::CarryWeight.index()] = 300.0;
        values[AttributeChannel::Health.index()] = 100.0;
        values[AttributeChannel::Stamina.index()] = 100.0;
        values[AttributeChannel::Magicka.index()] = 100.0;
        Self {
            values,
            maximums: values,
            behavior: BehaviorState::default(),
            world: WorldSample {
                position,
                ..WorldSample::default()
            },
            graph_bools: HashMap::new(),
            graph_floats: HashMap::new(),
            writable_graph_vars: Vec::new(),
            available: true,
        }
    }

    #[inline]
    pub fn value(&self, channel: AttributeChannel) -> f32 {
        self.values[channel.index()]
    }

    pub fn set_value(&mut self, channel: AttributeChannel, value: f32) {
        self.values[channel.index()] = value;
    }
}

/// Host backed by hash maps
#[derive(Debug, Clone)]
pub struct MemoryHost {
    player: EntityId,
    actors: HashMap<EntityId, ActorRecord>,
    forms: HashMap<(String, u32), FormHandle>,
    next_form: FormHandle,
    /// Player move input axes
    pub move_axes: (f32, f32),
    pub nearby_radius: f32,
    writes: Vec<AttributeWrite>,
}

impl MemoryHost {
    /// New world containing only the player at the origin
    pub fn new(player: EntityId) -> Self {
        let mut actors = HashMap::new();
        actors.insert(player, ActorRecord::new(Vec3::ZERO));
        Self {
            player,
            actors,
            forms: HashMap::new(),
            next_form: 0x100,
            move_axes: (0.0, 0.0),
            nearby_radius: DEFAULT_NEARBY_RADIUS,
            writes: Vec::new(),
        }
    }

    pub fn insert_actor(&mut self, id: EntityId, record: ActorRecord) {
        self.actors.insert(id, record);
    }

    pub fn spawn_npc(&mut self, id: EntityId, position: Vec3) {
        self.insert_actor(id, ActorRecord::new(position));
    }

    pub fn remove_actor(&mut self, id: EntityId) -> Option<ActorRecord> {
        self.actors.remove(&id)
    }

    pub fn actor(&self, id: EntityId) -> Option<&ActorRecord> {
        self.actors.get(&id)
    }

    pub fn actor_mut(&mut self, id: EntityId) -> Option<&mut ActorRecord> {
        self.actors.get_mut(&id)
    }

    /// Direct attribute peek for assertions
    pub fn value(&self, id: EntityId, channel: AttributeChannel) -> f32 {
        self.actors
            .get(&id)
            .map(|a| a.value(channel))
            .unwrap_or(f32::NAN)
    }

    /// Set an attribute as some other system would (not logged)
    pub fn set_value(&mut self, id: EntityId, channel: AttributeChannel, value: f32) {
        if let Some(actor) = self.actors.get_mut(&id) {
            actor.set_value(channel, value);
        }
    }

    /// Register (or look up) a form and return its live handle
    pub fn register_form(&mut self, plugin: &str, local_id: u32) -> FormHandle {
        if let Some(handle) = self.forms.get(&(plugin.to_string(), local_id)) {
            return *handle;
        }
        let handle = self.next_form;
        self.next_form += 1;
        self.forms.insert((plugin.to_string(), local_id), handle);
        handle
    }

    pub fn writes(&self) -> &[AttributeWrite] {
        &self.writes
    }

    pub fn write_count(&self, entity: EntityId, channel: AttributeChannel) -> usize {
        self.writes
            .iter()
            .filter(|w| w.entity == entity && w.channel == channel)
            .count()
    }

    pub fn clear_write_log(&mut self) {
        self.writes.clear();
    }

    fn record(&self, entity: EntityId) -> Result<&ActorRecord, HostError> {
        match self.actors.get(&entity) {
            Some(actor) if actor.available => Ok(actor),
            _ => Err(HostError::Unavailable(entity)),
        }
    }
}

impl AttributeAccess for MemoryHost {
    fn read_attribute(&self, entity: EntityId, channel: AttributeChannel) -> Result<f32, HostError> {
        Ok(self.record(entity)?.value(channel))
    }

    fn read_maximum(&self, entity: EntityId, channel: AttributeChannel) -> Result<f32, HostError> {
        Ok(self.record(entity)?.maximums[channel.index()])
    }

    fn modify_attribute(
        &mut self,
        entity: EntityId,
        channel: AttributeChannel,
        delta: f32,
    ) -> Result<(), HostError> {
        match channel {
            AttributeChannel::Health | AttributeChannel::Stamina | AttributeChannel::Magicka => {
                return Err(HostError::ReadOnly(entity, channel));
            }
            _ => {}
        }
        let actor = match self.actors.get_mut(&entity) {
            Some(actor) if actor.available => actor,
            _ => return Err(HostError::Unavailable(entity)),
        };
        actor.values[channel.index()] += delta;
        self.writes.push(AttributeWrite {
            entity,
            channel,
            delta,
        });
        Ok(())
    }
}

impl BehaviorQuery for MemoryHost {
    fn behavior(&self, entity: EntityId) -> Result<BehaviorState, HostError> {
        Ok(self.record(entity)?.behavior.clone())
    }

    fn graph_bool(&self, entity: EntityId, name: &str) -> Option<bool> {
        self.actors.get(&entity)?.graph_bools.get(name).copied()
    }

    fn graph_float(&self, entity: EntityId, name: &str) -> Option<f32> {
        self.actors.get(&entity)?.graph_floats.get(name).copied()
    }

    fn set_graph_float(&mut self, entity: EntityId, name: &str, value: f32) -> bool {
        let Some(actor) = self.actors.get_mut(&entity) else {
            return false;
        };
        if !actor.writable_graph_vars.iter().any(|v| v == name) {
            return false;
        }
        actor.graph_floats.insert(name.to_string(), value);
        true
    }

    fn player_move_axes(&self) -> (f32, f32) {
        self.move_axes
    }
}

impl WorldQuery for MemoryHost {
    fn world(&self, entity: EntityId) -> Result<WorldSample, HostError> {
        Ok(self.record(entity)?.world.clone())
    }
}

impl FormResolver for MemoryHost {
    fn resolve(&self, plugin: &str, local_id: u32) -> Option<FormHandle> {
        self.forms.get(&(plugin.to_string(), local_id)).copied()
    }
}

impl ActorDirectory for MemoryHost {
    fn player(&self) -> EntityId {
        self.player
    }

    fn actors(&self, scope: ActorScope, out: &mut Vec<EntityId>) {
        let origin = self
            .actors
            .get(&self.player)
            .map(|p| p.world.position)
            .unwrap_or(Vec3::ZERO);
        let radius_sq = self.nearby_radius * self.nearby_radius;
        let mut ids: Vec<EntityId> = self
            .actors
            .iter()
            .filter(|(_, actor)| match scope {
                ActorScope::All => true,
                ActorScope::Nearby => actor.world.position.distance_sq_to(origin) <= radius_sq,
            })
            .map(|(id, _)| *id)
            .collect();
        // Deterministic order for reproducible runs
        ids.sort_unstable();
        out.extend(ids);
    }
}
