//! Per-entity state store
//!
//! One record per tracked entity holds every delta slot, residual, path
//! buffer, flip flag and timestamp. The player has a dedicated slot so the
//! hot path never hashes; NPCs live in a single map keyed by entity handle.

use std::collections::VecDeque;

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::controller::commit::GranularSlot;
use crate::controller::constants::driver::MAX_DT_SECONDS;
use crate::host::EntityId;
use crate::util::vec3::Vec3;

/// One point of an entity's movement path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSample {
    pub position: Vec3,
    /// Path length in the XY plane since the buffer started
    pub cumulative_xy: f32,
    pub timestamp_ms: u64,
}

/// Discrete states whose changes bypass smoothing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviousFlags {
    pub sprinting: bool,
    pub sneaking: bool,
    pub drawn: bool,
}

/// Everything the controller remembers about one entity
#[derive(Debug, Clone)]
pub struct EntityState {
    pub id: EntityId,

    // Attributable contributions to SpeedMult
    pub movement_delta: f32,
    pub diagonal: GranularSlot,
    pub slope: GranularSlot,
    pub scale: GranularSlot,

    // Contribution to AttackSpeed
    pub attack_delta: f32,

    // Slope pipeline
    pub path: VecDeque<PathSample>,
    pub slope_filtered: f32,
    pub slope_estimates: SmallVec<[f32; 10]>,

    pub prev_flags: Option<PreviousFlags>,
    pub jogging: bool,
    /// Push the raw target through on the next evaluation
    pub force_bypass: bool,

    pub last_eval_ms: Option<u64>,
    pub last_slope_ms: Option<u64>,

    // Sprint animation sync
    pub anim_rate: f32,
    pub anim_var: Option<&'static str>,

    /// Scanner epoch in which the entity was last relevant
    pub seen_epoch: u64,
    pub unavailable_ticks: u32,
}

impl EntityState {
    pub fn new(id: EntityId, jogging: bool) -> Self {
        Self {
            id,
            movement_delta: 0.0,
            diagonal: GranularSlot::default(),
            slope: GranularSlot::default(),
            scale: GranularSlot::default(),
            attack_delta: 0.0,
            path: VecDeque::new(),
            slope_filtered: 0.0,
            slope_estimates: SmallVec::new(),
            prev_flags: None,
            jogging,
            force_bypass: false,
            last_eval_ms: None,
            last_slope_ms: None,
            anim_rate: 1.0,
            anim_var: None,
            seen_epoch: 0,
            unavailable_ticks: 0,
        }
    }

    /// Sum of all slots on the movement attribute
    #[inline]
    pub fn tracked_speed_sum(&self) -> f32 {
        self.movement_delta + self.diagonal.applied + self.slope.applied + self.scale.applied
    }

    /// No outstanding contribution on any channel
    pub fn is_clean(&self) -> bool {
        self.movement_delta == 0.0
            && self.diagonal.applied == 0.0
            && self.slope.applied == 0.0
            && self.scale.applied == 0.0
            && self.attack_delta == 0.0
            && self.anim_rate == 1.0
    }

    /// Seconds since the previous full evaluation, clamped
    pub fn eval_dt(&self, now_ms: u64, default_ms: u64) -> f32 {
        elapsed_seconds(self.last_eval_ms, now_ms, default_ms)
    }

    /// Seconds since the previous slope update, clamped
    pub fn slope_dt(&self, now_ms: u64, default_ms: u64) -> f32 {
        elapsed_seconds(self.last_slope_ms, now_ms, default_ms)
    }

    /// Drop filters, buffers and flags; slots must already be zero
    pub fn reset_dynamics(&mut self) {
        self.path.clear();
        self.slope_filtered = 0.0;
        self.slope_estimates.clear();
        self.prev_flags = None;
        self.force_bypass = false;
        self.last_eval_ms = None;
        self.last_slope_ms = None;
        self.diagonal.residual = 0.0;
        self.slope.residual = 0.0;
        self.scale.residual = 0.0;
    }
}

fn elapsed_seconds(last: Option<u64>, now_ms: u64, default_ms: u64) -> f32 {
    let ms = match last {
        Some(last) => now_ms.saturating_sub(last),
        None => default_ms,
    };
    (ms as f32 / 1000.0).clamp(0.0, MAX_DT_SECONDS)
}

/// Player slot plus NPC map
#[derive(Debug, Default)]
pub struct EntityStore {
    player: Option<EntityState>,
    npcs: HashMap<EntityId, EntityState, FxBuildHasher>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            player: None,
            npcs: HashMap::with_hasher(FxBuildHasher),
        }
    }

    pub fn player(&self) -> Option<&EntityState> {
        self.player.as_ref()
    }

    pub fn player_mut(&mut self) -> Option<&mut EntityState> {
        self.player.as_mut()
    }

    /// Player record, created lazily
    pub fn player_entry(&mut self, id: EntityId, jogging: bool) -> &mut EntityState {
        self.player.get_or_insert_with(|| EntityState::new(id, jogging))
    }

    pub fn take_player(&mut self) -> Option<EntityState> {
        self.player.take()
    }

    pub fn set_player(&mut self, state: EntityState) {
        self.player = Some(state);
    }

    pub fn npc(&self, id: EntityId) -> Option<&EntityState> {
        self.npcs.get(&id)
    }

    pub fn npc_mut(&mut self, id: EntityId) -> Option<&mut EntityState> {
        self.npcs.get_mut(&id)
    }

    /// NPC record, created lazily
    pub fn npc_entry(&mut self, id: EntityId, jogging: bool) -> &mut EntityState {
        self.npcs
            .entry(id)
            .or_insert_with(|| EntityState::new(id, jogging))
    }

    pub fn insert_npc(&mut self, state: EntityState) {
        self.npcs.insert(state.id, state);
    }

    pub fn remove_npc(&mut self, id: EntityId) -> Option<EntityState> {
        self.npcs.remove(&id)
    }

    pub fn contains_npc(&self, id: EntityId) -> bool {
        self.npcs.contains_key(&id)
    }

    pub fn npc_count(&self) -> usize {
        self.npcs.len()
    }

    /// Append every tracked NPC handle to `out`
    pub fn npc_ids(&self, out: &mut Vec<EntityId>) {
        out.extend(self.npcs.keys().copied());
    }

    /// Append NPCs not marked relevant in `epoch` to `out`
    pub fn stale_npcs(&self, epoch: u64, out: &mut Vec<EntityId>) {
        out.extend(
            self.npcs
                .values()
                .filter(|s| s.seen_epoch != epoch)
                .map(|s| s.id),
        );
    }

    /// Forget everything without touching the host
    pub fn clear(&mut self) {
        self.player = None;
        self.npcs.clear();
    }
}
