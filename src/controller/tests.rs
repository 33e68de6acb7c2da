//! End-to-end controller scenarios against the in-memory host

use std::sync::atomic::Ordering;
use std::sync::Arc;

use smallvec::smallvec;

use super::constants::driver::TASK_QUEUE_CAPACITY;
use super::snapshot::{encode_record_version, Snapshot};
use super::SpeedController;
use crate::config::{ConfigHandle, ControllerConfig, ScaleMode, SmoothingMode};
use crate::host::events::{InputEvent, LocalEventBus};
use crate::host::memory::MemoryHost;
use crate::host::{AttributeChannel, EntityId, WeaponState, WornArmor};
use crate::util::clock::ManualClock;
use crate::util::vec3::Vec3;

const PLAYER: EntityId = EntityId(0x14);
const TICK_MS: u64 = 50;

struct Rig {
    host: MemoryHost,
    clock: ManualClock,
    controller: SpeedController,
    bus: LocalEventBus,
}

impl Rig {
    fn new(cfg: ControllerConfig) -> Self {
        let clock = ManualClock::new(10_000);
        let controller = SpeedController::new(ConfigHandle::new(cfg), Arc::new(clock.clone()));
        let mut bus = LocalEventBus::new();
        controller.install(&mut bus);
        Self {
            host: MemoryHost::new(PLAYER),
            clock,
            controller,
            bus,
        }
    }

    fn tick(&mut self) {
        self.clock.advance(TICK_MS);
        self.controller.heartbeat(&mut self.host);
    }

    fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    fn pump(&mut self) -> usize {
        self.controller.run_pending(&mut self.host)
    }

    fn speed(&self) -> f32 {
        self.host.value(PLAYER, AttributeChannel::SpeedMult)
    }

    fn walk(&mut self, dx: f32, dz: f32) {
        if let Some(actor) = self.host.actor_mut(PLAYER) {
            let p = actor.world.position;
            actor.world.position = Vec3::new(p.x + dx, p.y, p.z + dz);
        }
    }
}

fn instant() -> ControllerConfig {
    let mut cfg = ControllerConfig::default();
    cfg.smoothing.enabled = false;
    cfg
}

/// Config with a subset of effects switched on
fn effect_config(mask: u32) -> ControllerConfig {
    let mut cfg = ControllerConfig::default();
    cfg.diagonal.enabled = mask & 1 != 0;
    cfg.slope.enabled = mask & 2 != 0;
    cfg.armor.affects_movement = mask & 4 != 0;
    cfg.armor.affects_attack = mask & 4 != 0;
    cfg.vitals.enabled = mask & 8 != 0;
    cfg.scale.mode = if mask & 16 != 0 {
        ScaleMode::Inverse
    } else {
        ScaleMode::Off
    };
    cfg.smoothing.enabled = mask & 32 != 0;
    cfg.attack.only_when_drawn = false;
    cfg
}

/// Player with every effect input populated
fn busy_player(rig: &mut Rig) {
    let Some(actor) = rig.host.actor_mut(PLAYER) else {
        return;
    };
    actor.world.scale = 0.8;
    actor.world.equipped_weight = 18.0;
    actor.world.worn_armor = smallvec![
        WornArmor { slot: 32, form: 0x900, weight: 35.0 },
        WornArmor { slot: 33, form: 0x900, weight: 35.0 },
        WornArmor { slot: 37, form: 0x901, weight: 8.0 },
    ];
    actor.set_value(AttributeChannel::Stamina, 12.0);
    actor
        .writable_graph_vars
        .push("SpeedSampledMult".to_string());
    rig.host.move_axes = (1.0, 1.0);
}

/// Vary sprint, weapon and terrain between ticks
fn churn(rig: &mut Rig, i: usize) {
    if let Some(actor) = rig.host.actor_mut(PLAYER) {
        actor
            .graph_bools
            .insert("IsSprinting".to_string(), i % 7 < 3);
        actor.behavior.weapon_state = if i % 5 < 2 {
            WeaponState::Drawn
        } else {
            WeaponState::Sheathed
        };
        actor.behavior.sneaking = i % 11 == 4;
    }
    rig.host.move_axes = if i % 3 == 0 { (0.0, 1.0) } else { (0.8, 0.6) };
    let dz = if i % 13 < 7 { 5.0 } else { -4.0 };
    rig.walk(8.0, dz);
}

#[test]
fn test_revert_exactness_across_effect_permutations() {
    for mask in 0..64 {
        let mut rig = Rig::new(effect_config(mask));
        busy_player(&mut rig);
        for i in 0..40 {
            churn(&mut rig, i);
            rig.tick();
        }
        rig.controller.clear_all(&mut rig.host);

        let speed = rig.speed();
        let attack = rig.host.value(PLAYER, AttributeChannel::AttackSpeed);
        assert!((speed - 100.0).abs() < 1e-3, "mask {mask:#b}: speed {speed}");
        assert!((attack - 1.0).abs() < 1e-4, "mask {mask:#b}: attack {attack}");
        assert!(rig.controller.player_state().is_none());
    }
}

#[test]
fn test_revert_keeps_external_changes() {
    let mut rig = Rig::new(instant());
    rig.ticks(3);
    assert_eq!(rig.speed(), 55.0);

    // Another system buffs the actor while we are active
    let current = rig.speed();
    rig.host.set_value(PLAYER, AttributeChannel::SpeedMult, current + 7.0);
    rig.controller.clear_all(&mut rig.host);
    assert!((rig.speed() - 107.0).abs() < 1e-4);
}

#[test]
fn test_idempotent_disable() {
    let mut cfg = ControllerConfig::default();
    cfg.movement.reduce_out_of_combat = 0.0;
    cfg.movement.reduce_jogging_out_of_combat = 0.0;
    cfg.movement.reduce_drawn = 0.0;
    cfg.movement.reduce_sneak = 0.0;
    cfg.movement.increase_sprinting = 0.0;
    cfg.diagonal.enabled = false;
    cfg.slope.enabled = false;
    cfg.attack.enabled = false;
    cfg.sprint_anim.enabled = false;
    cfg.smoothing.enabled = false;

    let mut rig = Rig::new(cfg);
    busy_player(&mut rig);
    rig.tick();
    rig.host.clear_write_log();
    rig.tick();
    assert!(rig.host.writes().is_empty(), "{:?}", rig.host.writes());
    assert_eq!(rig.speed(), 100.0);
}

#[test]
fn test_floor_invariant_holds_after_every_commit() {
    for floor in [10.0f32, 40.0, 80.0] {
        for mask in 0..64 {
            let mut cfg = effect_config(mask);
            cfg.general.min_final_speed = floor;
            cfg.slope.uphill_per_deg = 2.0;
            cfg.slope.max_abs = 60.0;
            let mut rig = Rig::new(cfg);
            busy_player(&mut rig);
            for i in 0..30 {
                churn(&mut rig, i);
                rig.tick();
                let speed = rig.speed();
                assert!(
                    speed >= floor - 1e-3,
                    "floor {floor} mask {mask:#b} tick {i}: speed {speed}"
                );
            }
        }
    }
}

#[test]
fn test_smoothing_converges_monotonically() {
    let mut cfg = ControllerConfig::default();
    cfg.smoothing.mode = SmoothingMode::Exponential;
    cfg.smoothing.half_life_ms = 100.0;
    let tau_ms = 100.0 / std::f32::consts::LN_2;

    let mut rig = Rig::new(cfg);
    let mut last = rig.speed();
    let ticks = (5.0 * tau_ms / TICK_MS as f32).ceil() as usize;
    for _ in 0..ticks {
        rig.tick();
        let speed = rig.speed();
        assert!(speed <= last + 1e-4, "not monotone");
        assert!(speed >= 55.0 - 1e-4, "overshoot");
        last = speed;
    }
    // Within 1% of the step after 5 tau
    assert!((last - 55.0).abs() < 0.45, "got {last}");
}

#[test]
fn test_granularity_suppresses_diagonal_jitter() {
    let mut rig = Rig::new(instant());
    rig.host.move_axes = (1.0, 1.0);
    rig.ticks(2);
    rig.host.clear_write_log();

    for i in 0..20 {
        rig.host.move_axes = if i % 2 == 0 { (1.0, 0.999) } else { (1.0, 1.0) };
        rig.tick();
    }
    assert_eq!(rig.host.write_count(PLAYER, AttributeChannel::SpeedMult), 0);
    assert!(rig.controller.metrics().granular_suppressed.load(Ordering::Relaxed) > 0);
}

#[test]
fn test_base_case_selection() {
    let mut rig = Rig::new(instant());
    if let Some(actor) = rig.host.actor_mut(PLAYER) {
        actor.behavior.in_combat = true;
        actor.behavior.weapon_state = WeaponState::Drawn;
    }
    rig.tick();
    assert_eq!(rig.controller.player_state().map(|s| s.movement_delta), Some(0.0));

    if let Some(actor) = rig.host.actor_mut(PLAYER) {
        actor.behavior.in_combat = false;
    }
    rig.tick();
    assert_eq!(rig.controller.player_state().map(|s| s.movement_delta), Some(-15.0));
}

#[test]
fn test_diagonal_correction_magnitude() {
    let mut cfg = instant();
    cfg.movement.reduce_out_of_combat = 0.0;
    let mut rig = Rig::new(cfg);
    rig.host.move_axes = (1.0, 1.0);
    rig.tick();

    let state = rig.controller.player_state().unwrap();
    assert!((state.diagonal.applied + 26.36).abs() < 0.01, "got {}", state.diagonal.applied);
    assert!((rig.speed() - 73.64).abs() < 0.01);

    // Single-axis input releases the slot exactly
    rig.host.move_axes = (0.0, 1.0);
    rig.tick();
    assert_eq!(rig.controller.player_state().unwrap().diagonal.applied, 0.0);
    assert!((rig.speed() - 100.0).abs() < 1e-4);
}

#[test]
fn test_diagonal_invalidated_on_flip() {
    let mut rig = Rig::new(instant());
    rig.host.move_axes = (1.0, 1.0);
    rig.tick();
    let before = rig.controller.player_state().unwrap().diagonal.applied;
    assert!(before < 0.0);

    if let Some(actor) = rig.host.actor_mut(PLAYER) {
        actor.behavior.sneaking = true;
    }
    rig.tick();
    // Recomputed against the sneak headroom, not carried over
    let after = rig.controller.player_state().unwrap().diagonal.applied;
    let expected = (100.0 - 20.0 - 10.0) * (std::f32::consts::FRAC_1_SQRT_2 - 1.0);
    assert!((after - expected).abs() < 0.01, "got {after}");
}

#[test]
fn test_uphill_slope_scenario() {
    let mut cfg = instant();
    cfg.slope.enabled = true;
    let mut rig = Rig::new(cfg);
    for _ in 0..60 {
        rig.walk(8.0, 4.0);
        rig.tick();
    }
    let slope = rig.controller.player_state().unwrap().slope.applied;
    assert!((slope + 15.94).abs() < 0.15, "got {slope}");

    // Standing still releases the correction
    rig.ticks(60);
    assert_eq!(rig.controller.player_state().unwrap().slope.applied, 0.0);
    assert!((rig.speed() - 55.0).abs() < 1e-3);
}

#[test]
fn test_slope_only_inside_throttle_window() {
    let mut cfg = instant();
    cfg.slope.enabled = true;
    cfg.general.eval_throttle_ms = 1000;
    let mut rig = Rig::new(cfg);
    rig.tick();
    let full = rig.controller.metrics().full_evaluations.load(Ordering::Relaxed);

    for _ in 0..10 {
        rig.walk(8.0, 4.0);
        rig.tick();
    }
    let metrics = rig.controller.metrics();
    assert_eq!(metrics.full_evaluations.load(Ordering::Relaxed), full);
    assert_eq!(metrics.slope_only_ticks.load(Ordering::Relaxed), 10);
    assert!(rig.controller.player_state().unwrap().slope.applied < 0.0);
}

#[test]
fn test_slope_band_held_on_slope_only_ticks() {
    let mut cfg = instant();
    cfg.slope.enabled = true;
    cfg.slope.clamp_enabled = true;
    cfg.slope.min_final = 50.0;
    cfg.slope.uphill_per_deg = 2.0;
    cfg.slope.max_abs = 60.0;
    cfg.general.eval_throttle_ms = 1000;
    let mut rig = Rig::new(cfg);
    rig.tick();
    assert_eq!(rig.speed(), 55.0);

    for _ in 0..15 {
        rig.walk(8.0, 4.0);
        rig.tick();
        assert!(rig.speed() >= 50.0 - 1e-3, "fell to {}", rig.speed());
    }
    let metrics = rig.controller.metrics();
    assert_eq!(metrics.slope_only_ticks.load(Ordering::Relaxed), 15);
    assert!(rig.controller.player_state().unwrap().slope.applied < -5.0);
}

#[test]
fn test_ceiling_held_on_slope_only_ticks() {
    let mut cfg = instant();
    cfg.slope.enabled = true;
    cfg.slope.downhill_per_deg = 1.0;
    cfg.general.ceiling_enabled = true;
    cfg.general.max_final_speed = 60.0;
    cfg.general.eval_throttle_ms = 1000;
    let mut rig = Rig::new(cfg);
    rig.tick();

    for _ in 0..15 {
        rig.walk(8.0, -4.0);
        rig.tick();
        assert!(rig.speed() <= 60.0 + 1e-3, "rose to {}", rig.speed());
    }
    assert!(rig.controller.player_state().unwrap().slope.applied > 5.0);
}

#[test]
fn test_median_window_shrinks_with_config() {
    let mut cfg = instant();
    cfg.slope.enabled = true;
    cfg.slope.median_n = 5;
    let mut rig = Rig::new(cfg);
    for _ in 0..20 {
        rig.walk(8.0, 4.0);
        rig.tick();
    }
    assert_eq!(rig.controller.player_state().unwrap().slope_estimates.len(), 5);

    rig.controller.config().update(|c| c.slope.median_n = 1);
    for _ in 0..3 {
        rig.walk(8.0, 4.0);
        rig.tick();
    }
    assert_eq!(rig.controller.player_state().unwrap().slope_estimates.len(), 1);
}

#[test]
fn test_save_load_round_trip_v4() {
    let mut rig = Rig::new(ControllerConfig::default());
    let snapshot = Snapshot {
        jogging_mode: true,
        movement_delta: -20.0,
        diagonal_delta: -5.0,
        baseline: 100.0,
        slope_delta: -3.0,
        attack_delta: 0.0,
    };
    let record = encode_record_version(&snapshot, 4).unwrap();
    // Value the host itself persisted
    rig.host.set_value(PLAYER, AttributeChannel::SpeedMult, 72.0);

    rig.bus.emit_pre_load();
    rig.bus.emit_post_load(Some(&record));
    rig.bus.emit_post_load(Some(&record));
    assert_eq!(rig.pump(), 1);
    assert!(rig.controller.is_loading());
    assert_eq!(rig.speed(), 72.0);

    rig.ticks(30);
    assert!(!rig.controller.is_loading());
    assert_eq!(rig.speed(), 72.0);
    assert!(rig.controller.jogging_mode());
    assert_eq!(rig.host.write_count(PLAYER, AttributeChannel::CarryWeight), 6);
    assert!((rig.host.value(PLAYER, AttributeChannel::CarryWeight) - 300.0).abs() < 1e-3);
}

#[test]
fn test_save_then_load_reproduces_value() {
    let mut cfg = instant();
    cfg.slope.enabled = true;
    let mut rig = Rig::new(cfg);
    rig.host.move_axes = (1.0, 1.0);
    for _ in 0..20 {
        rig.walk(8.0, 4.0);
        rig.tick();
    }
    let saved_speed = rig.speed();
    let record = rig.controller.save_record(&rig.host).unwrap();

    // Host rehydrates a drifted value; the persisted baseline wins
    rig.host.set_value(PLAYER, AttributeChannel::SpeedMult, 100.0);
    rig.bus.emit_pre_load();
    rig.bus.emit_post_load(Some(&record));
    rig.pump();
    assert!((rig.speed() - saved_speed).abs() < 1e-3, "{} vs {saved_speed}", rig.speed());
    let state = rig.controller.player_state().unwrap();
    assert!(state.slope.applied < 0.0);
    assert!(state.diagonal.applied < 0.0);
}

#[test]
fn test_no_writes_while_loading() {
    let mut rig = Rig::new(instant());
    rig.bus.emit_pre_load();
    rig.host.clear_write_log();
    rig.bus.emit_combat(PLAYER);
    rig.bus.emit_input(&InputEvent::button("Shout", 0, 1.0, 0.0));
    rig.pump();
    rig.ticks(5);
    assert!(rig.host.writes().is_empty());
    assert!(rig.controller.player_state().is_none());
}

#[test]
fn test_load_completes_when_task_queue_saturated() {
    let mut rig = Rig::new(instant());
    for _ in 0..TASK_QUEUE_CAPACITY {
        rig.bus.emit_combat(PLAYER);
    }
    rig.bus.emit_pre_load();
    rig.bus.emit_post_load(None);
    rig.pump();
    assert!(rig.controller.is_loading());

    rig.ticks(40);
    assert!(!rig.controller.is_loading());
    rig.tick();
    assert_eq!(rig.speed(), 55.0);
}

#[test]
fn test_load_without_record_resets_state() {
    let mut rig = Rig::new(instant());
    rig.ticks(2);
    rig.bus.emit_pre_load();
    rig.bus.emit_post_load(None);
    rig.pump();
    let state = rig.controller.player_state().unwrap();
    assert!(state.is_clean());
    assert!(!rig.controller.jogging_mode());
}

#[test]
fn test_unavailable_player_retried_next_tick() {
    let mut rig = Rig::new(instant());
    if let Some(actor) = rig.host.actor_mut(PLAYER) {
        actor.available = false;
    }
    rig.tick();
    assert_eq!(rig.controller.metrics().skipped_unavailable.load(Ordering::Relaxed), 1);
    assert!(rig.controller.player_state().unwrap().is_clean());

    if let Some(actor) = rig.host.actor_mut(PLAYER) {
        actor.available = true;
    }
    rig.tick();
    assert_eq!(rig.speed(), 55.0);
}

#[test]
fn test_jogging_toggle_applies_immediately() {
    let mut rig = Rig::new(ControllerConfig::default());
    rig.bus.emit_input(&InputEvent::button("Shout", 0, 1.0, 0.0));
    rig.pump();
    assert!(rig.controller.jogging_mode());
    assert_eq!(rig.speed(), 85.0);
    assert_eq!(rig.host.write_count(PLAYER, AttributeChannel::CarryWeight), 2);

    // Inside the cooldown
    rig.bus.emit_input(&InputEvent::button("Shout", 0, 1.0, 0.0));
    rig.pump();
    assert!(rig.controller.jogging_mode());

    rig.clock.advance(200);
    rig.bus.emit_input(&InputEvent::button("Shout", 0, 1.0, 0.0));
    rig.pump();
    assert!(!rig.controller.jogging_mode());
    assert_eq!(rig.speed(), 55.0);
}

#[test]
fn test_sprint_latch_bridges_graph_lag() {
    let mut cfg = instant();
    cfg.sprint_anim.enabled = false;
    let mut rig = Rig::new(cfg);
    rig.bus.emit_input(&InputEvent::button("Sprint", 42, 1.0, 0.0));
    rig.tick();
    assert_eq!(rig.speed(), 80.0);

    // Graph never confirmed, latch expires
    rig.ticks(4);
    assert_eq!(rig.speed(), 55.0);
}

#[test]
fn test_sprint_flip_forces_refresh() {
    let mut rig = Rig::new(instant());
    rig.tick();
    assert_eq!(rig.host.write_count(PLAYER, AttributeChannel::CarryWeight), 0);
    if let Some(actor) = rig.host.actor_mut(PLAYER) {
        actor.graph_bools.insert("bIsSprinting".to_string(), true);
    }
    rig.tick();
    assert_eq!(rig.host.write_count(PLAYER, AttributeChannel::CarryWeight), 2);
    assert_eq!(rig.speed(), 80.0);
}

#[test]
fn test_npc_eviction_outside_radius() {
    let npc = EntityId(0x7000);
    let mut cfg = instant();
    cfg.npc.enabled = true;
    cfg.npc.radius = 2048.0;
    let mut rig = Rig::new(cfg);
    rig.host.spawn_npc(npc, Vec3::new(300.0, 0.0, 0.0));
    rig.tick();
    assert_eq!(rig.controller.tracked_npc_count(), 1);
    assert_eq!(rig.host.value(npc, AttributeChannel::SpeedMult), 55.0);

    if let Some(actor) = rig.host.actor_mut(npc) {
        actor.world.position = Vec3::new(3000.0, 0.0, 0.0);
    }
    rig.tick();
    assert_eq!(rig.controller.tracked_npc_count(), 0);
    assert_eq!(rig.host.value(npc, AttributeChannel::SpeedMult), 100.0);
    assert!(rig.controller.npc_state(npc).is_none());
}

#[test]
fn test_npc_inherits_jogging_mode() {
    let npc = EntityId(0x7001);
    let mut cfg = ControllerConfig::default();
    cfg.npc.enabled = true;
    let mut rig = Rig::new(cfg);
    rig.controller.set_jogging_mode(true);
    rig.host.spawn_npc(npc, Vec3::new(100.0, 0.0, 0.0));
    rig.tick();
    assert!(rig.controller.npc_state(npc).unwrap().jogging);
}

#[test]
fn test_npc_combat_event_evaluates_tracked_npc() {
    let npc = EntityId(0x7002);
    let mut cfg = instant();
    cfg.npc.enabled = true;
    let mut rig = Rig::new(cfg);
    rig.host.spawn_npc(npc, Vec3::new(100.0, 0.0, 0.0));
    rig.tick();
    assert_eq!(rig.host.value(npc, AttributeChannel::SpeedMult), 55.0);

    if let Some(actor) = rig.host.actor_mut(npc) {
        actor.behavior.in_combat = true;
    }
    rig.clock.advance(20);
    rig.bus.emit_combat(npc);
    rig.pump();
    assert_eq!(rig.host.value(npc, AttributeChannel::SpeedMult), 100.0);
}

#[test]
fn test_equip_updates_attack_speed() {
    let mut cfg = instant();
    cfg.attack.only_when_drawn = false;
    let mut rig = Rig::new(cfg);
    rig.tick();
    assert!((rig.host.value(PLAYER, AttributeChannel::AttackSpeed) - 1.3).abs() < 1e-5);

    if let Some(actor) = rig.host.actor_mut(PLAYER) {
        actor.world.equipped_weight = 20.0;
    }
    rig.bus.emit_equip(PLAYER);
    rig.pump();
    assert!((rig.host.value(PLAYER, AttributeChannel::AttackSpeed) - 0.7).abs() < 1e-5);
}

#[test]
fn test_beast_form_purges_player() {
    let mut rig = Rig::new(instant());
    rig.tick();
    assert_eq!(rig.speed(), 55.0);
    if let Some(actor) = rig.host.actor_mut(PLAYER) {
        actor.behavior.transformed = true;
    }
    rig.tick();
    assert_eq!(rig.speed(), 100.0);
}

#[test]
fn test_config_replace_takes_effect_next_tick() {
    let mut rig = Rig::new(instant());
    rig.tick();
    assert_eq!(rig.speed(), 55.0);
    rig.controller
        .config()
        .update(|cfg| cfg.movement.reduce_out_of_combat = 30.0);
    rig.tick();
    assert_eq!(rig.speed(), 70.0);
}
