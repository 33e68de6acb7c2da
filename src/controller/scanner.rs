//! NPC population scanner
//!
//! Each full tick marks the relevant set with a fresh epoch: the nearest
//! `max_tracked` actors inside the radius (or every loaded actor when the
//! radius is 0). Records not marked in the current epoch are reverted and
//! dropped, so memory stays bounded by the relevant set.

use tracing::{debug, warn};

use crate::controller::commit::revert_entity;
use crate::controller::compose::{evaluate_full, EvalOutcome, TickContext};
use crate::controller::constants::driver::MAX_UNAVAILABLE_RETRIES;
use crate::controller::state::EntityStore;
use crate::host::{ActorScope, EntityId, Host};
use crate::metrics::Metrics;
use crate::util::vec3::Vec3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub evaluated: usize,
    pub evicted: usize,
    pub skipped: usize,
}

/// Reusable scan buffers plus the epoch counter
#[derive(Debug, Default)]
pub struct PopulationScanner {
    epoch: u64,
    actors: Vec<EntityId>,
    candidates: Vec<(EntityId, f32)>,
    stale: Vec<EntityId>,
}

impl PopulationScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Evaluate the relevant NPC set and evict everything else
    pub fn scan<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        store: &mut EntityStore,
        ctx: &TickContext<'_>,
        player_position: Vec3,
        jogging: bool,
    ) -> ScanReport {
        let mut report = ScanReport::default();
        self.epoch += 1;
        let npc = &ctx.cfg.npc;

        if npc.enabled {
            let scope = if npc.radius <= 0.0 {
                ActorScope::All
            } else {
                ActorScope::Nearby
            };
            self.actors.clear();
            host.actors(scope, &mut self.actors);

            let player = host.player();
            self.candidates.clear();
            for &id in &self.actors {
                if id == player {
                    continue;
                }
                let Ok(world) = host.world(id) else {
                    report.skipped += 1;
                    continue;
                };
                let distance = world.position.distance_to(player_position);
                if npc.radius > 0.0 && !(distance <= npc.radius) {
                    continue;
                }
                self.candidates.push((id, distance));
            }
            self.candidates.sort_unstable_by(|a, b| a.1.total_cmp(&b.1));
            self.candidates.truncate(npc.max_tracked);

            for &(id, _) in &self.candidates {
                let state = store.npc_entry(id, jogging);
                state.jogging = jogging;
                state.seen_epoch = self.epoch;
                match evaluate_full(host, state, ctx, false) {
                    Ok(EvalOutcome::Evaluated) => {
                        state.unavailable_ticks = 0;
                        report.evaluated += 1;
                    }
                    Ok(EvalOutcome::Released) => {
                        store.remove_npc(id);
                        report.evicted += 1;
                        Metrics::bump(&ctx.metrics.evictions);
                    }
                    Ok(EvalOutcome::Skipped) => report.skipped += 1,
                    Err(e) => {
                        report.skipped += 1;
                        Metrics::bump(&ctx.metrics.skipped_unavailable);
                        debug!("Skipping NPC {} this tick: {}", id, e);
                    }
                }
            }
        }

        self.stale.clear();
        store.stale_npcs(self.epoch, &mut self.stale);
        for &id in &self.stale {
            if evict(host, store, id, ctx.metrics) {
                report.evicted += 1;
            }
        }

        ctx.metrics
            .tracked_npcs
            .store(store.npc_count() as u64, std::sync::atomic::Ordering::Relaxed);
        report
    }
}

/// Revert and drop one NPC record; returns true once the record is gone
///
/// A record whose host entity is temporarily unavailable stays in the store
/// and is retried on later ticks, up to a bounded number of attempts.
pub fn evict<H: Host + ?Sized>(host: &mut H, store: &mut EntityStore, id: EntityId, metrics: &Metrics) -> bool {
    let Some(mut state) = store.remove_npc(id) else {
        return false;
    };
    match revert_entity(host, &mut state, metrics) {
        Ok(()) => {
            Metrics::bump(&metrics.evictions);
            true
        }
        Err(e) if state.unavailable_ticks < MAX_UNAVAILABLE_RETRIES => {
            state.unavailable_ticks += 1;
            Metrics::bump(&metrics.skipped_unavailable);
            debug!("Deferring eviction of {}: {}", id, e);
            store.insert_npc(state);
            false
        }
        Err(e) => {
            warn!("Dropping state of {} without revert: {}", id, e);
            Metrics::bump(&metrics.evictions);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::host::memory::MemoryHost;
    use crate::host::AttributeChannel;

    const PLAYER: EntityId = EntityId(0x14);

    fn npc_cfg() -> ControllerConfig {
        let mut cfg = ControllerConfig::default();
        cfg.npc.enabled = true;
        cfg.npc.radius = 1000.0;
        cfg.smoothing.enabled = false;
        cfg
    }

    fn run(
        scanner: &mut PopulationScanner,
        host: &mut MemoryHost,
        store: &mut EntityStore,
        cfg: &ControllerConfig,
        metrics: &Metrics,
        now_ms: u64,
    ) -> ScanReport {
        let ctx = TickContext {
            cfg,
            now_ms,
            metrics,
            sprint_latch: false,
        };
        scanner.scan(host, store, &ctx, Vec3::ZERO, false)
    }

    #[test]
    fn test_tracks_nearest_within_cap() {
        let mut host = MemoryHost::new(PLAYER);
        for i in 0..5u32 {
            host.spawn_npc(EntityId(0x100 + i), Vec3::new(100.0 * (5 - i) as f32, 0.0, 0.0));
        }
        let mut cfg = npc_cfg();
        cfg.npc.max_tracked = 3;
        let metrics = Metrics::new();
        let mut store = EntityStore::new();
        let mut scanner = PopulationScanner::new();

        let report = run(&mut scanner, &mut host, &mut store, &cfg, &metrics, 100);
        assert_eq!(report.evaluated, 3);
        assert_eq!(store.npc_count(), 3);
        // Nearest three are the highest ids
        assert!(store.contains_npc(EntityId(0x104)));
        assert!(store.contains_npc(EntityId(0x102)));
        assert!(!store.contains_npc(EntityId(0x100)));
        assert_eq!(host.value(EntityId(0x100), AttributeChannel::SpeedMult), 100.0);
    }

    #[test]
    fn test_evicts_outside_radius_within_one_tick() {
        let npc = EntityId(0x200);
        let mut host = MemoryHost::new(PLAYER);
        host.spawn_npc(npc, Vec3::new(500.0, 0.0, 0.0));
        let cfg = npc_cfg();
        let metrics = Metrics::new();
        let mut store = EntityStore::new();
        let mut scanner = PopulationScanner::new();

        run(&mut scanner, &mut host, &mut store, &cfg, &metrics, 100);
        assert_eq!(host.value(npc, AttributeChannel::SpeedMult), 55.0);

        host.actor_mut(npc).unwrap().world.position = Vec3::new(5000.0, 0.0, 0.0);
        let report = run(&mut scanner, &mut host, &mut store, &cfg, &metrics, 200);
        assert_eq!(report.evicted, 1);
        assert_eq!(store.npc_count(), 0);
        assert_eq!(host.value(npc, AttributeChannel::SpeedMult), 100.0);
    }

    #[test]
    fn test_disabling_npcs_purges_all() {
        let mut host = MemoryHost::new(PLAYER);
        host.spawn_npc(EntityId(0x300), Vec3::new(10.0, 0.0, 0.0));
        host.spawn_npc(EntityId(0x301), Vec3::new(20.0, 0.0, 0.0));
        let mut cfg = npc_cfg();
        let metrics = Metrics::new();
        let mut store = EntityStore::new();
        let mut scanner = PopulationScanner::new();
        run(&mut scanner, &mut host, &mut store, &cfg, &metrics, 100);
        assert_eq!(store.npc_count(), 2);

        cfg.npc.enabled = false;
        run(&mut scanner, &mut host, &mut store, &cfg, &metrics, 200);
        assert_eq!(store.npc_count(), 0);
        assert_eq!(host.value(EntityId(0x301), AttributeChannel::SpeedMult), 100.0);
    }

    #[test]
    fn test_unavailable_eviction_is_retried() {
        let npc = EntityId(0x400);
        let mut host = MemoryHost::new(PLAYER);
        host.spawn_npc(npc, Vec3::new(10.0, 0.0, 0.0));
        let mut cfg = npc_cfg();
        let metrics = Metrics::new();
        let mut store = EntityStore::new();
        let mut scanner = PopulationScanner::new();
        run(&mut scanner, &mut host, &mut store, &cfg, &metrics, 100);

        host.actor_mut(npc).unwrap().available = false;
        cfg.npc.enabled = false;
        run(&mut scanner, &mut host, &mut store, &cfg, &metrics, 200);
        assert_eq!(store.npc_count(), 1);

        host.actor_mut(npc).unwrap().available = true;
        run(&mut scanner, &mut host, &mut store, &cfg, &metrics, 300);
        assert_eq!(store.npc_count(), 0);
        assert_eq!(host.value(npc, AttributeChannel::SpeedMult), 100.0);
    }

    #[test]
    fn test_unlimited_radius_uses_all_scope() {
        let mut host = MemoryHost::new(PLAYER);
        host.nearby_radius = 50.0;
        host.spawn_npc(EntityId(0x500), Vec3::new(10_000.0, 0.0, 0.0));
        let mut cfg = npc_cfg();
        cfg.npc.radius = 0.0;
        let metrics = Metrics::new();
        let mut store = EntityStore::new();
        let mut scanner = PopulationScanner::new();
        run(&mut scanner, &mut host, &mut store, &cfg, &metrics, 100);
        assert!(store.contains_npc(EntityId(0x500)));
    }
}
