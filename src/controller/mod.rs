//! Speed controller core
//!
//! `SpeedController` owns the per-entity store and runs on the apply
//! context: the host drains the task queue by calling
//! [`SpeedController::run_pending`] from its serialized task execution.

pub mod anim;
pub mod attack;
pub mod commit;
pub mod compose;
pub mod constants;
pub mod driver;
pub mod effects;
pub mod events;
pub mod flags;
pub mod scanner;
pub mod smoothing;
pub mod snapshot;
pub mod state;

#[cfg(test)]
mod tests;

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{ConfigHandle, ControllerConfig};
use crate::host::events::EventBus;
use crate::host::{AttributeChannel, EntityId, Host, HostError};
use crate::metrics::Metrics;
use crate::util::clock::{Clock, Throttle, ThrottleChannel};
use crate::util::vec3::Vec3;

use self::commit::{force_refresh, revert_entity};
use self::compose::{evaluate_full, evaluate_slope_only, EvalOutcome, TickContext};
use self::constants::driver::TASK_QUEUE_CAPACITY;
use self::driver::{EvalCause, Task, TaskQueue, TickDriver};
use self::effects::sprint;
use self::events::ControllerEvents;
use self::flags::SharedFlags;
use self::scanner::{evict, PopulationScanner, ScanReport};
use self::snapshot::{apply_snapshot, decode_records, encode_record, GraceWindow, RecordError, Snapshot};
use self::state::{EntityState, EntityStore};

/// Post-load progress
#[derive(Debug, Clone, Copy, PartialEq)]
enum LoadPhase {
    Idle,
    /// Record decoded, waiting for the player to become available
    Pending(Snapshot),
    Grace(GraceWindow),
}

pub struct SpeedController {
    config: ConfigHandle,
    clock: Arc<dyn Clock>,
    flags: Arc<SharedFlags>,
    metrics: Arc<Metrics>,
    queue: TaskQueue,
    store: EntityStore,
    scanner: PopulationScanner,
    throttle: Throttle,
    jogging: bool,
    /// Player sprint flag as last seen by the heartbeat
    heartbeat_sprint: bool,
    load: LoadPhase,
    scratch: Vec<EntityId>,
}

impl SpeedController {
    pub fn new(config: ConfigHandle, clock: Arc<dyn Clock>) -> Self {
        Self::with_metrics(config, clock, Arc::new(Metrics::new()))
    }

    pub fn with_metrics(config: ConfigHandle, clock: Arc<dyn Clock>, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            clock,
            flags: Arc::new(SharedFlags::new()),
            metrics,
            queue: TaskQueue::new(TASK_QUEUE_CAPACITY),
            store: EntityStore::new(),
            scanner: PopulationScanner::new(),
            throttle: Throttle::new(),
            jogging: false,
            heartbeat_sprint: false,
            load: LoadPhase::Idle,
            scratch: Vec::new(),
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn flags(&self) -> &Arc<SharedFlags> {
        &self.flags
    }

    /// Event sink for host callbacks
    pub fn events(&self) -> ControllerEvents {
        ControllerEvents::new(
            self.flags.clone(),
            self.queue.sender(),
            self.config.clone(),
            self.clock.clone(),
        )
    }

    pub fn install(&self, bus: &mut dyn EventBus) {
        self.events().install(bus);
    }

    /// Spawn the heartbeat thread at the configured interval
    pub fn start_heartbeat(&self) -> io::Result<TickDriver> {
        let interval = Duration::from_millis(self.config.snapshot().general.heartbeat_ms.max(1));
        TickDriver::start(interval, self.queue.sender(), self.flags.clone())
    }

    pub fn jogging_mode(&self) -> bool {
        self.jogging
    }

    pub fn set_jogging_mode(&mut self, jogging: bool) {
        if self.jogging != jogging {
            self.jogging = jogging;
            if let Some(player) = self.store.player_mut() {
                player.force_bypass = true;
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.flags.is_loading()
    }

    pub fn tracked_npc_count(&self) -> usize {
        self.store.npc_count()
    }

    pub fn player_state(&self) -> Option<&EntityState> {
        self.store.player()
    }

    pub fn npc_state(&self, id: EntityId) -> Option<&EntityState> {
        self.store.npc(id)
    }

    /// Drain and execute every queued task; returns the number handled
    pub fn run_pending<H: Host + ?Sized>(&mut self, host: &mut H) -> usize {
        let mut handled = 0;
        while let Some(task) = self.queue.try_next() {
            self.handle_task(host, task);
            handled += 1;
        }
        handled
    }

    pub fn handle_task<H: Host + ?Sized>(&mut self, host: &mut H, task: Task) {
        match task {
            Task::Heartbeat => self.heartbeat(host),
            Task::Evaluate { entity, cause } => self.evaluate_event(host, entity, cause),
            Task::Equip(entity) => self.on_equip(host, entity),
            Task::ToggleJogging => self.toggle_jogging(host),
            Task::Restore(record) => self.begin_restore(host, record.as_deref()),
        }
    }

    fn tick_context<'a>(
        metrics: &'a Metrics,
        flags: &SharedFlags,
        cfg: &'a ControllerConfig,
        now_ms: u64,
    ) -> TickContext<'a> {
        TickContext {
            cfg,
            now_ms,
            metrics,
            sprint_latch: sprint::latch_active(flags.sprint_input_ms(), now_ms, cfg.input.sprint_latch_ms),
        }
    }

    /// One heartbeat: full evaluation, or slope-only inside the throttle window
    pub fn heartbeat<H: Host + ?Sized>(&mut self, host: &mut H) {
        let started = Instant::now();
        self.flags.release_heartbeat();
        let cfg = self.config.snapshot();
        let now_ms = self.clock.now_ms();

        if self.flags.is_loading() {
            if matches!(self.load, LoadPhase::Idle) {
                if let Some(record) = self.flags.take_parked_restore() {
                    debug!("Starting parked post-load restore");
                    self.begin_restore(host, record.as_deref());
                    return;
                }
            }
            self.service_load(host, &cfg, now_ms);
            return;
        }

        if self.throttle.try_pass(ThrottleChannel::Main, now_ms, cfg.general.eval_throttle_ms) {
            self.full_tick(host, &cfg, now_ms);
        } else {
            self.slope_tick(host, &cfg, now_ms);
        }
        self.refresh_on_sprint_flip(host, now_ms);
        self.metrics.record_tick_time(started.elapsed());
    }

    fn full_tick<H: Host + ?Sized>(&mut self, host: &mut H, cfg: &ControllerConfig, now_ms: u64) -> ScanReport {
        let player_position = self.evaluate_player(host, cfg, now_ms).unwrap_or(Vec3::ZERO);

        let ctx = Self::tick_context(&self.metrics, &self.flags, cfg, now_ms);
        self.scanner
            .scan(host, &mut self.store, &ctx, player_position, self.jogging)
    }

    fn slope_tick<H: Host + ?Sized>(&mut self, host: &mut H, cfg: &ControllerConfig, now_ms: u64) {
        let ctx = Self::tick_context(&self.metrics, &self.flags, cfg, now_ms);
        if let Some(player) = self.store.player_mut() {
            if let Err(e) = evaluate_slope_only(host, player, &ctx, true) {
                Metrics::bump(&self.metrics.skipped_unavailable);
                debug!("Slope tick skipped for player: {}", e);
            }
        }
        self.scratch.clear();
        self.store.npc_ids(&mut self.scratch);
        for &id in &self.scratch {
            if let Some(state) = self.store.npc_mut(id) {
                if evaluate_slope_only(host, state, &ctx, false).is_err() {
                    Metrics::bump(&self.metrics.skipped_unavailable);
                }
            }
        }
    }

    /// Full evaluation of the player; returns the player's position
    fn evaluate_player<H: Host + ?Sized>(&mut self, host: &mut H, cfg: &ControllerConfig, now_ms: u64) -> Option<Vec3> {
        let id = host.player();
        if self.store.player().is_some_and(|p| p.id != id) {
            // Player identity changed under us; release the old record
            if let Some(mut old) = self.store.take_player() {
                if let Err(e) = revert_entity(host, &mut old, &self.metrics) {
                    warn!("Dropping previous player state without revert: {}", e);
                }
            }
        }

        let ctx = Self::tick_context(&self.metrics, &self.flags, cfg, now_ms);
        let state = self.store.player_entry(id, self.jogging);
        state.jogging = self.jogging;
        match evaluate_full(host, state, &ctx, true) {
            Ok(EvalOutcome::Evaluated) | Ok(EvalOutcome::Released) | Ok(EvalOutcome::Skipped) => {}
            Err(e) => {
                Metrics::bump(&self.metrics.skipped_unavailable);
                debug!("Skipping player this tick: {}", e);
                return None;
            }
        }
        host.world(id).ok().map(|w| w.position)
    }

    /// Combat or animation event; debounced separately from the main path
    fn evaluate_event<H: Host + ?Sized>(&mut self, host: &mut H, entity: EntityId, cause: EvalCause) {
        if self.flags.is_loading() {
            return;
        }
        let cfg = self.config.snapshot();
        let now_ms = self.clock.now_ms();
        let is_player = entity == host.player();
        if !is_player && (cause == EvalCause::Animation || !self.store.contains_npc(entity)) {
            return;
        }
        if !self.throttle.try_pass(ThrottleChannel::Event, now_ms, cfg.general.eval_throttle_ms) {
            return;
        }
        Metrics::bump(&self.metrics.event_evaluations);

        if is_player {
            self.evaluate_player(host, &cfg, now_ms);
            return;
        }
        let ctx = Self::tick_context(&self.metrics, &self.flags, &cfg, now_ms);
        let Some(state) = self.store.npc_mut(entity) else {
            return;
        };
        match evaluate_full(host, state, &ctx, false) {
            Ok(EvalOutcome::Released) => {
                self.store.remove_npc(entity);
                Metrics::bump(&self.metrics.evictions);
            }
            Ok(_) => {}
            Err(e) => {
                Metrics::bump(&self.metrics.skipped_unavailable);
                debug!("Skipping {} after {:?} event: {}", entity, cause, e);
            }
        }
    }

    /// Recompute attack cadence now, then re-evaluate movement
    fn on_equip<H: Host + ?Sized>(&mut self, host: &mut H, entity: EntityId) {
        if self.flags.is_loading() {
            return;
        }
        let cfg = self.config.snapshot();
        let is_player = entity == host.player();
        let jogging = self.jogging;
        let state = if is_player {
            Some(self.store.player_entry(entity, jogging))
        } else {
            self.store.npc_mut(entity)
        };
        let Some(state) = state else {
            return;
        };
        let refreshed = host.behavior(entity).and_then(|behavior| {
            let world = host.world(entity)?;
            attack::update_attack(host, state, &behavior, &world, &cfg, &self.metrics)
        });
        if let Err(e) = refreshed {
            Metrics::bump(&self.metrics.skipped_unavailable);
            debug!("Attack refresh skipped for {}: {}", entity, e);
        }
        self.evaluate_event(host, entity, EvalCause::Combat);
    }

    /// Flip jogging mode, apply the new base case at once and nudge the host
    pub fn toggle_jogging<H: Host + ?Sized>(&mut self, host: &mut H) {
        if self.flags.is_loading() {
            return;
        }
        let cfg = self.config.snapshot();
        let now_ms = self.clock.now_ms();
        if !self.throttle.try_pass(ThrottleChannel::Toggle, now_ms, cfg.input.toggle_cooldown_ms) {
            return;
        }
        self.jogging = !self.jogging;
        info!("Jogging mode {}", if self.jogging { "on" } else { "off" });

        let player = host.player();
        self.store.player_entry(player, self.jogging).force_bypass = true;
        self.evaluate_player(host, &cfg, now_ms);
        self.refresh(host, player, now_ms);
    }

    fn refresh<H: Host + ?Sized>(&mut self, host: &mut H, entity: EntityId, now_ms: u64) {
        match force_refresh(host, entity, &self.metrics) {
            Ok(()) => self.flags.note_refresh(now_ms),
            Err(e) => debug!("Forced refresh failed: {}", e),
        }
    }

    fn refresh_on_sprint_flip<H: Host + ?Sized>(&mut self, host: &mut H, now_ms: u64) {
        let player = host.player();
        let sprinting = sprint::sprinting_by_graph(host, player);
        if sprinting != self.heartbeat_sprint {
            self.heartbeat_sprint = sprinting;
            self.refresh(host, player, now_ms);
        }
    }

    /// Revert every contribution on every tracked entity and forget them
    pub fn clear_all<H: Host + ?Sized>(&mut self, host: &mut H) {
        if let Some(mut player) = self.store.take_player() {
            if let Err(e) = revert_entity(host, &mut player, &self.metrics) {
                warn!("Could not revert player {}: {}", player.id, e);
                self.store.set_player(player);
            }
        }
        self.scratch.clear();
        self.store.npc_ids(&mut self.scratch);
        for &id in &self.scratch {
            evict(host, &mut self.store, id, &self.metrics);
        }
        self.metrics
            .tracked_npcs
            .store(self.store.npc_count() as u64, std::sync::atomic::Ordering::Relaxed);
    }

    /// Player snapshot for persistence
    pub fn capture_snapshot<H: Host + ?Sized>(&self, host: &H) -> Result<Snapshot, HostError> {
        let player = host.player();
        let live = host.read_attribute(player, AttributeChannel::SpeedMult)?;
        let state = self.store.player().filter(|s| s.id == player);
        Ok(Snapshot::capture(state, live, self.jogging))
    }

    /// Encoded record for the host's save event
    pub fn save_record<H: Host + ?Sized>(&self, host: &H) -> Result<Vec<u8>, RecordError> {
        let snapshot = self.capture_snapshot(host).unwrap_or_else(|e| {
            debug!("Saving without live value: {}", e);
            Snapshot {
                jogging_mode: self.jogging,
                ..Snapshot::default()
            }
        });
        encode_record(&snapshot)
    }

    /// Decode the persisted blob and start the restore
    ///
    /// Every tracked record is dropped without writes: the host has already
    /// rehydrated its own attribute values.
    pub fn begin_restore<H: Host + ?Sized>(&mut self, host: &mut H, record: Option<&[u8]>) {
        self.flags.set_loading(true);
        self.store.clear();
        self.scanner = PopulationScanner::new();

        let scan = record.map(decode_records).unwrap_or_default();
        for _ in 0..scan.skipped {
            Metrics::bump(&self.metrics.records_skipped);
        }
        let snapshot = scan.snapshot.unwrap_or_else(|| Snapshot {
            jogging_mode: false,
            ..Snapshot::default()
        });
        self.jogging = snapshot.jogging_mode;
        self.load = LoadPhase::Pending(snapshot);

        let cfg = self.config.snapshot();
        let now_ms = self.clock.now_ms();
        self.service_load(host, &cfg, now_ms);
    }

    fn service_load<H: Host + ?Sized>(&mut self, host: &mut H, cfg: &ControllerConfig, now_ms: u64) {
        if let LoadPhase::Pending(snapshot) = self.load {
            let player = host.player();
            match apply_snapshot(host, player, &snapshot, &self.metrics) {
                Ok(state) => {
                    self.store.set_player(state);
                    Metrics::bump(&self.metrics.restores);
                    info!(
                        "Restored player state (jogging={}, movement={:.2}, diagonal={:.2}, slope={:.2})",
                        snapshot.jogging_mode, snapshot.movement_delta, snapshot.diagonal_delta, snapshot.slope_delta
                    );
                    self.load = LoadPhase::Grace(GraceWindow::open(now_ms, &cfg.restore));
                }
                Err(e) => {
                    debug!("Restore deferred: {}", e);
                    return;
                }
            }
        }

        if let LoadPhase::Grace(mut window) = self.load {
            let step = window.poll(now_ms);
            if step.refresh {
                let player = host.player();
                self.refresh(host, player, now_ms);
            }
            if step.finished {
                self.load = LoadPhase::Idle;
                self.throttle.reset();
                self.flags.set_loading(false);
                debug!("Post-load grace window closed");
            } else {
                self.load = LoadPhase::Grace(window);
            }
        }
    }
}
