use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dynamic_speed_controller::config::{ConfigHandle, ControllerConfig};
use dynamic_speed_controller::host::events::{InputEvent, LocalEventBus};
use dynamic_speed_controller::host::memory::MemoryHost;
use dynamic_speed_controller::host::{AttributeChannel, EntityId, WeaponState};
use dynamic_speed_controller::metrics::{self, Metrics};
use dynamic_speed_controller::util::clock::MonotonicClock;
use dynamic_speed_controller::util::vec3::Vec3;
use dynamic_speed_controller::SpeedController;

const PLAYER: EntityId = EntityId(0x14);
const FRAME: Duration = Duration::from_millis(16);

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Simulated world driven frame by frame
struct DemoWorld {
    host: MemoryHost,
    npcs: Vec<EntityId>,
    heading: f32,
    distance: f32,
}

impl DemoWorld {
    fn new(npc_count: u32, rng: &mut impl Rng) -> Self {
        let mut host = MemoryHost::new(PLAYER);
        let mut npcs = Vec::with_capacity(npc_count as usize);
        for i in 0..npc_count {
            let id = EntityId(0x1000 + i);
            let position = Vec3::new(rng.gen_range(-3000.0..3000.0), rng.gen_range(-3000.0..3000.0), 0.0);
            host.spawn_npc(id, position);
            npcs.push(id);
        }
        Self {
            host,
            npcs,
            heading: 0.0,
            distance: 0.0,
        }
    }

    /// Walk the player over rolling hills and let NPCs wander
    fn step(&mut self, dt: f32, rng: &mut impl Rng) {
        self.heading += rng.gen_range(-0.05..0.05);
        let step = 180.0 * dt;
        self.distance += step;
        if let Some(actor) = self.host.actor_mut(PLAYER) {
            let p = actor.world.position;
            actor.world.position = Vec3::new(
                p.x + self.heading.cos() * step,
                p.y + self.heading.sin() * step,
                (self.distance / 400.0).sin() * 120.0,
            );
        }
        self.host.move_axes = if (self.distance / 900.0) as u32 % 2 == 0 {
            (0.0, 1.0)
        } else {
            (0.7, 0.7)
        };

        for &id in &self.npcs {
            if let Some(actor) = self.host.actor_mut(id) {
                let p = actor.world.position;
                actor.world.position = Vec3::new(
                    p.x + rng.gen_range(-60.0..60.0) * dt,
                    p.y + rng.gen_range(-60.0..60.0) * dt,
                    p.z,
                );
                if rng.gen_bool(0.002) {
                    actor.behavior.in_combat = !actor.behavior.in_combat;
                }
            }
        }
    }

    fn toggle_weapon(&mut self) {
        if let Some(actor) = self.host.actor_mut(PLAYER) {
            actor.behavior.weapon_state = match actor.behavior.weapon_state {
                WeaponState::Drawn => WeaponState::Sheathed,
                _ => WeaponState::Drawn,
            };
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Dynamic Speed Controller demo v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ControllerConfig::load_or_default();
    if env_or("DEMO_NPCS_ENABLED", true) {
        config.npc.enabled = true;
    }
    let config = ConfigHandle::new(config);

    let metrics = Arc::new(Metrics::new());
    if let Some(port) = std::env::var("METRICS_PORT").ok().and_then(|s| s.parse::<u16>().ok()) {
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let mut controller = SpeedController::with_metrics(config, Arc::new(MonotonicClock::new()), metrics.clone());
    let mut bus = LocalEventBus::new();
    controller.install(&mut bus);

    let mut rng = rand::thread_rng();
    let mut world = DemoWorld::new(env_or("DEMO_NPCS", 24u32), &mut rng);

    // Fresh session: behaves like a load without a persisted record
    bus.emit_pre_load();
    bus.emit_post_load(None);

    let mut driver = controller.start_heartbeat()?;
    let run_for = Duration::from_secs(env_or("DEMO_SECONDS", 0u64));
    let started = Instant::now();
    let mut last_report = Instant::now();
    let mut frames = tokio::time::interval(FRAME);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Ctrl+C handler failed: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
            _ = frames.tick() => {
                world.step(FRAME.as_secs_f32(), &mut rng);

                if rng.gen_bool(0.004) {
                    bus.emit_input(&InputEvent::button("Sprint", 42, 1.0, 0.0));
                } else if rng.gen_bool(0.004) {
                    bus.emit_input(&InputEvent::button("Sprint", 42, 0.0, 1.0));
                }
                if rng.gen_bool(0.002) {
                    world.toggle_weapon();
                    bus.emit_animation(PLAYER);
                }
                if rng.gen_bool(0.0005) {
                    bus.emit_input(&InputEvent::button("Shout", 0, 1.0, 0.0));
                }

                controller.run_pending(&mut world.host);

                if last_report.elapsed() >= Duration::from_secs(5) {
                    last_report = Instant::now();
                    info!(
                        "speed={:.2} attack={:.3} jogging={} npcs={} writes={}",
                        world.host.value(PLAYER, AttributeChannel::SpeedMult),
                        world.host.value(PLAYER, AttributeChannel::AttackSpeed),
                        controller.jogging_mode(),
                        controller.tracked_npc_count(),
                        metrics.attribute_writes.load(std::sync::atomic::Ordering::Relaxed),
                    );
                }
                if !run_for.is_zero() && started.elapsed() >= run_for {
                    break;
                }
            }
        }
    }

    driver.stop();
    controller.run_pending(&mut world.host);

    match controller.save_record(&world.host) {
        Ok(record) => info!("Saved {} byte state record", record.len()),
        Err(e) => warn!("Could not encode state record: {}", e),
    }
    controller.clear_all(&mut world.host);
    info!(
        "Reverted all contributions, player speed back to {:.2}",
        world.host.value(PLAYER, AttributeChannel::SpeedMult)
    );

    Ok(())
}
