//! Heartbeat cost at various tracked-NPC populations
//!
//! Run with: cargo bench --bench tick

use std::collections::VecDeque;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dynamic_speed_controller::config::{ConfigHandle, ControllerConfig};
use dynamic_speed_controller::controller::effects::slope;
use dynamic_speed_controller::controller::snapshot::{decode_records, encode_record, Snapshot};
use dynamic_speed_controller::host::memory::MemoryHost;
use dynamic_speed_controller::host::EntityId;
use dynamic_speed_controller::util::clock::ManualClock;
use dynamic_speed_controller::util::vec3::Vec3;
use dynamic_speed_controller::SpeedController;
use rand::Rng;

const PLAYER: EntityId = EntityId(0x14);

/// Controller plus a host with `count` NPCs scattered around the player
fn create_world(count: u32) -> (SpeedController, MemoryHost, ManualClock) {
    let mut rng = rand::thread_rng();
    let mut host = MemoryHost::new(PLAYER);
    for i in 0..count {
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let radius = rng.gen_range(100.0..3500.0);
        host.spawn_npc(
            EntityId(0x1000 + i),
            Vec3::new(angle.cos() * radius, angle.sin() * radius, 0.0),
        );
    }
    host.move_axes = (0.7, 0.7);

    let mut config = ControllerConfig::default();
    config.npc.enabled = true;
    config.npc.max_tracked = 1024;
    config.slope.enabled = true;
    config.vitals.enabled = true;

    let clock = ManualClock::new(1);
    let controller = SpeedController::new(ConfigHandle::new(config), Arc::new(clock.clone()));
    (controller, host, clock)
}

fn bench_heartbeat(c: &mut Criterion) {
    let mut group = c.benchmark_group("heartbeat");
    group.sample_size(50);

    for count in [0u32, 16, 64, 256] {
        let (mut controller, mut host, clock) = create_world(count);
        let mut z = 0.0f32;

        group.throughput(Throughput::Elements(u64::from(count) + 1));
        group.bench_with_input(BenchmarkId::new("full", count), &count, |b, _| {
            b.iter(|| {
                clock.advance(50);
                z += 1.5;
                if let Some(actor) = host.actor_mut(PLAYER) {
                    let p = actor.world.position;
                    actor.world.position = Vec3::new(p.x + 8.0, p.y, (z * 0.01).sin() * 40.0);
                }
                controller.heartbeat(&mut host);
                black_box(controller.tracked_npc_count())
            })
        });
    }
    group.finish();
}

fn bench_slope_estimate(c: &mut Criterion) {
    let cfg = ControllerConfig::default().slope;
    let mut path = VecDeque::new();
    for i in 0..64u64 {
        let x = i as f32 * 8.0;
        slope::push_sample(&mut path, Vec3::new(x, 0.0, x * 0.3), i * 16, &cfg);
    }

    c.bench_function("slope_estimate", |b| {
        b.iter(|| black_box(slope::estimate_degrees(black_box(&path), cfg.lookback_units)))
    });
}

fn bench_record_decode(c: &mut Criterion) {
    let snapshot = Snapshot {
        jogging_mode: true,
        movement_delta: -20.0,
        diagonal_delta: -5.0,
        baseline: 100.0,
        slope_delta: -3.0,
        attack_delta: 0.2,
    };
    let mut blob = Vec::new();
    for _ in 0..8 {
        if let Ok(record) = encode_record(&snapshot) {
            blob.extend_from_slice(&record);
        }
    }

    c.bench_function("record_decode", |b| b.iter(|| black_box(decode_records(black_box(&blob)))));
}

criterion_group!(benches, bench_heartbeat, bench_slope_estimate, bench_record_decode);

criterion_main!(benches);
