//! Simulation benchmarks for the race server
//!
//! Run with: cargo bench --bench simulation

use std::sync::Arc;
use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use slipstream_server::config::{GameConfig, ProgressConfig, TimingConfig, TrackConfig, VehicleConfig};
use slipstream_server::events::EventBus;
use slipstream_server::game::physics;
use slipstream_server::game::session::Session;
use slipstream_server::game::state::{Input, MatchPhase, Player};
use slipstream_server::game::track::Track;

/// A session in RACE with `count` accelerating players
fn racing_session(count: usize) -> Session {
    let config = GameConfig {
        timing: TimingConfig {
            countdown_start: 1,
            ..TimingConfig::default()
        },
        ..GameConfig::default()
    };
    let track = Track::generate_seeded(&config.track, 42).expect("track");
    let mut session = Session::with_track(config, Arc::new(EventBus::new(1)), track);

    for i in 0..count {
        let (id, _subscription) = session.connect();
        let input = Input {
            up: true,
            left: i % 3 == 0,
            right: i % 3 == 1,
            down: false,
        };
        session.set_input(id, input).expect("player");
    }

    let countdown = session.tick(Instant::now()).expect("round start");
    session.on_countdown_tick(countdown.kind, countdown.round, Instant::now());
    assert_eq!(session.phase(), MatchPhase::Race);
    session
}

/// Benchmark track generation end to end
fn bench_track_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("track");
    group.sample_size(30);

    let config = TrackConfig::default();
    let mut seed = 0u64;
    group.bench_function("generate", |b| {
        b.iter(|| {
            seed += 1;
            black_box(Track::generate_seeded(&config, seed))
        })
    });
    group.finish();
}

/// Benchmark the per-player integrator
fn bench_player_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("physics");

    let track = Track::generate_seeded(&TrackConfig::default(), 42).expect("track");
    let (start, next) = track.start();
    let vehicle = VehicleConfig::default();
    let progress = ProgressConfig::default();
    let mut player = Player::new(0, start, next, track.sample_count());
    player.input.up = true;

    group.bench_function("update", |b| {
        b.iter(|| physics::update(black_box(&mut player), &track, &vehicle, &progress))
    });
    group.finish();
}

/// Benchmark a full session tick at various player counts
fn bench_full_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_tick");
    group.sample_size(30);

    for count in [10, 50, 100, 250] {
        let mut session = racing_session(count);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("race", count), &count, |b, _| {
            b.iter(|| black_box(session.tick(Instant::now())))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_track_generation,
    bench_player_update,
    bench_full_tick,
);
criterion_main!(benches);
