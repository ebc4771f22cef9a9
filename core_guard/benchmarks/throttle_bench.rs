use core_guard::{
    ActorKind, ChunkThrottleEngine, GuardConfig, HeadlessHost, LoopContext, MessageCatalog,
    Privileges, RegionPos, WorldId,
};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

fn populated_host(size: i32) -> HeadlessHost {
    let mut host = HeadlessHost::new();
    let world = WorldId::new("world");
    for x in 0..size {
        for z in 0..size {
            host.load_region(&world, RegionPos::new(x, z));
            if (x + z) % 3 == 0 {
                host.spawn_actor(
                    ActorKind::Creature,
                    &world,
                    f64::from(x) * 16.0 + 4.0,
                    f64::from(z) * 16.0 + 4.0,
                );
            }
        }
    }
    host.spawn_player("north", &world, 8.0, 8.0, Privileges::empty());
    host.spawn_player(
        "south",
        &world,
        f64::from(size) * 16.0 - 8.0,
        f64::from(size) * 16.0 - 8.0,
        Privileges::empty(),
    );
    host
}

fn bench_throttle(c: &mut Criterion) {
    let config = GuardConfig::builtin();
    let catalog = MessageCatalog::builtin(config.language());
    let mut group = c.benchmark_group("throttle");

    for size in [16i32, 32, 64] {
        group.bench_with_input(BenchmarkId::new("regions", size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let host = populated_host(size);
                    let mut engine = ChunkThrottleEngine::new();
                    engine.start(config.lazy_chunks());
                    (host, engine)
                },
                |(mut host, mut engine)| {
                    let ctx = LoopContext::new(&config, &catalog);
                    for now in 20..220 {
                        engine.drain_due(now, &mut host);
                        engine.tick(now, &mut host, &ctx);
                        host.advance();
                    }
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(throttle_benches, bench_throttle);
criterion_main!(throttle_benches);
