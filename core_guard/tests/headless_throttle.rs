#![cfg(feature = "headless")]

use core_guard::{ActorKind, GuardConfig, HeadlessRuntime, Privileges, RegionKey, RegionPos, WorldId};

#[test]
fn far_creatures_act_far_less_than_near_ones() {
    let world = WorldId::new("world");
    let mut runtime = HeadlessRuntime::new(GuardConfig::builtin());
    let (near, far) = {
        let host = runtime.host_mut();
        host.spawn_player("alex", &world, 8.0, 8.0, Privileges::empty());
        let near = host.spawn_actor(ActorKind::Creature, &world, 10.0, 10.0);
        // ten regions out, six beyond the full-rate radius
        let far = host.spawn_actor(ActorKind::Creature, &world, 168.0, 8.0);
        (near, far)
    };
    runtime.start();
    runtime.run_steps(400);

    let host = runtime.host();
    assert_eq!(host.acted_steps(near), Some(400));
    // twenty free steps before the throttle starts at step 20, then one act
    // per 128-step window on the region's runs at steps 147 and 275
    assert_eq!(host.acted_steps(far), Some(22));

    let throttle = runtime.orchestrator().throttle();
    assert_eq!(
        throttle.multiplier_of(&RegionKey::new(world.clone(), RegionPos::new(10, 0))),
        Some(128)
    );
    assert_eq!(
        throttle.multiplier_of(&RegionKey::new(world, RegionPos::new(0, 0))),
        Some(1)
    );
    assert_eq!(
        host.propagation_limit(&RegionKey::new(WorldId::new("world"), RegionPos::new(10, 0))),
        Some(128)
    );
}

#[test]
fn throttled_creature_acts_once_per_multiplier_window() {
    let world = WorldId::new("world");
    let mut runtime = HeadlessRuntime::new(GuardConfig::builtin());
    let far = {
        let host = runtime.host_mut();
        host.spawn_player("alex", &world, 8.0, 8.0, Privileges::empty());
        // seven regions out with radius four: multiplier 16
        host.spawn_actor(ActorKind::Creature, &world, 120.0, 8.0)
    };
    runtime.start();
    runtime.run_steps(20);
    let before = runtime.host().acted_steps(far).unwrap_or_default();

    runtime.run_steps(1600);
    let acted = runtime.host().acted_steps(far).unwrap_or_default() - before;
    assert_eq!(
        runtime
            .orchestrator()
            .throttle()
            .multiplier_of(&RegionKey::new(world, RegionPos::new(7, 0))),
        Some(16)
    );
    assert_eq!(acted, 100);
}

#[test]
fn shutdown_restores_suspended_creatures() {
    let world = WorldId::new("world");
    let mut runtime = HeadlessRuntime::new(GuardConfig::builtin());
    let far = {
        let host = runtime.host_mut();
        host.spawn_player("alex", &world, 0.0, 0.0, Privileges::empty());
        host.spawn_actor(ActorKind::Creature, &world, 320.0, 320.0)
    };
    runtime.start();
    runtime.run_steps(30);
    assert!(runtime.orchestrator().throttle().pending_restores() > 0);

    runtime.shutdown();
    assert_eq!(runtime.orchestrator().throttle().pending_restores(), 0);
    assert_eq!(runtime.orchestrator().live_timers().total(), 0);

    let before = runtime.host().acted_steps(far).unwrap_or_default();
    runtime.host_mut().advance();
    assert_eq!(runtime.host().acted_steps(far), Some(before + 1));
}

#[test]
fn refresh_follows_observers_and_drops_unloaded_regions() {
    let world = WorldId::new("world");
    let mut runtime = HeadlessRuntime::new(GuardConfig::builtin());
    let alex = {
        let host = runtime.host_mut();
        host.spawn_actor(ActorKind::Creature, &world, 168.0, 8.0);
        host.spawn_player("alex", &world, 8.0, 8.0, Privileges::empty())
    };
    let far = RegionKey::new(world.clone(), RegionPos::new(10, 0));
    let home = RegionKey::new(world.clone(), RegionPos::new(0, 0));
    runtime.start();
    runtime.run_steps(21);
    assert_eq!(runtime.orchestrator().throttle().multiplier_of(&far), Some(128));

    runtime
        .host_mut()
        .move_actor(alex, 170.0, 10.0)
        .expect("session exists");
    runtime.host_mut().unload_region(&world, RegionPos::new(0, 0));

    // the next distance refresh lands on the 200th throttle step
    runtime.run_steps(199);
    let throttle = runtime.orchestrator().throttle();
    assert_eq!(throttle.multiplier_of(&far), Some(1));
    assert_eq!(throttle.multiplier_of(&home), None);
    assert_eq!(throttle.stats().tracked, 1);
}
