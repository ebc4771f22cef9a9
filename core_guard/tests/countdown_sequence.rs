#![cfg(feature = "headless")]

use core_guard::{
    strip_color, ActorKind, CountdownState, GuardConfig, HeadlessRuntime, Privileges, WorldId,
};

fn runtime_with_orbs(orbs: usize) -> HeadlessRuntime {
    let world = WorldId::new("world");
    let mut runtime = HeadlessRuntime::new(GuardConfig::builtin());
    let host = runtime.host_mut();
    host.spawn_player("alex", &world, 0.0, 0.0, Privileges::empty());
    for _ in 0..orbs {
        host.spawn_actor(ActorKind::ExperienceOrb, &world, 4.0, 4.0);
    }
    runtime
}

#[test]
fn degraded_throughput_runs_the_full_countdown_then_sweeps() {
    let mut runtime = runtime_with_orbs(3);
    runtime.host_mut().set_tps_override(Some(16.0));
    runtime.start();

    runtime.run_steps(101);
    assert!(runtime.orchestrator().cleanup().is_running());
    assert_eq!(
        runtime.orchestrator().cleanup().countdown().state(),
        CountdownState::CountingDown { remaining: 60 }
    );

    runtime.run_steps(1300 - 101 + 1);
    let texts: Vec<String> = runtime
        .host_mut()
        .drain_outbox()
        .into_iter()
        .map(|message| strip_color(&message.text))
        .collect();

    let expected_fragments = [
        "1 minute",
        "30 seconds",
        "10 seconds",
        "5 seconds",
        "4 seconds",
        "3 seconds",
        "2 seconds",
        "1 seconds",
        "cleanup started",
        "3 XP orbs removed",
    ];
    assert_eq!(texts.len(), expected_fragments.len(), "{texts:?}");
    for (text, fragment) in texts.iter().zip(expected_fragments) {
        assert!(text.contains(fragment), "{text:?} should mention {fragment:?}");
    }
    assert_eq!(runtime.host().actor_count(ActorKind::ExperienceOrb), 0);
    assert_eq!(
        runtime.orchestrator().cleanup().countdown().state(),
        CountdownState::Idle
    );
}

#[test]
fn recovery_mid_countdown_cancels_it() {
    let mut runtime = runtime_with_orbs(2);
    runtime.host_mut().set_tps_override(Some(16.0));
    runtime.start();
    runtime.run_steps(101);

    runtime.host_mut().set_tps_override(Some(19.5));
    runtime.run_steps(200);

    let orchestrator = runtime.orchestrator();
    assert!(!orchestrator.cleanup().is_running());
    assert!(!orchestrator.cleanup().has_sweep_timer());
    assert_eq!(orchestrator.cleanup().countdown().state(), CountdownState::Idle);

    let texts: Vec<String> = runtime
        .host_mut()
        .drain_outbox()
        .into_iter()
        .map(|message| strip_color(&message.text))
        .collect();
    assert!(texts.last().is_some_and(|text| text.contains("Cleanup cancelled")));
    assert_eq!(runtime.host().actor_count(ActorKind::ExperienceOrb), 2);
}
