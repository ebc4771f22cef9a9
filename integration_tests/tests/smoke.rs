mod common;

use anyhow::Result;
use core_guard::{LoopKind, PerformanceSignal};
use guard_runtime::CommandPayload;

#[test]
fn runtime_starts_and_steps() -> Result<()> {
    let mut runtime = common::populated_runtime()?;
    runtime.start();
    let reports = runtime.run_steps(40);

    assert_eq!(reports.len(), 40);
    assert_eq!(runtime.host().current_tick(), 40);
    assert!(reports.iter().skip(20).all(|report| report.throttled));
    let timers = runtime.orchestrator().live_timers();
    for kind in [LoopKind::Emergency, LoopKind::CleanupMonitor, LoopKind::Throttle] {
        assert_eq!(timers.of(kind), 1, "{kind:?}");
    }
    Ok(())
}

#[test]
fn status_reports_every_loop() -> Result<()> {
    let mut runtime = common::populated_runtime()?;
    runtime.start();
    runtime.run_steps(25);

    let status = runtime.orchestrator().status(runtime.host());
    assert_eq!(status.tick, 25);
    assert!(status.throttle.active);
    assert!(!status.adaptive_cleanup_running);
    assert_eq!(status.live_timers.total(), 3);

    let json = serde_json::to_value(&status)?;
    assert_eq!(json["countdown"]["state"], "idle");
    assert_eq!(json["throttle"]["distance"], 2);
    assert_eq!(json["config_mode"], "simple");
    assert_eq!(json["tps_windows"].as_array().map(Vec::len), Some(3));

    let lines = runtime.execute(&CommandPayload::Status);
    assert!(lines.iter().any(|line| line.starts_with("TPS (1m/5m/15m): ")));
    assert!(lines.contains(&"Config mode: Simple".to_string()));
    Ok(())
}
