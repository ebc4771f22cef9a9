//! Headless host plus orchestrator, driven one step at a time, with the
//! administrative command surface on top.

use std::{path::PathBuf, sync::Arc};

use guard_runtime::{CommandPayload, SpawnKind, TpsOverride, HELP_LINES};
use tracing::info;

use crate::config::{load_guard_config, GuardConfig};
use crate::host::{ActorKind, PerformanceSignal, Privileges, WorldId};
use crate::headless::HeadlessHost;
use crate::messages::strip_color;
use crate::orchestrator::{ControlLoopOrchestrator, TickReport};

pub const DEFAULT_WORLD: &str = "world";

pub struct HeadlessRuntime {
    host: HeadlessHost,
    orchestrator: ControlLoopOrchestrator,
    config_path: Option<PathBuf>,
    spawned_sessions: u32,
}

impl HeadlessRuntime {
    pub fn new(config: Arc<GuardConfig>) -> Self {
        Self {
            host: HeadlessHost::new(),
            orchestrator: ControlLoopOrchestrator::new(config),
            config_path: None,
            spawned_sessions: 0,
        }
    }

    /// File re-read by the `reload` command.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_server_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.orchestrator = self.orchestrator.with_server_root(root);
        self
    }

    pub fn start(&mut self) {
        self.orchestrator.apply_configuration(&mut self.host);
    }

    /// Run the control loops for the current tick, then advance the world.
    pub fn step(&mut self) -> TickReport {
        let report = self.orchestrator.tick(&mut self.host);
        self.host.advance();
        report
    }

    pub fn run_steps(&mut self, steps: u64) -> Vec<TickReport> {
        (0..steps).map(|_| self.step()).collect()
    }

    pub fn shutdown(&mut self) {
        self.orchestrator.stop_all_timers(&mut self.host);
        info!(
            target: "tick_guard::server",
            tick = self.host.current_tick(),
            "runtime.shutdown"
        );
    }

    pub fn host(&self) -> &HeadlessHost {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut HeadlessHost {
        &mut self.host
    }

    pub fn orchestrator(&self) -> &ControlLoopOrchestrator {
        &self.orchestrator
    }

    /// Execute one administrative command and return the reply lines,
    /// color codes removed.
    pub fn execute(&mut self, command: &CommandPayload) -> Vec<String> {
        let lines = match command {
            CommandPayload::Status => self.orchestrator.status(&self.host).lines(),
            CommandPayload::LazyStats => self.orchestrator.throttle_status().lines(),
            CommandPayload::Emergency => {
                let report = self.orchestrator.force_emergency(&mut self.host);
                let mut lines = vec![format!("Emergency purge removed {} entities", report.total)];
                lines.extend(
                    report
                        .by_type
                        .iter()
                        .map(|(name, count)| format!("  {name}: {count}")),
                );
                lines
            }
            CommandPayload::Cleanup => {
                let report = self.orchestrator.force_cleanup(&mut self.host);
                vec![format!(
                    "Cleanup removed {} items, {} vehicles, {} orbs",
                    report.items, report.vehicles, report.orbs
                )]
            }
            CommandPayload::MonitorReset => {
                self.orchestrator.reset_monitor();
                vec!["Configuration monitor reset".to_string()]
            }
            CommandPayload::Reload => {
                let (config, metadata) = load_guard_config(self.config_path.as_deref());
                self.orchestrator.reload(config, &mut self.host);
                let source = metadata
                    .path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "builtin".to_string());
                vec![self.orchestrator.catalog().render(
                    "plugin.config-reloaded",
                    "&aConfiguration reloaded ({SOURCE})",
                    &[("SOURCE", source)],
                )]
            }
            CommandPayload::Help => HELP_LINES
                .iter()
                .map(|(usage, description)| format!("/pp {usage} - {description}"))
                .collect(),
            CommandPayload::TestTps { value } => match value {
                TpsOverride::Pin(tps) => {
                    self.host.set_tps_override(Some(*tps));
                    vec![format!("Throughput pinned at {:.1}", self.host.tps())]
                }
                TpsOverride::Clear => {
                    self.host.set_tps_override(None);
                    vec![format!(
                        "Throughput override cleared ({:.1} measured)",
                        self.host.measured_tps()
                    )]
                }
            },
            CommandPayload::TestNotify => {
                let reached = self.orchestrator.test_notify(&mut self.host);
                vec![format!("Test notice sent to {reached} sessions")]
            }
            CommandPayload::Spawn { kind, count, x, z } => {
                let placed = self.spawn(*kind, *count, *x, *z);
                vec![format!("Spawned {placed} {kind} at ({x:.1}, {z:.1})")]
            }
        };

        info!(
            target: "tick_guard::server",
            command = command.verb(),
            "command.executed"
        );
        lines.iter().map(|line| strip_color(line)).collect()
    }

    fn spawn(&mut self, kind: SpawnKind, count: u32, x: f64, z: f64) -> u32 {
        let world = WorldId::new(DEFAULT_WORLD);
        for _ in 0..count {
            match kind {
                SpawnKind::Player => {
                    self.spawned_sessions += 1;
                    let name = format!("player{}", self.spawned_sessions);
                    self.host
                        .spawn_player(&name, &world, x, z, Privileges::default());
                }
                other => {
                    self.host.spawn_actor(actor_kind(other), &world, x, z);
                }
            }
        }
        count
    }
}

fn actor_kind(kind: SpawnKind) -> ActorKind {
    match kind {
        SpawnKind::Item => ActorKind::GroundItem,
        SpawnKind::Vehicle => ActorKind::Vehicle,
        SpawnKind::Orb => ActorKind::ExperienceOrb,
        SpawnKind::Creature => ActorKind::Creature,
        SpawnKind::Other => ActorKind::Other,
        SpawnKind::Player => ActorKind::Player,
    }
}
