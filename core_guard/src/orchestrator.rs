//! Owns every recurring control-loop timer and the components they drive.
//!
//! The host calls [`ControlLoopOrchestrator::tick`] once per simulation step.
//! Timers are plain step counters polled from that call, so stopping a loop
//! is just dropping its timer.

use std::{path::PathBuf, sync::Arc};

use serde::Serialize;
use tracing::{info, warn};

use crate::cleanup::{AdaptiveCleanupScheduler, SampleOutcome, SweepReport};
use crate::config::{GuardConfig, GuardConfigHandle};
use crate::context::LoopContext;
use crate::drift::DriftMonitor;
use crate::emergency::{self, EmergencyOutcome, PurgeReport};
use crate::host::ServerHost;
use crate::messages::MessageCatalog;
use crate::metrics::{GuardStatus, ThrottleStatus};
use crate::scheduler::RepeatingTimer;
use crate::throttle::ChunkThrottleEngine;
use crate::tuning::{tune_server_files, ServerFilesReport};

pub const EMERGENCY_DELAY: u64 = 100;
pub const EMERGENCY_PERIOD: u64 = 100;
pub const MONITOR_DELAY: u64 = 100;
pub const MONITOR_PERIOD: u64 = 200;
pub const THROTTLE_DELAY: u64 = 20;
pub const THROTTLE_PERIOD: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LoopKind {
    Emergency,
    CleanupMonitor,
    Throttle,
}

/// Number of live timers per loop kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LiveTimers {
    pub emergency: usize,
    pub cleanup_monitor: usize,
    pub throttle: usize,
}

impl LiveTimers {
    pub fn of(&self, kind: LoopKind) -> usize {
        match kind {
            LoopKind::Emergency => self.emergency,
            LoopKind::CleanupMonitor => self.cleanup_monitor,
            LoopKind::Throttle => self.throttle,
        }
    }

    pub fn total(&self) -> usize {
        self.emergency + self.cleanup_monitor + self.throttle
    }
}

/// What happened during one orchestrator step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub restored: usize,
    pub emergency: Option<EmergencyOutcome>,
    pub sample: Option<SampleOutcome>,
    pub sweep: Option<SweepReport>,
    pub throttled: bool,
}

#[derive(Debug)]
pub struct ControlLoopOrchestrator {
    config: GuardConfigHandle,
    catalog: Arc<MessageCatalog>,
    server_root: Option<PathBuf>,
    emergency_timer: Option<RepeatingTimer>,
    monitor_timer: Option<RepeatingTimer>,
    throttle_timer: Option<RepeatingTimer>,
    throttle: ChunkThrottleEngine,
    cleanup: AdaptiveCleanupScheduler,
    drift: DriftMonitor,
    restart_required: bool,
    last_purge: Option<PurgeReport>,
    last_tuning: Option<ServerFilesReport>,
}

impl ControlLoopOrchestrator {
    pub fn new(config: Arc<GuardConfig>) -> Self {
        let catalog = Arc::new(MessageCatalog::builtin(config.language()));
        Self {
            config: GuardConfigHandle::new(config),
            catalog,
            server_root: None,
            emergency_timer: None,
            monitor_timer: None,
            throttle_timer: None,
            throttle: ChunkThrottleEngine::new(),
            cleanup: AdaptiveCleanupScheduler::new(),
            drift: DriftMonitor::new(),
            restart_required: false,
            last_purge: None,
            last_tuning: None,
        }
    }

    /// Directory holding the server's configuration files. Without one, file
    /// tuning and drift monitoring are skipped.
    pub fn with_server_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.server_root = Some(root.into());
        self
    }

    /// Stop everything, tune the server files, then start each enabled loop
    /// with a fresh timer.
    pub fn apply_configuration(&mut self, host: &mut dyn ServerHost) {
        self.stop_all_timers(host);

        let config = self.config.get();
        let catalog = Arc::clone(&self.catalog);
        let now = host.current_tick();
        info!(
            target: "tick_guard::orchestrator",
            "{}",
            catalog.plain("plugin.applying-settings", "&7[Performance] &fApplying optimizations...", &[])
        );

        if let Some(root) = self.server_root.as_deref() {
            let report = tune_server_files(root, &config);
            if report.restart_required() {
                self.restart_required = true;
                warn!(
                    target: "tick_guard::orchestrator",
                    "{}",
                    catalog.plain(
                        "config.restart-required",
                        "&e⚠ &6Restart required for some optimizations!",
                        &[]
                    )
                );
            }
            self.last_tuning = Some(report);
        }

        if config.mode().is_advanced() {
            self.apply_world_spawn_limits(host);
        }

        let lazy = config.lazy_chunks();
        if self.throttle.start(lazy) {
            self.throttle_timer = Some(RepeatingTimer::new(now, THROTTLE_DELAY, THROTTLE_PERIOD));
            info!(
                target: "tick_guard::orchestrator",
                "{}",
                catalog.plain(
                    "lazy-chunks.enabled",
                    "&7[Performance] &fLazy chunks enabled: &e{DISTANCE}",
                    &[("DISTANCE", lazy.distance.to_string())]
                )
            );
        }

        self.emergency_timer = Some(RepeatingTimer::new(now, EMERGENCY_DELAY, EMERGENCY_PERIOD));
        self.monitor_timer = Some(RepeatingTimer::new(now, MONITOR_DELAY, MONITOR_PERIOD));

        if let Some(root) = self.server_root.as_deref() {
            self.drift.start(root, config.monitor(), now);
        }

        info!(
            target: "tick_guard::orchestrator",
            tick = now,
            throttle = self.throttle_timer.is_some(),
            "control_loops.started"
        );
    }

    /// Push the configured spawn limits into every loaded world. Returns how
    /// many worlds accepted them.
    pub fn apply_world_spawn_limits(&self, host: &mut dyn ServerHost) -> usize {
        let limits = self.config.config().server_files().spawn_limits;
        let mut applied = 0;
        for world in host.worlds() {
            match host.set_spawn_limits(&world, limits) {
                Ok(()) => applied += 1,
                Err(err) => warn!(
                    target: "tick_guard::orchestrator",
                    %world,
                    error = %err,
                    "world_spawn_limits.failed"
                ),
            }
        }
        info!(
            target: "tick_guard::orchestrator",
            worlds = applied,
            monsters = limits.monsters,
            animals = limits.animals,
            "world_spawn_limits.applied"
        );
        applied
    }

    /// Cancel every owned timer and stop the components behind them. Safe
    /// to call when nothing is running.
    pub fn stop_all_timers(&mut self, host: &mut dyn ServerHost) {
        let config = self.config.get();
        let catalog = Arc::clone(&self.catalog);
        let ctx = LoopContext::new(&config, &catalog);
        let was_running = self.live_timers().total() > 0;

        self.emergency_timer = None;
        self.monitor_timer = None;
        self.throttle_timer = None;
        self.throttle.stop(host);
        self.cleanup.stop(host, &ctx);
        self.drift.stop();

        if was_running {
            info!(target: "tick_guard::orchestrator", "control_loops.stopped");
        }
    }

    /// Swap in a new configuration and restart every loop under it.
    pub fn reload(&mut self, config: Arc<GuardConfig>, host: &mut dyn ServerHost) {
        self.stop_all_timers(host);
        self.catalog = Arc::new(MessageCatalog::builtin(config.language()));
        self.config.replace(config);
        self.apply_configuration(host);
    }

    /// One simulation step. Due actor restorations run first, then each
    /// loop whose timer fires.
    pub fn tick(&mut self, host: &mut dyn ServerHost) -> TickReport {
        let now = host.current_tick();
        let config = self.config.get();
        let catalog = Arc::clone(&self.catalog);
        let ctx = LoopContext::new(&config, &catalog);
        let mut report = TickReport {
            restored: self.throttle.drain_due(now, host),
            ..TickReport::default()
        };

        if self.emergency_timer.as_mut().is_some_and(|timer| timer.poll(now)) {
            let outcome = emergency::check(host.tps(), host, &ctx);
            if let EmergencyOutcome::Purged(purge) = &outcome {
                self.last_purge = Some(purge.clone());
            }
            report.emergency = Some(outcome);
        }

        if self.monitor_timer.as_mut().is_some_and(|timer| timer.poll(now)) {
            report.sample = Some(self.cleanup.on_sample(host.tps(), now, host, &ctx));
        }

        report.sweep = self.cleanup.tick_timers(now, host, &ctx);

        if self.throttle_timer.as_mut().is_some_and(|timer| timer.poll(now)) {
            self.throttle.tick(now, host, &ctx);
            report.throttled = true;
        }

        self.drift.tick(now, host, &ctx);
        report
    }

    pub fn live_timers(&self) -> LiveTimers {
        LiveTimers {
            emergency: usize::from(self.emergency_timer.is_some()),
            cleanup_monitor: usize::from(self.monitor_timer.is_some()),
            throttle: usize::from(self.throttle_timer.is_some()),
        }
    }

    pub fn status(&self, host: &dyn ServerHost) -> GuardStatus {
        GuardStatus {
            tick: host.current_tick(),
            tps: host.tps(),
            tps_windows: host.tps_windows(),
            config_mode: self.config.config().mode(),
            adaptive_cleanup_running: self.cleanup.is_running(),
            countdown: self.cleanup.countdown().state(),
            throttle: self.throttle_status(),
            config_drifted: self.drift.is_drifted(),
            restart_required: self.restart_required,
            live_timers: self.live_timers(),
        }
    }

    pub fn throttle_status(&self) -> ThrottleStatus {
        let lazy = self.config.config().lazy_chunks();
        ThrottleStatus::new(
            self.throttle.is_active(),
            lazy.distance,
            lazy.min_distance,
            lazy.adaptive,
            self.throttle.stats(),
        )
    }

    /// Run the emergency purge now, regardless of throughput.
    pub fn force_emergency(&mut self, host: &mut dyn ServerHost) -> PurgeReport {
        let config = self.config.get();
        let catalog = Arc::clone(&self.catalog);
        let ctx = LoopContext::new(&config, &catalog);
        let report = emergency::purge(host, &ctx);
        self.last_purge = Some(report.clone());
        report
    }

    /// Sweep now, skipping the countdown.
    pub fn force_cleanup(&mut self, host: &mut dyn ServerHost) -> SweepReport {
        let config = self.config.get();
        let catalog = Arc::clone(&self.catalog);
        let ctx = LoopContext::new(&config, &catalog);
        let now = host.current_tick();
        self.cleanup.force_sweep(now, host, &ctx)
    }

    pub fn reset_monitor(&mut self) {
        self.drift.reset();
    }

    /// Send the drift notice to privileged sessions. Returns how many
    /// received it.
    pub fn test_notify(&self, host: &mut dyn ServerHost) -> usize {
        let message = self.catalog.message(
            "config.change-detected",
            "&e⚡ &6tick_guard: &fConfiguration was changed!",
        );
        let config = self.config.get();
        let ctx = LoopContext::new(&config, &self.catalog);
        host.broadcast(ctx.operator_audience(), &message).len()
    }

    pub fn config(&self) -> Arc<GuardConfig> {
        self.config.get()
    }

    pub fn catalog(&self) -> &MessageCatalog {
        &self.catalog
    }

    pub fn throttle(&self) -> &ChunkThrottleEngine {
        &self.throttle
    }

    pub fn cleanup(&self) -> &AdaptiveCleanupScheduler {
        &self.cleanup
    }

    pub fn drift(&self) -> &DriftMonitor {
        &self.drift
    }

    pub fn restart_required(&self) -> bool {
        self.restart_required
    }

    pub fn last_purge(&self) -> Option<&PurgeReport> {
        self.last_purge.as_ref()
    }

    /// Result of the most recent server-file pass, if a server root is set.
    pub fn last_tuning(&self) -> Option<&ServerFilesReport> {
        self.last_tuning.as_ref()
    }
}
