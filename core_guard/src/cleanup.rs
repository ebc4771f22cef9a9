//! Throughput-gated cleanup sweeps.
//!
//! The monitor loop feeds [`AdaptiveCleanupScheduler::on_sample`] one
//! throughput sample at a time. Activation and deactivation only happen on
//! threshold crossings, so a run of poor samples starts exactly one
//! countdown and one sweep timer.

use serde::Serialize;
use tracing::{debug, info};

use crate::context::LoopContext;
use crate::countdown::CleanupCountdownController;
use crate::host::{ActorKind, ServerHost};
use crate::scheduler::{OneShotTimer, RepeatingTimer};

/// Actors removed by one sweep, per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub items: u32,
    pub vehicles: u32,
    pub orbs: u32,
}

impl SweepReport {
    pub fn total(&self) -> u32 {
        self.items + self.vehicles + self.orbs
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    Activated,
    Deactivated,
    FixedIntervalArmed,
    FixedIntervalDisarmed,
    Unchanged,
}

#[derive(Debug, Default)]
pub struct AdaptiveCleanupScheduler {
    running: bool,
    sweep_timer: Option<RepeatingTimer>,
    fixed_timer: Option<RepeatingTimer>,
    pending_sweep: Option<OneShotTimer>,
    countdown: CleanupCountdownController,
    last_report: Option<SweepReport>,
}

impl AdaptiveCleanupScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one throughput sample from the monitor loop.
    pub fn on_sample(
        &mut self,
        tps: f64,
        now: u64,
        host: &mut dyn ServerHost,
        ctx: &LoopContext<'_>,
    ) -> SampleOutcome {
        let cleanup = ctx.config.cleanup();

        if !cleanup.adaptive_clearing {
            if !cleanup.enabled {
                return self.disarm_fixed_interval();
            }
            if self.fixed_timer.is_some() {
                return SampleOutcome::Unchanged;
            }
            let interval = cleanup.interval_ticks();
            self.fixed_timer = Some(RepeatingTimer::new(now, interval, interval));
            info!(
                target: "tick_guard::cleanup",
                interval_seconds = cleanup.interval_seconds,
                "scheduled_cleanup.armed"
            );
            return SampleOutcome::FixedIntervalArmed;
        }

        let disarmed = self.disarm_fixed_interval();
        let threshold = cleanup.adaptive_tps_threshold;
        if tps < threshold {
            if self.running {
                return disarmed;
            }
            self.activate(now, host, ctx);
            info!(target: "tick_guard::cleanup", tps, threshold, "adaptive_cleanup.activated");
            SampleOutcome::Activated
        } else {
            if !self.running {
                return disarmed;
            }
            self.stop_adaptive(host, ctx);
            info!(target: "tick_guard::cleanup", tps, threshold, "adaptive_cleanup.deactivated");
            SampleOutcome::Deactivated
        }
    }

    fn activate(&mut self, now: u64, host: &mut dyn ServerHost, ctx: &LoopContext<'_>) {
        if self.sweep_timer.is_some() {
            self.stop_adaptive(host, ctx);
        }
        let cleanup = ctx.config.cleanup();
        self.running = true;
        self.countdown.start(cleanup.countdown_seconds, now, host, ctx);
        self.sweep_timer = Some(RepeatingTimer::new(
            now,
            cleanup.countdown_ticks(),
            cleanup.adaptive_interval_ticks(),
        ));
    }

    fn stop_adaptive(&mut self, host: &mut dyn ServerHost, ctx: &LoopContext<'_>) {
        self.sweep_timer = None;
        self.countdown.cancel(host, ctx);
        self.running = false;
    }

    fn disarm_fixed_interval(&mut self) -> SampleOutcome {
        if self.fixed_timer.take().is_none() {
            return SampleOutcome::Unchanged;
        }
        info!(target: "tick_guard::cleanup", "scheduled_cleanup.disarmed");
        SampleOutcome::FixedIntervalDisarmed
    }

    /// Poll the countdown and every sweep timer. Returns the report of a
    /// sweep that ran on this step, if any.
    pub fn tick_timers(
        &mut self,
        now: u64,
        host: &mut dyn ServerHost,
        ctx: &LoopContext<'_>,
    ) -> Option<SweepReport> {
        self.countdown.tick(now, host, ctx);

        let mut report = None;
        if self.sweep_timer.as_mut().is_some_and(|timer| timer.poll(now)) {
            report = Some(self.run_sweep(now, host, ctx));
        }

        if self.pending_sweep.is_some_and(|shot| shot.is_due(now)) {
            self.pending_sweep = None;
            report = Some(self.run_sweep(now, host, ctx));
        }

        if self.fixed_timer.as_mut().is_some_and(|timer| timer.poll(now)) {
            let cleanup = ctx.config.cleanup();
            if self.pending_sweep.is_some() {
                // the previous countdown still owns the players' attention
                debug!(target: "tick_guard::cleanup", "scheduled_cleanup.firing_skipped=sweep_pending");
            } else if cleanup.countdown_enabled {
                self.countdown.start(cleanup.countdown_seconds, now, host, ctx);
                self.pending_sweep = Some(OneShotTimer::new(now, cleanup.countdown_ticks()));
            } else {
                report = Some(self.run_sweep(now, host, ctx));
            }
        }

        report
    }

    /// Sweep immediately, skipping any countdown.
    pub fn force_sweep(
        &mut self,
        now: u64,
        host: &mut dyn ServerHost,
        ctx: &LoopContext<'_>,
    ) -> SweepReport {
        self.run_sweep(now, host, ctx)
    }

    fn run_sweep(
        &mut self,
        now: u64,
        host: &mut dyn ServerHost,
        ctx: &LoopContext<'_>,
    ) -> SweepReport {
        let report = sweep(now, host, ctx);
        self.last_report = Some(report);
        report
    }

    /// Cancel every sweep timer and the countdown. Safe to call repeatedly.
    pub fn stop(&mut self, host: &mut dyn ServerHost, ctx: &LoopContext<'_>) {
        let had_timers = self.has_live_timer() || self.running;
        self.stop_adaptive(host, ctx);
        self.fixed_timer = None;
        self.pending_sweep = None;
        if had_timers {
            info!(target: "tick_guard::cleanup", "cleanup.stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_live_timer(&self) -> bool {
        self.sweep_timer.is_some()
            || self.fixed_timer.is_some()
            || self.pending_sweep.is_some()
            || self.countdown.has_live_timer()
    }

    pub fn has_sweep_timer(&self) -> bool {
        self.sweep_timer.is_some()
    }

    pub fn has_fixed_timer(&self) -> bool {
        self.fixed_timer.is_some()
    }

    pub fn countdown(&self) -> &CleanupCountdownController {
        &self.countdown
    }

    pub fn last_report(&self) -> Option<SweepReport> {
        self.last_report
    }
}

/// Remove aged ground items, empty vehicles and experience orbs across every
/// world, honouring the per-category toggles.
pub fn sweep(now: u64, host: &mut dyn ServerHost, ctx: &LoopContext<'_>) -> SweepReport {
    let cleanup = ctx.config.cleanup();
    let min_age = cleanup.min_age_ticks();
    let mut report = SweepReport::default();

    for world in host.worlds() {
        for actor in host.actors(&world) {
            let eligible = match actor.kind {
                ActorKind::GroundItem => cleanup.remove_ground_items,
                ActorKind::Vehicle => cleanup.remove_inactive_vehicles && actor.passengers == 0,
                ActorKind::ExperienceOrb => cleanup.remove_experience_orbs,
                _ => false,
            };
            if !eligible || actor.age(now) <= min_age {
                continue;
            }
            if let Err(err) = host.remove_actor(actor.id) {
                debug!(target: "tick_guard::cleanup", error = %err, "cleanup.remove_failed");
                continue;
            }
            match actor.kind {
                ActorKind::GroundItem => report.items += 1,
                ActorKind::Vehicle => report.vehicles += 1,
                _ => report.orbs += 1,
            }
        }
    }

    if report.is_empty() {
        debug!(target: "tick_guard::cleanup", "cleanup.sweep_empty");
        return report;
    }

    info!(
        target: "tick_guard::cleanup",
        items = report.items,
        vehicles = report.vehicles,
        orbs = report.orbs,
        min_age_seconds = cleanup.min_item_age_seconds,
        "cleanup.sweep_completed"
    );
    let message = ctx.catalog.render(
        "cleanup.completed",
        "&a🧹 &fCleanup finished: &e{ITEMS} &fitems, &e{VEHICLES} &fvehicles, &e{ORBS} &fXP orbs removed.",
        &[
            ("ITEMS", report.items.to_string()),
            ("VEHICLES", report.vehicles.to_string()),
            ("ORBS", report.orbs.to_string()),
        ],
    );
    host.broadcast(ctx.cleanup_audience(), &message);
    report
}
