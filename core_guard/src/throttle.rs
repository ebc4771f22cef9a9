//! Distance-based region throttling.
//!
//! Regions near an observer run every step. Regions further out run once
//! every `2^(steps+1)` steps, where `steps` is how far beyond the base radius
//! they are. Skipped steps suppress non-observer actors in the region; very
//! lazy regions also get their living actors' autonomous behaviour suspended
//! until the region's next run. The restore is due on that run step itself,
//! and restores drain before regions are processed, so a suspended actor is
//! back in time to act when its region runs.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::LazyChunksConfig;
use crate::context::LoopContext;
use crate::host::{ActorId, RegionKey, ServerHost};
use crate::scheduler::DeferredQueue;

/// Distance assumed for regions in a world without observers.
pub const FALLBACK_DISTANCE: u32 = 100;

/// Throttle steps between distance refreshes.
pub const REFRESH_PERIOD: u64 = 200;

/// Throttle steps between adaptive-distance checks.
pub const ADAPTIVE_CHECK_PERIOD: u64 = 100;

/// Multiplier from which living actors lose autonomous behaviour.
pub const SUSPEND_MULTIPLIER: u32 = 8;

/// Multiplier from which propagation mechanics are slowed.
pub const PROPAGATION_MULTIPLIER: u32 = 4;

const MAX_MULTIPLIER_EXPONENT: u32 = 30;

/// How many steps a region at `distance` waits between runs.
///
/// ```
/// use core_guard::throttle::tick_multiplier;
/// assert_eq!(tick_multiplier(4, 4), 1);
/// assert_eq!(tick_multiplier(5, 4), 4);
/// assert_eq!(tick_multiplier(7, 4), 16);
/// ```
pub fn tick_multiplier(distance: u32, base_radius: u32) -> u32 {
    if distance <= base_radius {
        return 1;
    }
    let steps = distance - base_radius;
    1u32 << steps.saturating_add(1).min(MAX_MULTIPLIER_EXPONENT)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionTickState {
    pub multiplier: u32,
    pub ticks_since_last_run: u32,
}

impl RegionTickState {
    pub fn new(multiplier: u32) -> Self {
        Self {
            multiplier: multiplier.max(1),
            ticks_since_last_run: 0,
        }
    }

    /// Count one step. Returns true when the region runs on this step.
    pub fn advance(&mut self) -> bool {
        self.ticks_since_last_run = self.ticks_since_last_run.wrapping_add(1);
        if self.ticks_since_last_run % self.multiplier != 0 {
            return false;
        }
        self.ticks_since_last_run = 0;
        true
    }

    /// Steps until the region next runs, counting the step that runs it.
    pub fn steps_until_run(&self) -> u32 {
        self.multiplier - self.ticks_since_last_run % self.multiplier
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThrottleStats {
    pub tracked: usize,
    pub lazy: usize,
    pub average_multiplier: f64,
    pub tps: f64,
}

impl Default for ThrottleStats {
    fn default() -> Self {
        Self {
            tracked: 0,
            lazy: 0,
            average_multiplier: 1.0,
            tps: 0.0,
        }
    }
}

impl ThrottleStats {
    pub fn lazy_share_pct(&self) -> f64 {
        if self.tracked == 0 {
            return 0.0;
        }
        self.lazy as f64 * 100.0 / self.tracked as f64
    }

    /// Share of region steps skipped compared to running everything.
    pub fn estimated_reduction_pct(&self) -> f64 {
        if self.average_multiplier <= 1.0 {
            return 0.0;
        }
        100.0 - 100.0 / self.average_multiplier
    }
}

#[derive(Debug, Default)]
pub struct ChunkThrottleEngine {
    regions: HashMap<RegionKey, RegionTickState>,
    deferred: DeferredQueue,
    active: bool,
    cycle: u64,
    stats: ThrottleStats,
}

impl ChunkThrottleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin throttling with an empty region table. Returns false and does
    /// nothing when the feature is disabled.
    pub fn start(&mut self, config: &LazyChunksConfig) -> bool {
        if !config.enabled {
            info!(target: "tick_guard::throttle", "lazy_chunks.start_skipped=disabled");
            return false;
        }
        if self.active {
            return true;
        }
        self.regions.clear();
        self.cycle = 0;
        self.stats = ThrottleStats::default();
        self.active = true;
        info!(
            target: "tick_guard::throttle",
            distance = config.distance,
            adaptive = config.adaptive,
            "lazy_chunks.started"
        );
        true
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// One throttle step. Refreshes distances on the first step and every
    /// [`REFRESH_PERIOD`] steps after that.
    pub fn tick(&mut self, now: u64, host: &mut dyn ServerHost, ctx: &LoopContext<'_>) {
        if !self.active {
            return;
        }
        self.cycle += 1;
        let lazy = ctx.config.lazy_chunks();

        if self.cycle == 1 || self.cycle % REFRESH_PERIOD == 0 {
            self.refresh_distances(&*host, lazy.distance);
            if lazy.logging {
                self.log_statistics();
            }
        }

        self.process_regions(now, host);

        if lazy.adaptive && self.cycle % ADAPTIVE_CHECK_PERIOD == 0 {
            self.adjust_adaptive_distance(host.tps(), lazy);
        }
    }

    /// Recompute every loaded region's multiplier from observer proximity.
    ///
    /// Existing step counters survive; regions that are no longer loaded
    /// are dropped from the table.
    pub fn refresh_distances(&mut self, host: &dyn ServerHost, base_radius: u32) {
        let observers = host.observers();
        let mut loaded = HashSet::new();
        let mut lazy = 0usize;
        let mut total_multiplier = 0.0;

        for world in host.worlds() {
            let nearby: Vec<_> = observers
                .iter()
                .filter(|observer| observer.world == world)
                .map(|observer| observer.region)
                .collect();
            for pos in host.loaded_regions(&world) {
                let distance = nearby
                    .iter()
                    .map(|observer| observer.distance(pos))
                    .min()
                    .unwrap_or(FALLBACK_DISTANCE);
                let multiplier = tick_multiplier(distance, base_radius);
                let key = RegionKey::new(world.clone(), pos);
                self.regions
                    .entry(key.clone())
                    .and_modify(|state| state.multiplier = multiplier)
                    .or_insert_with(|| RegionTickState::new(multiplier));
                if multiplier > 1 {
                    lazy += 1;
                }
                total_multiplier += f64::from(multiplier);
                loaded.insert(key);
            }
        }

        self.regions.retain(|key, _| loaded.contains(key));
        let tracked = loaded.len();
        self.stats = ThrottleStats {
            tracked,
            lazy,
            average_multiplier: if tracked > 0 {
                total_multiplier / tracked as f64
            } else {
                1.0
            },
            tps: host.tps(),
        };
    }

    fn process_regions(&mut self, now: u64, host: &mut dyn ServerHost) {
        let Self {
            regions, deferred, ..
        } = self;
        for (key, state) in regions.iter_mut() {
            if state.advance() {
                continue;
            }
            let multiplier = state.multiplier;
            let next_run = now.saturating_add(u64::from(state.steps_until_run()));
            for actor in host.actors_in_region(key) {
                if actor.kind.is_observer() {
                    continue;
                }
                if let Err(err) = host.suppress_step(actor.id) {
                    debug!(target: "tick_guard::throttle", error = %err, "lazy_chunks.suppress_failed");
                    continue;
                }
                if multiplier >= SUSPEND_MULTIPLIER && actor.living && actor.autonomous {
                    match host.set_autonomous(actor.id, false) {
                        Ok(()) => deferred.schedule(next_run, actor.id),
                        Err(err) => {
                            debug!(target: "tick_guard::throttle", error = %err, "lazy_chunks.suspend_failed")
                        }
                    }
                }
            }
            if multiplier >= PROPAGATION_MULTIPLIER {
                host.suppress_propagation(key, multiplier);
            }
        }
    }

    /// Restore autonomous behaviour for every actor whose suspension ends
    /// at or before `now`. Actors that have vanished are skipped.
    pub fn drain_due(&mut self, now: u64, host: &mut dyn ServerHost) -> usize {
        let due = self.deferred.drain_due(now);
        restore_actors(due, host)
    }

    /// Warn when throughput is poor and the full-rate radius could shrink.
    /// The configured radius itself is never changed.
    pub fn adjust_adaptive_distance(&self, tps: f64, config: &LazyChunksConfig) -> bool {
        if tps >= config.adaptive_tps_threshold || config.distance <= config.min_distance {
            return false;
        }
        warn!(
            target: "tick_guard::throttle",
            tps,
            threshold = config.adaptive_tps_threshold,
            distance = config.distance,
            min_distance = config.min_distance,
            "lazy_chunks.adaptive_radius_pressure"
        );
        true
    }

    /// Restore every suspended actor and forget all region state.
    pub fn stop(&mut self, host: &mut dyn ServerHost) {
        let restored = restore_actors(self.deferred.drain_all(), host);
        let was_active = self.active;
        self.regions.clear();
        self.cycle = 0;
        self.stats = ThrottleStats::default();
        self.active = false;
        if was_active {
            info!(target: "tick_guard::throttle", restored, "lazy_chunks.stopped");
        }
    }

    fn log_statistics(&self) {
        info!(
            target: "tick_guard::throttle",
            tracked = self.stats.tracked,
            lazy = self.stats.lazy,
            lazy_pct = self.stats.lazy_share_pct(),
            average_multiplier = self.stats.average_multiplier,
            "lazy_chunks.statistics"
        );
    }

    pub fn stats(&self) -> ThrottleStats {
        self.stats
    }

    pub fn multiplier_of(&self, key: &RegionKey) -> Option<u32> {
        self.regions.get(key).map(|state| state.multiplier)
    }

    pub fn pending_restores(&self) -> usize {
        self.deferred.len()
    }
}

fn restore_actors(actors: Vec<ActorId>, host: &mut dyn ServerHost) -> usize {
    let mut restored = 0;
    for id in actors {
        if host.actor(id).is_none() {
            continue;
        }
        match host.set_autonomous(id, true) {
            Ok(()) => restored += 1,
            Err(err) => debug!(target: "tick_guard::throttle", error = %err, "lazy_chunks.restore_failed"),
        }
    }
    restored
}
