//! Configuration drift detection.
//!
//! Content hashes of the watched files are recorded at start and compared on
//! every check. The first change raises a flag, tells privileged sessions a
//! restart is needed and keeps reminding them until the flag is reset or the
//! reminder budget runs out.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::context::LoopContext;
use crate::hashing::hash_file;
use crate::host::{ServerHost, TICKS_PER_SECOND};
use crate::scheduler::RepeatingTimer;

#[derive(Debug, Default)]
pub struct DriftMonitor {
    root: PathBuf,
    hashes: BTreeMap<PathBuf, u64>,
    check_timer: Option<RepeatingTimer>,
    reminder_timer: Option<RepeatingTimer>,
    reminders_sent: u32,
    drifted: bool,
}

impl DriftMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record baseline hashes for every watched file that exists under
    /// `root` and arm the periodic check.
    pub fn start(&mut self, root: &Path, config: &MonitorConfig, now: u64) -> bool {
        self.stop();
        if !config.enabled {
            info!(target: "tick_guard::monitor", "drift_monitor.start_skipped=disabled");
            return false;
        }
        self.root = root.to_path_buf();
        for file in &config.files {
            if let Ok(hash) = hash_file(&root.join(file)) {
                self.hashes.insert(file.clone(), hash);
            }
        }
        let period = u64::from(config.check_interval_seconds.max(1)) * TICKS_PER_SECOND;
        self.check_timer = Some(RepeatingTimer::new(now, period, period));
        info!(
            target: "tick_guard::monitor",
            root = %root.display(),
            watched = self.hashes.len(),
            "drift_monitor.started"
        );
        true
    }

    pub fn tick(&mut self, now: u64, host: &mut dyn ServerHost, ctx: &LoopContext<'_>) {
        if self.check_timer.as_mut().is_some_and(|timer| timer.poll(now)) {
            self.check(now, host, ctx);
        }
        if self.reminder_timer.as_mut().is_some_and(|timer| timer.poll(now)) {
            self.remind(host, ctx);
        }
    }

    /// Rehash the watched files and return the ones whose content changed.
    pub fn check(
        &mut self,
        now: u64,
        host: &mut dyn ServerHost,
        ctx: &LoopContext<'_>,
    ) -> Vec<PathBuf> {
        let mut changed = Vec::new();
        for (file, recorded) in self.hashes.iter_mut() {
            let Ok(current) = hash_file(&self.root.join(file)) else {
                continue;
            };
            if current == *recorded {
                continue;
            }
            *recorded = current;
            let line = ctx.catalog.plain(
                "config.file-changed",
                "&7File changed: &f{FILE}",
                &[("FILE", file.display().to_string())],
            );
            warn!(target: "tick_guard::monitor", "{line}");
            changed.push(file.clone());
        }

        if changed.is_empty() || self.drifted {
            return changed;
        }

        self.drifted = true;
        let audience = ctx.operator_audience();
        let detected = ctx.catalog.message(
            "config.change-detected",
            "&e⚡ &6tick_guard: &fConfiguration was changed!",
        );
        let restart = ctx.catalog.message(
            "config.restart-required",
            "&e⚠ &6Restart required for some optimizations!",
        );
        host.broadcast(audience, &detected);
        host.broadcast(audience, &restart);
        warn!(
            target: "tick_guard::monitor",
            files = ?changed,
            "drift_monitor.change_detected"
        );

        if self.reminder_timer.is_none() {
            let period =
                u64::from(ctx.config.monitor().reminder_interval_seconds.max(1)) * TICKS_PER_SECOND;
            self.reminders_sent = 0;
            self.reminder_timer = Some(RepeatingTimer::new(now, 0, period));
        }
        changed
    }

    fn remind(&mut self, host: &mut dyn ServerHost, ctx: &LoopContext<'_>) {
        if !self.drifted || self.reminders_sent >= ctx.config.monitor().max_reminders {
            self.reset();
            return;
        }
        let audience = ctx.operator_audience();
        for line in ctx.catalog.restart_notice() {
            host.broadcast(audience, &line);
        }
        self.reminders_sent += 1;
    }

    /// Clear the drift flag and stop reminding. Baselines are kept.
    pub fn reset(&mut self) {
        if self.drifted || self.reminder_timer.is_some() {
            info!(target: "tick_guard::monitor", reminders = self.reminders_sent, "drift_monitor.reset");
        }
        self.drifted = false;
        self.reminder_timer = None;
        self.reminders_sent = 0;
    }

    pub fn stop(&mut self) {
        self.reset();
        self.check_timer = None;
        self.hashes.clear();
    }

    pub fn is_drifted(&self) -> bool {
        self.drifted
    }

    pub fn is_reminding(&self) -> bool {
        self.reminder_timer.is_some()
    }

    pub fn has_live_timer(&self) -> bool {
        self.check_timer.is_some() || self.reminder_timer.is_some()
    }

    pub fn reminders_sent(&self) -> u32 {
        self.reminders_sent
    }

    pub fn watched_files(&self) -> impl Iterator<Item = &Path> {
        self.hashes.keys().map(PathBuf::as_path)
    }
}
