//! Last-resort purge when throughput collapses.
//!
//! Stateless: every sample below the hard threshold runs the full action
//! again, with no cooldown between purges.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::context::LoopContext;
use crate::host::ServerHost;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub total: u32,
    /// Removed actors keyed by host type name.
    pub by_type: BTreeMap<String, u32>,
}

impl PurgeReport {
    /// `ZOMBIE: 3, MINECART: 1` style breakdown for the log line.
    pub fn breakdown(&self) -> String {
        self.by_type
            .iter()
            .map(|(name, count)| format!("{name}: {count}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmergencyOutcome {
    Calm,
    /// Below threshold but entity removal is disabled.
    Warned,
    Purged(PurgeReport),
}

pub fn check(tps: f64, host: &mut dyn ServerHost, ctx: &LoopContext<'_>) -> EmergencyOutcome {
    let emergency = ctx.config.emergency();
    if tps >= emergency.tps_threshold {
        return EmergencyOutcome::Calm;
    }

    let warning = ctx.catalog.plain(
        "emergency.tps-low-warning",
        "&c⚠ &6Warning: &fServer TPS is critically low (&e{TPS}&f/20)",
        &[("TPS", format!("{tps:.1}"))],
    );
    warn!(
        target: "tick_guard::emergency",
        tps,
        threshold = emergency.tps_threshold,
        "{warning}"
    );

    if !emergency.kill_non_player_entities {
        return EmergencyOutcome::Warned;
    }
    EmergencyOutcome::Purged(purge(host, ctx))
}

/// Remove every non-observer actor in every world, then warn privileged
/// sessions.
pub fn purge(host: &mut dyn ServerHost, ctx: &LoopContext<'_>) -> PurgeReport {
    let activated = ctx.catalog.plain(
        "emergency.emergency-activated",
        "&4🚨 &cEmergency protocol activated! &fRemoving non-player entities...",
        &[],
    );
    warn!(target: "tick_guard::emergency", "{activated}");

    let mut report = PurgeReport::default();
    for world in host.worlds() {
        for actor in host.actors(&world) {
            if actor.kind.is_observer() {
                continue;
            }
            match host.remove_actor(actor.id) {
                Ok(()) => {
                    report.total += 1;
                    *report.by_type.entry(actor.type_name).or_insert(0) += 1;
                }
                Err(err) => {
                    debug!(target: "tick_guard::emergency", error = %err, "emergency.remove_failed")
                }
            }
        }
    }

    warn!(
        target: "tick_guard::emergency",
        total = report.total,
        breakdown = %report.breakdown(),
        "emergency.purge_completed"
    );

    let message = ctx.catalog.message(
        "emergency.broadcast-warning",
        "&c⚠ &6Warning: &fServer performance critical. Cleanup in progress...",
    );
    host.broadcast(ctx.operator_audience(), &message);
    report
}
