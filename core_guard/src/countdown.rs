use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use crate::context::LoopContext;
use crate::host::{ActorId, ServerHost, TICKS_PER_SECOND};
use crate::scheduler::RepeatingTimer;

/// Seconds remaining at which a reminder is broadcast, besides the final five.
const MILESTONES: [u32; 2] = [30, 10];
const FINAL_SECONDS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CountdownState {
    Idle,
    CountingDown { remaining: u32 },
}

/// Outcome of one countdown poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownProgress {
    Idle,
    Waiting,
    Remaining(u32),
    Finished,
}

/// Player-facing warning countdown ahead of a cleanup sweep.
#[derive(Debug)]
pub struct CleanupCountdownController {
    state: CountdownState,
    timer: Option<RepeatingTimer>,
    notified: BTreeSet<ActorId>,
}

impl Default for CleanupCountdownController {
    fn default() -> Self {
        Self {
            state: CountdownState::Idle,
            timer: None,
            notified: BTreeSet::new(),
        }
    }
}

impl CleanupCountdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a countdown of `total_seconds`. Any running countdown is
    /// cancelled first, including its broadcast.
    pub fn start(
        &mut self,
        total_seconds: u32,
        now: u64,
        host: &mut dyn ServerHost,
        ctx: &LoopContext<'_>,
    ) {
        self.cancel(host, ctx);
        self.notified.clear();
        self.state = CountdownState::CountingDown {
            remaining: total_seconds,
        };
        self.timer = Some(RepeatingTimer::new(now, TICKS_PER_SECOND, TICKS_PER_SECOND));

        let notice = ctx
            .catalog
            .message("cleanup.countdown.minute", "&e⚠ &6Entity cleanup in &f1 minute&6!");
        self.notify(host, ctx, &notice);
        info!(target: "tick_guard::countdown", seconds = total_seconds, "countdown.started");
    }

    pub fn tick(
        &mut self,
        now: u64,
        host: &mut dyn ServerHost,
        ctx: &LoopContext<'_>,
    ) -> CountdownProgress {
        let CountdownState::CountingDown { remaining } = self.state else {
            return CountdownProgress::Idle;
        };
        let Some(timer) = self.timer.as_mut() else {
            return CountdownProgress::Idle;
        };
        if !timer.poll(now) {
            return CountdownProgress::Waiting;
        }

        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            let started = ctx
                .catalog
                .message("cleanup.countdown.started", "&6🧹 &fEntity cleanup started!");
            self.notify(host, ctx, &started);
            self.finish();
            info!(target: "tick_guard::countdown", "countdown.finished");
            return CountdownProgress::Finished;
        }

        self.state = CountdownState::CountingDown { remaining };
        if MILESTONES.contains(&remaining) || remaining <= FINAL_SECONDS {
            let reminder = ctx.catalog.render(
                "cleanup.countdown.seconds",
                "&e⚠ &6Entity cleanup in &f{SECONDS} &6seconds!",
                &[("SECONDS", remaining.to_string())],
            );
            self.notify(host, ctx, &reminder);
        }
        CountdownProgress::Remaining(remaining)
    }

    /// Stop an active countdown and tell players why. Silent when idle.
    pub fn cancel(&mut self, host: &mut dyn ServerHost, ctx: &LoopContext<'_>) -> bool {
        if !self.is_active() {
            self.timer = None;
            return false;
        }
        let cancelled = ctx.catalog.message(
            "cleanup.countdown.cancelled",
            "&a✓ &fCleanup cancelled, server performance recovered.",
        );
        self.notify(host, ctx, &cancelled);
        self.finish();
        info!(target: "tick_guard::countdown", "countdown.cancelled");
        true
    }

    fn finish(&mut self) {
        self.state = CountdownState::Idle;
        self.timer = None;
    }

    fn notify(&mut self, host: &mut dyn ServerHost, ctx: &LoopContext<'_>, message: &str) {
        let recipients = host.broadcast(ctx.cleanup_audience(), message);
        self.notified.extend(recipients);
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, CountdownState::CountingDown { .. })
    }

    pub fn remaining_seconds(&self) -> Option<u32> {
        match self.state {
            CountdownState::CountingDown { remaining } => Some(remaining),
            CountdownState::Idle => None,
        }
    }

    pub fn has_live_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Sessions reached by the current (or last) countdown.
    pub fn notified(&self) -> &BTreeSet<ActorId> {
        &self.notified
    }
}
