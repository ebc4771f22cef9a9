//! Step-driven timers.
//!
//! The orchestrator polls these once per simulation step; a timer handle is
//! held as `Option<_>` by its owner and cancelled by dropping it, so "is
//! running" and "has a live timer" are the same fact.

use std::collections::BTreeSet;

use crate::host::ActorId;

/// Fires first after `delay` steps, then every `period` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatingTimer {
    next_due: u64,
    period: u64,
}

impl RepeatingTimer {
    pub fn new(now: u64, delay: u64, period: u64) -> Self {
        Self {
            next_due: now.saturating_add(delay),
            period: period.max(1),
        }
    }

    /// Returns true when the timer fires on step `now`.
    ///
    /// Missed periods are not replayed; the next firing is scheduled one
    /// period after `now`.
    pub fn poll(&mut self, now: u64) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = now.saturating_add(self.period);
        true
    }

    pub fn next_due(&self) -> u64 {
        self.next_due
    }

    pub fn period(&self) -> u64 {
        self.period
    }
}

/// Fires exactly once, `delay` steps after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneShotTimer {
    due: u64,
}

impl OneShotTimer {
    pub fn new(now: u64, delay: u64) -> Self {
        Self {
            due: now.saturating_add(delay),
        }
    }

    pub fn is_due(&self, now: u64) -> bool {
        now >= self.due
    }

    pub fn due(&self) -> u64 {
        self.due
    }
}

/// Deferred per-actor actions ordered by due step.
///
/// Entries hold only an actor identifier; whoever drains the queue must look
/// the actor up again and tolerate it being gone.
#[derive(Debug, Clone, Default)]
pub struct DeferredQueue {
    entries: BTreeSet<(u64, ActorId)>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: u64, actor: ActorId) {
        self.entries.insert((due, actor));
    }

    /// Remove and return every entry due at or before `now`, oldest first.
    pub fn drain_due(&mut self, now: u64) -> Vec<ActorId> {
        let pending = match now.checked_add(1) {
            Some(cutoff) => self.entries.split_off(&(cutoff, ActorId(0))),
            None => BTreeSet::new(),
        };
        let due = std::mem::replace(&mut self.entries, pending);
        due.into_iter().map(|(_, actor)| actor).collect()
    }

    /// Remove and return everything regardless of due step.
    pub fn drain_all(&mut self) -> Vec<ActorId> {
        std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(_, actor)| actor)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
