use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported administrative commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandPayload {
    /// Report throughput and which adaptive features are active.
    Status,
    /// Force the emergency purge regardless of the current sample.
    Emergency,
    /// Run one sweep immediately, bypassing the countdown.
    Cleanup,
    /// Clear the configuration drift flag and stop its reminders.
    MonitorReset,
    /// Reload configuration and restart every control loop.
    Reload,
    /// Detailed chunk-throttle statistics.
    LazyStats,
    Help,
    /// Pin (or release) the throughput sample used by the control loops.
    TestTps { value: TpsOverride },
    /// Send the drift notice to privileged sessions without a real change.
    TestNotify,
    /// Headless host only: place actors into the reference world.
    Spawn {
        kind: SpawnKind,
        count: u32,
        x: f64,
        z: f64,
    },
}

impl CommandPayload {
    /// Whether the caller must hold the admin capability.
    ///
    /// The check itself belongs to whoever authenticates the sender.
    pub fn requires_admin(&self) -> bool {
        !matches!(
            self,
            CommandPayload::Status | CommandPayload::LazyStats | CommandPayload::Help
        )
    }

    pub fn verb(&self) -> &'static str {
        match self {
            CommandPayload::Status => "status",
            CommandPayload::Emergency => "emergency",
            CommandPayload::Cleanup => "cleanup",
            CommandPayload::MonitorReset => "monitor reset",
            CommandPayload::Reload => "reload",
            CommandPayload::LazyStats => "lazystats",
            CommandPayload::Help => "help",
            CommandPayload::TestTps { .. } => "test tps",
            CommandPayload::TestNotify => "test notify",
            CommandPayload::Spawn { .. } => "spawn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TpsOverride {
    Pin(f64),
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnKind {
    Item,
    Vehicle,
    Orb,
    Creature,
    Other,
    Player,
}

impl SpawnKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "item" | "items" => Some(SpawnKind::Item),
            "vehicle" | "boat" | "minecart" => Some(SpawnKind::Vehicle),
            "orb" | "xp" => Some(SpawnKind::Orb),
            "creature" | "mob" => Some(SpawnKind::Creature),
            "other" | "misc" => Some(SpawnKind::Other),
            "player" => Some(SpawnKind::Player),
            _ => None,
        }
    }
}

impl fmt::Display for SpawnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpawnKind::Item => "item",
            SpawnKind::Vehicle => "vehicle",
            SpawnKind::Orb => "orb",
            SpawnKind::Creature => "creature",
            SpawnKind::Other => "other",
            SpawnKind::Player => "player",
        };
        f.write_str(label)
    }
}

/// Help lines in the order the console prints them.
pub const HELP_LINES: &[(&str, &str)] = &[
    ("status", "show current performance"),
    ("emergency", "trigger the emergency purge manually"),
    ("cleanup", "run a cleanup sweep now"),
    ("monitor reset", "acknowledge configuration drift"),
    ("reload", "reload configuration"),
    ("lazystats", "chunk throttle statistics"),
    ("test tps <value|clear>", "pin the throughput sample"),
    ("test notify", "send a test drift notice"),
    ("spawn <kind> [count] [x z]", "place actors (headless host)"),
];
