//! Collaborator interfaces implemented by the server runtime that hosts the
//! control loops.
//!
//! Every control loop receives the host explicitly on each call; nothing in
//! this crate reaches for a global server handle. Implementations must resolve
//! actors freshly on every call, since the loops never hold references across
//! invocations.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Simulation steps per wall-clock second at full speed.
pub const TICKS_PER_SECOND: u64 = 20;

/// Best achievable throughput sample.
pub const MAX_TPS: f64 = 20.0;

/// Width of a region in world units.
pub const REGION_SIZE: f64 = 16.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldId(pub String);

impl WorldId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Region coordinates inside a single world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn containing(x: f64, z: f64) -> Self {
        Self {
            x: (x / REGION_SIZE).floor() as i32,
            z: (z / REGION_SIZE).floor() as i32,
        }
    }

    /// Chebyshev distance in regions.
    pub fn distance(self, other: RegionPos) -> u32 {
        let dx = (i64::from(self.x) - i64::from(other.x)).unsigned_abs();
        let dz = (i64::from(self.z) - i64::from(other.z)).unsigned_abs();
        dx.max(dz).min(u64::from(u32::MAX)) as u32
    }
}

/// Fully-qualified region identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionKey {
    pub world: WorldId,
    pub pos: RegionPos,
}

impl RegionKey {
    pub fn new(world: WorldId, pos: RegionPos) -> Self {
        Self { world, pos }
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{},{}]", self.world, self.pos.x, self.pos.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Categories the cleanup paths care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorKind {
    /// A connected session's avatar. Never removed by any cleanup path.
    Player,
    GroundItem,
    Vehicle,
    ExperienceOrb,
    Creature,
    Other,
}

impl ActorKind {
    pub fn is_observer(self) -> bool {
        matches!(self, ActorKind::Player)
    }
}

/// Point-in-time view of one actor, taken during enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub region: RegionKey,
    pub kind: ActorKind,
    /// Host-specific type label, e.g. `ZOMBIE` or `MINECART`.
    pub type_name: String,
    /// Tick on which the actor entered the world.
    pub created_at: u64,
    pub passengers: u32,
    /// Living actors can have their autonomous behaviour suspended.
    pub living: bool,
    pub autonomous: bool,
}

impl ActorSnapshot {
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

bitflags! {
    /// Capabilities a connected session holds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Privileges: u8 {
        const NOTIFY = 1 << 0;
        const ADMIN = 1 << 1;
        const OPERATOR = 1 << 2;
    }
}

impl Default for Privileges {
    fn default() -> Self {
        Privileges::empty()
    }
}

impl Privileges {
    /// Sessions that should see operational notices.
    pub const NOTICE_AUDIENCE: Privileges = Privileges::NOTIFY
        .union(Privileges::ADMIN)
        .union(Privileges::OPERATOR);

    /// Sessions allowed to run administrative commands.
    pub const ADMIN_AUDIENCE: Privileges = Privileges::ADMIN.union(Privileges::OPERATOR);
}

/// A connected session positioned in a world.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverInfo {
    pub actor: ActorId,
    pub name: String,
    pub world: WorldId,
    pub region: RegionPos,
    pub privileges: Privileges,
}

/// Who a broadcast is for. Recipients are resolved by the host when the
/// broadcast is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Audience {
    Everyone,
    /// Sessions holding any of the listed privileges.
    Privileged(Privileges),
}

impl Audience {
    pub fn admits(self, privileges: Privileges) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::Privileged(required) => privileges.intersects(required),
        }
    }
}

/// Per-world caps on naturally spawned creatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnLimits {
    pub monsters: u32,
    pub animals: u32,
    pub water_animals: u32,
    pub ambient: u32,
}

impl Default for SpawnLimits {
    fn default() -> Self {
        Self {
            monsters: 30,
            animals: 15,
            water_animals: 5,
            ambient: 2,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("{0} no longer exists")]
    ActorMissing(ActorId),
    #[error("{0} cannot be modified: {1}")]
    Rejected(ActorId, &'static str),
    #[error("world {0} is not loaded")]
    WorldMissing(WorldId),
}

/// Smoothed throughput plus the simulation clock.
pub trait PerformanceSignal {
    /// Ticks per second averaged over roughly the last minute.
    fn tps(&self) -> f64;

    /// Averages over one, five and fifteen minutes. Hosts that only keep
    /// one window report it three times.
    fn tps_windows(&self) -> [f64; 3] {
        let tps = self.tps();
        [tps, tps, tps]
    }

    /// Simulation steps elapsed since the host started.
    fn current_tick(&self) -> u64;
}

/// Read and mutate the live world.
pub trait WorldAccess {
    fn worlds(&self) -> Vec<WorldId>;

    fn loaded_regions(&self, world: &WorldId) -> Vec<RegionPos>;

    fn observers(&self) -> Vec<ObserverInfo>;

    fn actors(&self, world: &WorldId) -> Vec<ActorSnapshot>;

    fn actors_in_region(&self, region: &RegionKey) -> Vec<ActorSnapshot>;

    fn actor(&self, id: ActorId) -> Option<ActorSnapshot>;

    fn remove_actor(&mut self, id: ActorId) -> Result<(), HostError>;

    /// Enable or disable the actor's autonomous behaviour (pathing, targeting).
    fn set_autonomous(&mut self, id: ActorId, enabled: bool) -> Result<(), HostError>;

    /// Keep the actor from acting during the current simulation step.
    fn suppress_step(&mut self, id: ActorId) -> Result<(), HostError>;

    /// Slow signal-propagation mechanics in a region. Hosts without such a
    /// capability treat this as a no-op.
    fn suppress_propagation(&mut self, region: &RegionKey, multiplier: u32);

    fn set_spawn_limits(&mut self, world: &WorldId, limits: SpawnLimits) -> Result<(), HostError>;
}

/// Player-facing message delivery.
pub trait NotificationSink {
    /// Deliver `message` to every session the audience admits right now and
    /// return the sessions that received it.
    fn broadcast(&mut self, audience: Audience, message: &str) -> Vec<ActorId>;
}

/// Everything the control loops need from the server runtime.
pub trait ServerHost: PerformanceSignal + WorldAccess + NotificationSink {}

impl<T: PerformanceSignal + WorldAccess + NotificationSink + ?Sized> ServerHost for T {}
