//! Reference host backed by a `bevy_ecs` world.
//!
//! Actors are entities carrying [`Actor`] and [`Placement`]; connected
//! sessions additionally carry [`Session`]. Broadcasts land in an outbox
//! the server drains after every step.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    time::{Duration, Instant},
};

use bevy_ecs::prelude::*;
use tracing::debug;

use crate::host::{
    ActorId, ActorKind, ActorSnapshot, Audience, HostError, NotificationSink, ObserverInfo,
    PerformanceSignal, Privileges, RegionKey, RegionPos, SpawnLimits, WorldAccess, WorldId,
    MAX_TPS,
};

const SMOOTHING_WINDOWS: [Duration; 3] = [
    Duration::from_secs(60),
    Duration::from_secs(300),
    Duration::from_secs(900),
];

#[derive(Component, Debug, Clone)]
pub struct Actor {
    pub id: ActorId,
    pub kind: ActorKind,
    pub type_name: String,
    pub created_at: u64,
    pub passengers: u32,
    pub autonomous: bool,
    /// Set by the control loops; cleared after every step.
    pub suppressed: bool,
    /// Steps on which the actor ran its autonomous behaviour.
    pub acted_steps: u64,
}

impl Actor {
    pub fn is_living(&self) -> bool {
        matches!(self.kind, ActorKind::Creature | ActorKind::Player)
    }
}

#[derive(Component, Debug, Clone)]
pub struct Placement {
    pub world: WorldId,
    pub x: f64,
    pub z: f64,
}

impl Placement {
    pub fn region(&self) -> RegionPos {
        RegionPos::containing(self.x, self.z)
    }

    pub fn region_key(&self) -> RegionKey {
        RegionKey::new(self.world.clone(), self.region())
    }
}

#[derive(Component, Debug, Clone)]
pub struct Session {
    pub name: String,
    pub privileges: Privileges,
}

#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct HostClock {
    pub tick: u64,
}

#[derive(Resource, Debug, Default, Clone)]
pub struct LoadedRegions(pub BTreeMap<WorldId, BTreeSet<RegionPos>>);

/// Latest propagation multiplier requested per region.
#[derive(Resource, Debug, Default, Clone)]
pub struct PropagationLimits(pub HashMap<RegionKey, u32>);

#[derive(Resource, Debug, Default, Clone)]
pub struct WorldSpawnLimits(pub BTreeMap<WorldId, SpawnLimits>);

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub tick: u64,
    pub recipients: Vec<ActorId>,
    pub text: String,
}

#[derive(Resource, Debug, Default, Clone)]
pub struct Outbox(pub Vec<OutboundMessage>);

/// Wall-clock throughput with exponential smoothing over one, five and
/// fifteen minutes.
#[derive(Debug, Clone, Copy)]
pub struct TpsMeter {
    averages: [f64; 3],
}

impl Default for TpsMeter {
    fn default() -> Self {
        Self {
            averages: [MAX_TPS; 3],
        }
    }
}

impl TpsMeter {
    pub fn record(&mut self, step: Duration) {
        let seconds = step.as_secs_f64();
        if seconds <= 0.0 {
            return;
        }
        let sample = (1.0 / seconds).min(MAX_TPS);
        for (average, window) in self.averages.iter_mut().zip(SMOOTHING_WINDOWS) {
            let weight = 1.0 - (-seconds / window.as_secs_f64()).exp();
            *average += weight * (sample - *average);
        }
    }

    /// One-minute average.
    pub fn average(&self) -> f64 {
        self.averages[0]
    }

    pub fn averages(&self) -> [f64; 3] {
        self.averages
    }
}

pub struct HeadlessHost {
    world: World,
    index: HashMap<ActorId, Entity>,
    next_actor: u64,
    meter: TpsMeter,
    tps_override: Option<f64>,
    last_step: Option<Instant>,
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessHost {
    pub fn new() -> Self {
        let mut world = World::new();
        world.insert_resource(HostClock::default());
        world.insert_resource(LoadedRegions::default());
        world.insert_resource(PropagationLimits::default());
        world.insert_resource(WorldSpawnLimits::default());
        world.insert_resource(Outbox::default());
        Self {
            world,
            index: HashMap::new(),
            next_actor: 0,
            meter: TpsMeter::default(),
            tps_override: None,
            last_step: None,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn load_region(&mut self, world: &WorldId, pos: RegionPos) {
        self.world
            .resource_mut::<LoadedRegions>()
            .0
            .entry(world.clone())
            .or_default()
            .insert(pos);
    }

    pub fn unload_region(&mut self, world: &WorldId, pos: RegionPos) {
        if let Some(regions) = self.world.resource_mut::<LoadedRegions>().0.get_mut(world) {
            regions.remove(&pos);
        }
    }

    /// Place an actor at world coordinates, loading its region.
    pub fn spawn_actor(&mut self, kind: ActorKind, world: &WorldId, x: f64, z: f64) -> ActorId {
        let type_name = match kind {
            ActorKind::Player => "PLAYER",
            ActorKind::GroundItem => "DROPPED_ITEM",
            ActorKind::Vehicle => "MINECART",
            ActorKind::ExperienceOrb => "EXPERIENCE_ORB",
            ActorKind::Creature => "ZOMBIE",
            ActorKind::Other => "ARMOR_STAND",
        };
        self.spawn_named(kind, type_name, world, x, z)
    }

    pub fn spawn_named(
        &mut self,
        kind: ActorKind,
        type_name: &str,
        world: &WorldId,
        x: f64,
        z: f64,
    ) -> ActorId {
        self.next_actor += 1;
        let id = ActorId(self.next_actor);
        let placement = Placement {
            world: world.clone(),
            x,
            z,
        };
        self.load_region(world, placement.region());
        let actor = Actor {
            id,
            kind,
            type_name: type_name.to_string(),
            created_at: self.current_tick(),
            passengers: 0,
            autonomous: matches!(kind, ActorKind::Creature | ActorKind::Player),
            suppressed: false,
            acted_steps: 0,
        };
        let entity = self.world.spawn((actor, placement)).id();
        self.index.insert(id, entity);
        id
    }

    /// Connect a session with an avatar at the given coordinates.
    pub fn spawn_player(
        &mut self,
        name: &str,
        world: &WorldId,
        x: f64,
        z: f64,
        privileges: Privileges,
    ) -> ActorId {
        let id = self.spawn_actor(ActorKind::Player, world, x, z);
        if let Some(&entity) = self.index.get(&id) {
            self.world.entity_mut(entity).insert(Session {
                name: name.to_string(),
                privileges,
            });
        }
        id
    }

    pub fn move_actor(&mut self, id: ActorId, x: f64, z: f64) -> Result<(), HostError> {
        let entity = self.entity(id)?;
        let world = {
            let mut placement = self
                .world
                .get_mut::<Placement>(entity)
                .ok_or(HostError::ActorMissing(id))?;
            placement.x = x;
            placement.z = z;
            placement.world.clone()
        };
        self.load_region(&world, RegionPos::containing(x, z));
        Ok(())
    }

    pub fn set_passengers(&mut self, id: ActorId, passengers: u32) -> Result<(), HostError> {
        self.actor_mut(id, |actor| actor.passengers = passengers)
    }

    /// Pin the throughput sample, or return to the measured value.
    pub fn set_tps_override(&mut self, tps: Option<f64>) {
        self.tps_override = tps.map(|value| value.clamp(0.0, MAX_TPS));
    }

    pub fn tps_override(&self) -> Option<f64> {
        self.tps_override
    }

    pub fn measured_tps(&self) -> f64 {
        self.meter.average()
    }

    /// Run one simulation step: autonomous, unsuppressed living actors act,
    /// suppressions clear and the clock advances.
    pub fn advance(&mut self) {
        let now = Instant::now();
        if let Some(previous) = self.last_step.replace(now) {
            self.meter.record(now - previous);
        }

        let mut actors = self.world.query::<&mut Actor>();
        for mut actor in actors.iter_mut(&mut self.world) {
            if actor.autonomous && actor.is_living() && !actor.suppressed {
                actor.acted_steps += 1;
            }
            actor.suppressed = false;
        }
        self.world.resource_mut::<HostClock>().tick += 1;
    }

    /// Messages broadcast since the last drain, oldest first.
    pub fn drain_outbox(&mut self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.world.resource_mut::<Outbox>().0)
    }

    pub fn actor_count(&self, kind: ActorKind) -> usize {
        self.world
            .iter_entities()
            .filter_map(|entity| entity.get::<Actor>())
            .filter(|actor| actor.kind == kind)
            .count()
    }

    pub fn acted_steps(&self, id: ActorId) -> Option<u64> {
        self.component::<Actor>(id).map(|actor| actor.acted_steps)
    }

    pub fn propagation_limit(&self, region: &RegionKey) -> Option<u32> {
        self.world
            .resource::<PropagationLimits>()
            .0
            .get(region)
            .copied()
    }

    pub fn spawn_limits(&self, world: &WorldId) -> Option<SpawnLimits> {
        self.world
            .resource::<WorldSpawnLimits>()
            .0
            .get(world)
            .copied()
    }

    fn entity(&self, id: ActorId) -> Result<Entity, HostError> {
        self.index
            .get(&id)
            .copied()
            .filter(|entity| self.world.get_entity(*entity).is_some())
            .ok_or(HostError::ActorMissing(id))
    }

    fn component<T: Component>(&self, id: ActorId) -> Option<&T> {
        let entity = self.index.get(&id)?;
        self.world.get::<T>(*entity)
    }

    fn actor_mut(&mut self, id: ActorId, apply: impl FnOnce(&mut Actor)) -> Result<(), HostError> {
        let entity = self.entity(id)?;
        let mut actor = self
            .world
            .get_mut::<Actor>(entity)
            .ok_or(HostError::ActorMissing(id))?;
        apply(&mut actor);
        Ok(())
    }

    fn snapshots(&self, filter: impl Fn(&Placement) -> bool) -> Vec<ActorSnapshot> {
        let mut snapshots: Vec<ActorSnapshot> = self
            .world
            .iter_entities()
            .filter_map(|entity| {
                let actor = entity.get::<Actor>()?;
                let placement = entity.get::<Placement>()?;
                filter(placement).then(|| snapshot(actor, placement))
            })
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots
    }
}

fn snapshot(actor: &Actor, placement: &Placement) -> ActorSnapshot {
    ActorSnapshot {
        id: actor.id,
        region: placement.region_key(),
        kind: actor.kind,
        type_name: actor.type_name.clone(),
        created_at: actor.created_at,
        passengers: actor.passengers,
        living: actor.is_living(),
        autonomous: actor.autonomous,
    }
}

impl PerformanceSignal for HeadlessHost {
    fn tps(&self) -> f64 {
        self.tps_override.unwrap_or_else(|| self.meter.average())
    }

    fn tps_windows(&self) -> [f64; 3] {
        match self.tps_override {
            Some(tps) => [tps; 3],
            None => self.meter.averages(),
        }
    }

    fn current_tick(&self) -> u64 {
        self.world.resource::<HostClock>().tick
    }
}

impl WorldAccess for HeadlessHost {
    fn worlds(&self) -> Vec<WorldId> {
        self.world
            .resource::<LoadedRegions>()
            .0
            .keys()
            .cloned()
            .collect()
    }

    fn loaded_regions(&self, world: &WorldId) -> Vec<RegionPos> {
        self.world
            .resource::<LoadedRegions>()
            .0
            .get(world)
            .map(|regions| regions.iter().copied().collect())
            .unwrap_or_default()
    }

    fn observers(&self) -> Vec<ObserverInfo> {
        let mut observers: Vec<ObserverInfo> = self
            .world
            .iter_entities()
            .filter_map(|entity| {
                let actor = entity.get::<Actor>()?;
                let placement = entity.get::<Placement>()?;
                let session = entity.get::<Session>()?;
                Some(ObserverInfo {
                    actor: actor.id,
                    name: session.name.clone(),
                    world: placement.world.clone(),
                    region: placement.region(),
                    privileges: session.privileges,
                })
            })
            .collect();
        observers.sort_by_key(|observer| observer.actor);
        observers
    }

    fn actors(&self, world: &WorldId) -> Vec<ActorSnapshot> {
        self.snapshots(|placement| &placement.world == world)
    }

    fn actors_in_region(&self, region: &RegionKey) -> Vec<ActorSnapshot> {
        self.snapshots(|placement| {
            placement.world == region.world && placement.region() == region.pos
        })
    }

    fn actor(&self, id: ActorId) -> Option<ActorSnapshot> {
        let entity = self.index.get(&id)?;
        let actor = self.world.get::<Actor>(*entity)?;
        let placement = self.world.get::<Placement>(*entity)?;
        Some(snapshot(actor, placement))
    }

    fn remove_actor(&mut self, id: ActorId) -> Result<(), HostError> {
        let entity = self.entity(id)?;
        if self.world.get::<Session>(entity).is_some() {
            return Err(HostError::Rejected(id, "connected sessions cannot be removed"));
        }
        self.world.despawn(entity);
        self.index.remove(&id);
        Ok(())
    }

    fn set_autonomous(&mut self, id: ActorId, enabled: bool) -> Result<(), HostError> {
        let entity = self.entity(id)?;
        let mut actor = self
            .world
            .get_mut::<Actor>(entity)
            .ok_or(HostError::ActorMissing(id))?;
        if !actor.is_living() {
            return Err(HostError::Rejected(id, "only living actors have autonomous behaviour"));
        }
        actor.autonomous = enabled;
        Ok(())
    }

    fn suppress_step(&mut self, id: ActorId) -> Result<(), HostError> {
        self.actor_mut(id, |actor| actor.suppressed = true)
    }

    fn suppress_propagation(&mut self, region: &RegionKey, multiplier: u32) {
        self.world
            .resource_mut::<PropagationLimits>()
            .0
            .insert(region.clone(), multiplier);
    }

    fn set_spawn_limits(&mut self, world: &WorldId, limits: SpawnLimits) -> Result<(), HostError> {
        if !self.world.resource::<LoadedRegions>().0.contains_key(world) {
            return Err(HostError::WorldMissing(world.clone()));
        }
        self.world
            .resource_mut::<WorldSpawnLimits>()
            .0
            .insert(world.clone(), limits);
        Ok(())
    }
}

impl NotificationSink for HeadlessHost {
    fn broadcast(&mut self, audience: Audience, message: &str) -> Vec<ActorId> {
        let recipients: Vec<ActorId> = self
            .observers()
            .into_iter()
            .filter(|observer| audience.admits(observer.privileges))
            .map(|observer| observer.actor)
            .collect();
        let tick = self.current_tick();
        debug!(
            target: "tick_guard::server",
            recipients = recipients.len(),
            message,
            "broadcast.queued"
        );
        self.world.resource_mut::<Outbox>().0.push(OutboundMessage {
            tick,
            recipients: recipients.clone(),
            text: message.to_string(),
        });
        recipients
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overworld() -> WorldId {
        WorldId::new("world")
    }

    #[test]
    fn spawned_actors_load_their_region_and_snapshot_cleanly() {
        let mut host = HeadlessHost::new();
        let id = host.spawn_actor(ActorKind::Vehicle, &overworld(), 40.0, -3.0);
        host.set_passengers(id, 2).expect("vehicle exists");

        assert_eq!(host.loaded_regions(&overworld()), vec![RegionPos::new(2, -1)]);
        let snapshot = host.actor(id).expect("snapshot");
        assert_eq!(snapshot.passengers, 2);
        assert_eq!(snapshot.type_name, "MINECART");
        assert!(!snapshot.living);
    }

    #[test]
    fn sessions_are_observers_and_cannot_be_removed() {
        let mut host = HeadlessHost::new();
        let alex = host.spawn_player("alex", &overworld(), 0.0, 0.0, Privileges::ADMIN);
        host.spawn_actor(ActorKind::Creature, &overworld(), 5.0, 5.0);

        let observers = host.observers();
        assert_eq!(observers.len(), 1);
        assert_eq!(observers[0].name, "alex");
        assert!(matches!(
            host.remove_actor(alex),
            Err(HostError::Rejected(..))
        ));
    }

    #[test]
    fn suppressed_and_suspended_actors_do_not_act() {
        let mut host = HeadlessHost::new();
        let busy = host.spawn_actor(ActorKind::Creature, &overworld(), 0.0, 0.0);
        let held = host.spawn_actor(ActorKind::Creature, &overworld(), 0.0, 0.0);
        let parked = host.spawn_actor(ActorKind::Creature, &overworld(), 0.0, 0.0);
        host.set_autonomous(parked, false).expect("living");

        host.suppress_step(held).expect("exists");
        host.advance();
        host.advance();

        assert_eq!(host.acted_steps(busy), Some(2));
        assert_eq!(host.acted_steps(held), Some(1));
        assert_eq!(host.acted_steps(parked), Some(0));
        assert_eq!(host.current_tick(), 2);
    }

    #[test]
    fn removed_actor_reports_missing() {
        let mut host = HeadlessHost::new();
        let item = host.spawn_actor(ActorKind::GroundItem, &overworld(), 1.0, 1.0);
        host.remove_actor(item).expect("first removal");
        assert_eq!(host.remove_actor(item), Err(HostError::ActorMissing(item)));
        assert!(host.actor(item).is_none());
        assert!(host.set_autonomous(item, true).is_err());
    }

    #[test]
    fn broadcast_respects_audience_and_fills_outbox() {
        let mut host = HeadlessHost::new();
        let op = host.spawn_player("op", &overworld(), 0.0, 0.0, Privileges::OPERATOR);
        host.spawn_player("guest", &overworld(), 0.0, 0.0, Privileges::empty());

        let reached = host.broadcast(Audience::Privileged(Privileges::NOTICE_AUDIENCE), "hi");
        assert_eq!(reached, vec![op]);
        assert_eq!(host.broadcast(Audience::Everyone, "all").len(), 2);
        let outbox = host.drain_outbox();
        assert_eq!(outbox.len(), 2);
        assert!(host.drain_outbox().is_empty());
    }

    #[test]
    fn tps_override_wins_over_measurement() {
        let mut host = HeadlessHost::new();
        assert_eq!(host.tps(), MAX_TPS);
        host.set_tps_override(Some(12.5));
        assert_eq!(host.tps(), 12.5);
        host.set_tps_override(Some(99.0));
        assert_eq!(host.tps(), MAX_TPS);
        host.set_tps_override(None);
        assert_eq!(host.tps(), host.measured_tps());
    }

    #[test]
    fn meter_smooths_toward_slow_steps() {
        let mut meter = TpsMeter::default();
        for _ in 0..2400 {
            meter.record(Duration::from_millis(100));
        }
        assert!(meter.average() < 11.0);
        assert!(meter.average() > 10.0);
        let [one, five, fifteen] = meter.averages();
        assert_eq!(one, meter.average());
        assert!(one < five && five < fifteen && fifteen < MAX_TPS);
    }

    #[test]
    fn override_pins_every_window() {
        let mut host = HeadlessHost::new();
        host.set_tps_override(Some(14.0));
        assert_eq!(host.tps_windows(), [14.0; 3]);
    }

    #[test]
    fn spawn_limits_apply_only_to_known_worlds() {
        let mut host = HeadlessHost::new();
        host.load_region(&overworld(), RegionPos::new(0, 0));
        let limits = SpawnLimits {
            monsters: 10,
            ..SpawnLimits::default()
        };

        host.set_spawn_limits(&overworld(), limits).expect("world loaded");
        assert_eq!(host.spawn_limits(&overworld()), Some(limits));
        let nether = WorldId::new("nether");
        assert_eq!(
            host.set_spawn_limits(&nether, limits),
            Err(HostError::WorldMissing(nether.clone()))
        );
        assert_eq!(host.spawn_limits(&nether), None);
    }
}
