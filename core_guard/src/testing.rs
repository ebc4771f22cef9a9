//! In-memory host used by unit tests.

use std::collections::BTreeMap;

use crate::host::{
    ActorId, ActorKind, ActorSnapshot, Audience, HostError, NotificationSink, ObserverInfo,
    PerformanceSignal, Privileges, RegionKey, RegionPos, SpawnLimits, WorldAccess, WorldId,
};

#[derive(Debug, Default)]
pub(crate) struct RecordingHost {
    pub tick: u64,
    pub tps: f64,
    pub regions: BTreeMap<WorldId, Vec<RegionPos>>,
    pub observers: Vec<ObserverInfo>,
    pub actors: BTreeMap<ActorId, ActorSnapshot>,
    pub broadcasts: Vec<(Audience, String)>,
    pub suppressed_steps: Vec<(u64, ActorId)>,
    pub propagation: Vec<(RegionKey, u32)>,
    pub autonomy_log: Vec<(u64, ActorId, bool)>,
    pub spawn_limits: BTreeMap<WorldId, SpawnLimits>,
    next_id: u64,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self {
            tps: 20.0,
            ..Self::default()
        }
    }

    pub fn world() -> WorldId {
        WorldId::new("world")
    }

    pub fn add_region(&mut self, world: &WorldId, x: i32, z: i32) {
        let regions = self.regions.entry(world.clone()).or_default();
        let pos = RegionPos::new(x, z);
        if !regions.contains(&pos) {
            regions.push(pos);
        }
    }

    pub fn add_observer(&mut self, name: &str, world: &WorldId, x: i32, z: i32) -> ActorId {
        self.add_observer_with(name, world, x, z, Privileges::empty())
    }

    pub fn add_observer_with(
        &mut self,
        name: &str,
        world: &WorldId,
        x: i32,
        z: i32,
        privileges: Privileges,
    ) -> ActorId {
        let id = self.add_actor(ActorKind::Player, world, x, z, 0);
        self.observers.push(ObserverInfo {
            actor: id,
            name: name.to_string(),
            world: world.clone(),
            region: RegionPos::new(x, z),
            privileges,
        });
        id
    }

    pub fn add_actor(
        &mut self,
        kind: ActorKind,
        world: &WorldId,
        x: i32,
        z: i32,
        created_at: u64,
    ) -> ActorId {
        self.next_id += 1;
        let id = ActorId(self.next_id);
        self.add_region(world, x, z);
        let type_name = match kind {
            ActorKind::Player => "PLAYER",
            ActorKind::GroundItem => "DROPPED_ITEM",
            ActorKind::Vehicle => "MINECART",
            ActorKind::ExperienceOrb => "EXPERIENCE_ORB",
            ActorKind::Creature => "ZOMBIE",
            ActorKind::Other => "ARMOR_STAND",
        };
        self.actors.insert(
            id,
            ActorSnapshot {
                id,
                region: RegionKey::new(world.clone(), RegionPos::new(x, z)),
                kind,
                type_name: type_name.to_string(),
                created_at,
                passengers: 0,
                living: matches!(kind, ActorKind::Creature | ActorKind::Player),
                autonomous: matches!(kind, ActorKind::Creature),
            },
        );
        id
    }

    pub fn messages(&self) -> Vec<String> {
        self.broadcasts.iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn count_of(&self, kind: ActorKind) -> usize {
        self.actors.values().filter(|a| a.kind == kind).count()
    }
}

impl PerformanceSignal for RecordingHost {
    fn tps(&self) -> f64 {
        self.tps
    }

    fn current_tick(&self) -> u64 {
        self.tick
    }
}

impl WorldAccess for RecordingHost {
    fn worlds(&self) -> Vec<WorldId> {
        self.regions.keys().cloned().collect()
    }

    fn loaded_regions(&self, world: &WorldId) -> Vec<RegionPos> {
        self.regions.get(world).cloned().unwrap_or_default()
    }

    fn observers(&self) -> Vec<ObserverInfo> {
        self.observers.clone()
    }

    fn actors(&self, world: &WorldId) -> Vec<ActorSnapshot> {
        self.actors
            .values()
            .filter(|a| &a.region.world == world)
            .cloned()
            .collect()
    }

    fn actors_in_region(&self, region: &RegionKey) -> Vec<ActorSnapshot> {
        self.actors
            .values()
            .filter(|a| &a.region == region)
            .cloned()
            .collect()
    }

    fn actor(&self, id: ActorId) -> Option<ActorSnapshot> {
        self.actors.get(&id).cloned()
    }

    fn remove_actor(&mut self, id: ActorId) -> Result<(), HostError> {
        self.actors
            .remove(&id)
            .map(|_| ())
            .ok_or(HostError::ActorMissing(id))
    }

    fn set_autonomous(&mut self, id: ActorId, enabled: bool) -> Result<(), HostError> {
        let actor = self.actors.get_mut(&id).ok_or(HostError::ActorMissing(id))?;
        actor.autonomous = enabled;
        self.autonomy_log.push((self.tick, id, enabled));
        Ok(())
    }

    fn suppress_step(&mut self, id: ActorId) -> Result<(), HostError> {
        if !self.actors.contains_key(&id) {
            return Err(HostError::ActorMissing(id));
        }
        self.suppressed_steps.push((self.tick, id));
        Ok(())
    }

    fn suppress_propagation(&mut self, region: &RegionKey, multiplier: u32) {
        self.propagation.push((region.clone(), multiplier));
    }

    fn set_spawn_limits(&mut self, world: &WorldId, limits: SpawnLimits) -> Result<(), HostError> {
        if !self.regions.contains_key(world) {
            return Err(HostError::WorldMissing(world.clone()));
        }
        self.spawn_limits.insert(world.clone(), limits);
        Ok(())
    }
}

impl NotificationSink for RecordingHost {
    fn broadcast(&mut self, audience: Audience, message: &str) -> Vec<ActorId> {
        self.broadcasts.push((audience, message.to_string()));
        self.observers
            .iter()
            .filter(|o| audience.admits(o.privileges))
            .map(|o| o.actor)
            .collect()
    }
}
