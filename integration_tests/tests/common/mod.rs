use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use core_guard::{
    strip_color, ActorKind, GuardConfig, HeadlessRuntime, Privileges, WorldId,
};

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("guard_config_test.json")
}

pub fn test_config() -> Result<Arc<GuardConfig>> {
    let path = fixture_path();
    let config = GuardConfig::from_file(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    Ok(Arc::new(config))
}

/// Runtime on the fixture config with one operator, one guest and a small
/// mixed population next to them.
pub fn populated_runtime() -> Result<HeadlessRuntime> {
    let world = WorldId::new("world");
    let mut runtime = HeadlessRuntime::new(test_config()?).with_config_path(fixture_path());
    let host = runtime.host_mut();
    host.spawn_player("op", &world, 0.0, 0.0, Privileges::OPERATOR);
    host.spawn_player("guest", &world, 20.0, 0.0, Privileges::empty());
    for kind in [
        ActorKind::GroundItem,
        ActorKind::GroundItem,
        ActorKind::Vehicle,
        ActorKind::ExperienceOrb,
        ActorKind::Creature,
        ActorKind::Other,
    ] {
        host.spawn_actor(kind, &world, 6.0, 6.0);
    }
    Ok(runtime)
}

pub fn drain_texts(runtime: &mut HeadlessRuntime) -> Vec<String> {
    runtime
        .host_mut()
        .drain_outbox()
        .into_iter()
        .map(|message| strip_color(&message.text))
        .collect()
}
