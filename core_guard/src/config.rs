use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::host::{SpawnLimits, TICKS_PER_SECOND};

pub const BUILTIN_GUARD_CONFIG: &str = include_str!("data/guard_config.json");

/// Every tunable consumed by the control loops.
///
/// Missing keys always fall back to the defaults below; a partial document is
/// never an error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    language: String,
    mode: ConfigMode,
    lazy_chunks: LazyChunksConfig,
    emergency: EmergencyConfig,
    cleanup: CleanupConfig,
    server_properties: ServerPropertiesConfig,
    server_files: ServerFilesConfig,
    monitor: MonitorConfig,
}

impl GuardConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_GUARD_CONFIG).expect("builtin guard config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, GuardConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| GuardConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config = GuardConfig::from_json_str(&contents)?;
        Ok(config)
    }

    /// Requested message language; empty means the catalog default.
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn mode(&self) -> ConfigMode {
        self.mode
    }

    pub fn lazy_chunks(&self) -> &LazyChunksConfig {
        &self.lazy_chunks
    }

    pub fn emergency(&self) -> &EmergencyConfig {
        &self.emergency
    }

    pub fn cleanup(&self) -> &CleanupConfig {
        &self.cleanup
    }

    pub fn server_properties(&self) -> &ServerPropertiesConfig {
        &self.server_properties
    }

    pub fn server_files(&self) -> &ServerFilesConfig {
        &self.server_files
    }

    pub fn monitor(&self) -> &MonitorConfig {
        &self.monitor
    }

    pub fn set_mode(&mut self, mode: ConfigMode) {
        self.mode = mode;
    }

    pub fn lazy_chunks_mut(&mut self) -> &mut LazyChunksConfig {
        &mut self.lazy_chunks
    }

    pub fn emergency_mut(&mut self) -> &mut EmergencyConfig {
        &mut self.emergency
    }

    pub fn cleanup_mut(&mut self) -> &mut CleanupConfig {
        &mut self.cleanup
    }

    pub fn server_files_mut(&mut self) -> &mut ServerFilesConfig {
        &mut self.server_files
    }

    pub fn monitor_mut(&mut self) -> &mut MonitorConfig {
        &mut self.monitor
    }
}

/// Simple mode tunes `server.properties`, `spigot.yml` and `bukkit.yml`.
/// Advanced mode also rewrites the paper world defaults and pushes spawn
/// limits into every loaded world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigMode {
    #[default]
    Simple,
    Advanced,
}

impl ConfigMode {
    pub fn is_advanced(self) -> bool {
        matches!(self, ConfigMode::Advanced)
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfigMode::Simple => "Simple",
            ConfigMode::Advanced => "Advanced",
        }
    }
}

#[derive(Debug, Error)]
pub enum GuardConfigError {
    #[error("failed to parse guard config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read guard config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Region throttling parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LazyChunksConfig {
    pub enabled: bool,
    /// Regions within this many regions of an observer tick at full rate.
    pub distance: u32,
    pub min_distance: u32,
    pub adaptive: bool,
    pub adaptive_tps_threshold: f64,
    pub logging: bool,
}

impl Default for LazyChunksConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            distance: 4,
            min_distance: 2,
            adaptive: true,
            adaptive_tps_threshold: 18.0,
            logging: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    pub tps_threshold: f64,
    pub kill_non_player_entities: bool,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            tps_threshold: 15.0,
            kill_non_player_entities: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub adaptive_clearing: bool,
    pub adaptive_tps_threshold: f64,
    pub countdown_enabled: bool,
    pub countdown_seconds: u32,
    pub adaptive_interval_seconds: u32,
    pub interval_seconds: u32,
    pub min_item_age_seconds: u32,
    pub remove_ground_items: bool,
    pub remove_inactive_vehicles: bool,
    pub remove_experience_orbs: bool,
    /// Broadcast countdowns to everyone instead of privileged sessions only.
    pub notify_all_players: bool,
}

impl CleanupConfig {
    pub fn countdown_ticks(&self) -> u64 {
        u64::from(self.countdown_seconds) * TICKS_PER_SECOND
    }

    pub fn adaptive_interval_ticks(&self) -> u64 {
        u64::from(self.adaptive_interval_seconds.max(1)) * TICKS_PER_SECOND
    }

    pub fn interval_ticks(&self) -> u64 {
        u64::from(self.interval_seconds.max(1)) * TICKS_PER_SECOND
    }

    pub fn min_age_ticks(&self) -> u64 {
        u64::from(self.min_item_age_seconds) * TICKS_PER_SECOND
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            adaptive_clearing: true,
            adaptive_tps_threshold: 17.0,
            countdown_enabled: true,
            countdown_seconds: 60,
            adaptive_interval_seconds: 30,
            interval_seconds: 300,
            min_item_age_seconds: 30,
            remove_ground_items: true,
            remove_inactive_vehicles: true,
            remove_experience_orbs: true,
            notify_all_players: true,
        }
    }
}

/// Target values written into `server.properties`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerPropertiesConfig {
    pub view_distance: i64,
    pub simulation_distance: i64,
    pub network_compression_threshold: i64,
    pub max_players: i64,
}

impl Default for ServerPropertiesConfig {
    fn default() -> Self {
        Self {
            view_distance: 8,
            simulation_distance: 6,
            network_compression_threshold: 256,
            max_players: 20,
        }
    }
}

/// Targets for the YAML server files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerFilesConfig {
    pub tracking_range: TrackingRangeConfig,
    pub mob_spawn_range: u32,
    pub spawn_limits: SpawnLimits,
    pub chunk_gc_period_ticks: u32,
    pub activation_range: ActivationRangeConfig,
    pub despawn_ranges: DespawnRangesConfig,
    pub redstone: RedstoneConfig,
}

impl Default for ServerFilesConfig {
    fn default() -> Self {
        Self {
            tracking_range: TrackingRangeConfig::default(),
            mob_spawn_range: 6,
            spawn_limits: SpawnLimits::default(),
            chunk_gc_period_ticks: 600,
            activation_range: ActivationRangeConfig::default(),
            despawn_ranges: DespawnRangesConfig::default(),
            redstone: RedstoneConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TrackingRangeConfig {
    pub players: u32,
    pub animals: u32,
    pub monsters: u32,
    pub misc: u32,
}

impl Default for TrackingRangeConfig {
    fn default() -> Self {
        Self {
            players: 48,
            animals: 32,
            monsters: 32,
            misc: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ActivationRangeConfig {
    pub animals: u32,
    pub monsters: u32,
    pub misc: u32,
    pub tick_inactive_villagers: bool,
}

impl Default for ActivationRangeConfig {
    fn default() -> Self {
        Self {
            animals: 20,
            monsters: 24,
            misc: 8,
            tick_inactive_villagers: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct DespawnRangesConfig {
    pub soft: u32,
    pub hard: u32,
}

impl Default for DespawnRangesConfig {
    fn default() -> Self {
        Self { soft: 32, hard: 128 }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct RedstoneConfig {
    pub disable_falling_dust: bool,
    pub disable_item_frame_glow: bool,
}

/// Configuration drift monitoring.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub check_interval_seconds: u32,
    pub reminder_interval_seconds: u32,
    pub max_reminders: u32,
    /// Paths relative to the server root.
    pub files: Vec<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: 60,
            reminder_interval_seconds: 10,
            max_reminders: 30,
            files: vec![
                PathBuf::from("server.properties"),
                PathBuf::from("bukkit.yml"),
                PathBuf::from("spigot.yml"),
                PathBuf::from("config/paper-world-defaults.yml"),
                PathBuf::from("guard_config.json"),
            ],
        }
    }
}

/// Shared handle to the active configuration; swapped wholesale on reload.
#[derive(Debug, Clone)]
pub struct GuardConfigHandle(pub Arc<GuardConfig>);

impl GuardConfigHandle {
    pub fn new(config: Arc<GuardConfig>) -> Self {
        Self(config)
    }

    pub fn get(&self) -> Arc<GuardConfig> {
        Arc::clone(&self.0)
    }

    pub fn config(&self) -> &GuardConfig {
        &self.0
    }

    pub fn replace(&mut self, config: Arc<GuardConfig>) {
        self.0 = config;
    }
}

#[derive(Debug, Clone, Default)]
pub struct GuardConfigMetadata {
    path: Option<PathBuf>,
}

impl GuardConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

/// Load from `GUARD_CONFIG_PATH` when set, otherwise use the builtin document.
pub fn load_guard_config_from_env() -> (Arc<GuardConfig>, GuardConfigMetadata) {
    let override_path = env::var("GUARD_CONFIG_PATH").ok().map(PathBuf::from);
    load_guard_config(override_path.as_deref())
}

pub fn load_guard_config(path: Option<&Path>) -> (Arc<GuardConfig>, GuardConfigMetadata) {
    if let Some(path) = path {
        match GuardConfig::from_file(path) {
            Ok(config) => {
                tracing::info!(
                    target: "tick_guard::config",
                    path = %path.display(),
                    "guard_config.loaded=file"
                );
                return (
                    Arc::new(config),
                    GuardConfigMetadata::new(Some(path.to_path_buf())),
                );
            }
            Err(err) => {
                tracing::warn!(
                    target: "tick_guard::config",
                    path = %path.display(),
                    error = %err,
                    "guard_config.load_failed"
                );
            }
        }
    }

    let config = GuardConfig::builtin();
    tracing::info!(target: "tick_guard::config", "guard_config.loaded=builtin");
    (config, GuardConfigMetadata::new(None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_parses() {
        let config = GuardConfig::builtin();
        assert_eq!(config.language(), "en");
        assert_eq!(config.cleanup().countdown_seconds, 60);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let config = GuardConfig::from_json_str(r#"{ "cleanup": { "enabled": true } }"#)
            .expect("partial config parses");
        assert!(config.cleanup().enabled);
        assert!(config.cleanup().adaptive_clearing);
        assert_eq!(config.cleanup().adaptive_tps_threshold, 17.0);
        assert_eq!(config.emergency().tps_threshold, 15.0);
        assert_eq!(config.lazy_chunks().distance, 4);
        assert_eq!(config.monitor().max_reminders, 30);
        assert_eq!(config.mode(), ConfigMode::Simple);
        assert_eq!(config.server_files().mob_spawn_range, 6);
        assert_eq!(config.server_files().chunk_gc_period_ticks, 600);
        assert_eq!(config.server_files().spawn_limits.monsters, 30);
    }

    #[test]
    fn advanced_mode_and_partial_server_files_parse() {
        let config = GuardConfig::from_json_str(
            r#"{ "mode": "advanced", "server_files": { "spawn_limits": { "monsters": 12 } } }"#,
        )
        .expect("advanced config parses");
        assert!(config.mode().is_advanced());
        assert_eq!(config.mode().label(), "Advanced");
        let files = config.server_files();
        assert_eq!(files.spawn_limits.monsters, 12);
        assert_eq!(files.spawn_limits.animals, 15);
        assert_eq!(files.mob_spawn_range, 6);
        assert_eq!(files.tracking_range.players, 48);
        assert_eq!(files.despawn_ranges.hard, 128);
    }

    #[test]
    fn tick_conversions_use_twenty_steps_per_second() {
        let cleanup = CleanupConfig::default();
        assert_eq!(cleanup.countdown_ticks(), 1200);
        assert_eq!(cleanup.adaptive_interval_ticks(), 600);
        assert_eq!(cleanup.min_age_ticks(), 600);
        assert_eq!(cleanup.interval_ticks(), 6000);
    }

    #[test]
    fn unreadable_override_falls_back_to_builtin() {
        let (config, metadata) = load_guard_config(Some(Path::new("/nonexistent/guard.json")));
        assert!(metadata.path().is_none());
        assert_eq!(config.emergency().tps_threshold, 15.0);
    }
}
