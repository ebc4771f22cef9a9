//! Adaptive throughput guard for a tick-driven multiplayer world server.
//!
//! Three recurring control loops watch the smoothed ticks-per-second sample
//! and respond to degradation: regions far from every observer are simulated
//! less often, loose actors are swept after a player-visible countdown when
//! throughput drops, and a critical drop triggers an emergency purge. The
//! [`ControlLoopOrchestrator`] owns every timer; the host calls
//! [`ControlLoopOrchestrator::tick`] once per simulation step.
//!
//! [`HeadlessHost`] is a reference host on a `bevy_ecs` world, and
//! [`HeadlessRuntime`] pairs it with an orchestrator for the `guard_server`
//! binary and the integration tests.

pub mod cleanup;
pub mod config;
pub mod context;
pub mod countdown;
pub mod drift;
pub mod emergency;
pub mod hashing;
#[cfg(feature = "headless")]
pub mod headless;
pub mod host;
pub mod messages;
pub mod metrics;
pub mod orchestrator;
#[cfg(feature = "headless")]
pub mod runtime;
pub mod scheduler;
pub mod throttle;
pub mod tuning;

#[cfg(test)]
mod testing;

pub use cleanup::{sweep, AdaptiveCleanupScheduler, SampleOutcome, SweepReport};
pub use config::{
    load_guard_config, load_guard_config_from_env, CleanupConfig, ConfigMode, EmergencyConfig,
    GuardConfig, GuardConfigError, GuardConfigHandle, GuardConfigMetadata, LazyChunksConfig,
    MonitorConfig, ServerFilesConfig, ServerPropertiesConfig,
};
pub use context::LoopContext;
pub use countdown::{CleanupCountdownController, CountdownProgress, CountdownState};
pub use drift::DriftMonitor;
pub use emergency::{EmergencyOutcome, PurgeReport};
#[cfg(feature = "headless")]
pub use headless::{HeadlessHost, OutboundMessage, TpsMeter};
pub use host::{
    ActorId, ActorKind, ActorSnapshot, Audience, HostError, NotificationSink, ObserverInfo,
    PerformanceSignal, Privileges, RegionKey, RegionPos, ServerHost, SpawnLimits, WorldAccess,
    WorldId, MAX_TPS, TICKS_PER_SECOND,
};
pub use messages::{strip_color, CatalogError, MessageCatalog};
pub use metrics::{GuardStatus, ThrottleStatus};
pub use orchestrator::{ControlLoopOrchestrator, LiveTimers, LoopKind, TickReport};
#[cfg(feature = "headless")]
pub use runtime::HeadlessRuntime;
pub use throttle::{tick_multiplier, ChunkThrottleEngine, ThrottleStats};
pub use tuning::{
    tune_server_files, tune_server_properties, tune_yaml_file, FileTuning, PropertyChange,
    ServerFilesReport, TuningError, TuningReport,
};

/// Runtime on the configuration named by `GUARD_CONFIG_PATH`, or the builtin
/// document, with its control loops already started.
#[cfg(feature = "headless")]
pub fn build_headless_runtime() -> HeadlessRuntime {
    let (config, metadata) = load_guard_config_from_env();
    let mut runtime = HeadlessRuntime::new(config);
    if let Some(path) = metadata.path() {
        runtime = runtime.with_config_path(path.clone());
    }
    if let Some(root) = std::env::var_os("GUARD_SERVER_ROOT") {
        runtime = runtime.with_server_root(root);
    }
    runtime.start();
    runtime
}
