use serde::Serialize;

use crate::config::ConfigMode;
use crate::countdown::CountdownState;
use crate::orchestrator::LiveTimers;
use crate::throttle::ThrottleStats;

/// Point-in-time view of every control loop, backing `status`.
#[derive(Debug, Clone, Serialize)]
pub struct GuardStatus {
    pub tick: u64,
    pub tps: f64,
    /// One, five and fifteen minute averages.
    pub tps_windows: [f64; 3],
    pub config_mode: ConfigMode,
    pub adaptive_cleanup_running: bool,
    pub countdown: CountdownState,
    pub throttle: ThrottleStatus,
    pub config_drifted: bool,
    pub restart_required: bool,
    pub live_timers: LiveTimers,
}

impl GuardStatus {
    pub fn lines(&self) -> Vec<String> {
        let countdown = match self.countdown {
            CountdownState::Idle => "idle".to_string(),
            CountdownState::CountingDown { remaining } => format!("{remaining}s remaining"),
        };
        let [one, five, fifteen] = self.tps_windows;
        vec![
            "Performance status".to_string(),
            format!("TPS (1m/5m/15m): {one:.2}/{five:.2}/{fifteen:.2}"),
            format!("Config mode: {}", self.config_mode.label()),
            format!("Tick: {}", self.tick),
            format!(
                "Adaptive cleanup: {}",
                if self.adaptive_cleanup_running { "running" } else { "idle" }
            ),
            format!("Cleanup countdown: {countdown}"),
            format!(
                "Lazy chunks: {}",
                if self.throttle.active { "active" } else { "inactive" }
            ),
            format!(
                "Config drift: {}",
                if self.config_drifted { "detected" } else { "none" }
            ),
            format!(
                "Restart required: {}",
                if self.restart_required { "yes" } else { "no" }
            ),
        ]
    }
}

/// Throttle statistics plus the radius settings they were computed under.
#[derive(Debug, Clone, Serialize)]
pub struct ThrottleStatus {
    pub active: bool,
    pub distance: u32,
    pub min_distance: u32,
    pub adaptive: bool,
    pub stats: ThrottleStats,
    pub lazy_share_pct: f64,
    pub estimated_reduction_pct: f64,
}

impl ThrottleStatus {
    pub fn new(
        active: bool,
        distance: u32,
        min_distance: u32,
        adaptive: bool,
        stats: ThrottleStats,
    ) -> Self {
        Self {
            active,
            distance,
            min_distance,
            adaptive,
            stats,
            lazy_share_pct: stats.lazy_share_pct(),
            estimated_reduction_pct: stats.estimated_reduction_pct(),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        if !self.active {
            return vec![
                "Lazy chunks: inactive".to_string(),
                "Enable with lazy_chunks.enabled = true in the guard config".to_string(),
            ];
        }
        let mut lines = vec![
            "Lazy chunks: active".to_string(),
            format!("Full-rate radius: {} regions", self.distance),
            format!("Minimum radius: {} regions", self.min_distance),
            format!(
                "Adaptive mode: {}",
                if self.adaptive { "on" } else { "off" }
            ),
            format!("Tracked regions: {}", self.stats.tracked),
            format!("Lazy regions: {}", self.stats.lazy),
            format!("Lazy share: {:.1}%", self.lazy_share_pct),
            format!("Avg. multiplier: {:.1}x", self.stats.average_multiplier),
            format!("Current TPS: {:.1}", self.stats.tps),
        ];
        if self.stats.tracked > 0 && self.stats.average_multiplier > 1.0 {
            lines.push(format!(
                "Tick reduction: {:.1}%",
                self.estimated_reduction_pct
            ));
        }
        lines
    }
}
