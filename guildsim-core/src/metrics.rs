use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Accumulated timing metrics for simulation performance.
#[derive(Default, Clone, Debug, Serialize, Deserialize)]
pub struct SimMetrics {
    pub total_ticks: u64,
    pub total_time: Duration,
    pub generation_time: Duration,
    pub upkeep_time: Duration,
    pub transit_time: Duration,
    pub tribute_time: Duration,
    pub route_time: Duration,
    /// Tick digests discarded because a subscriber queue was full.
    pub broadcast_drops: u64,
}

impl SimMetrics {
    pub fn tick_avg_ms(&self) -> f64 {
        if self.total_ticks == 0 {
            0.0
        } else {
            self.total_time.as_secs_f64() * 1000.0 / self.total_ticks as f64
        }
    }
}

/// On-demand engine statistics: the metrics plus derived rates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineStats {
    pub current_tick: u64,
    pub halted: bool,
    pub tick_rate: f64,
    /// Moving-average achieved ticks per second.
    pub actual_tps: f64,
    pub last_tick_ms: f64,
    pub broadcast_drops: u64,
    /// Set when the engine stopped on an unrecoverable error.
    pub fatal: Option<String>,
}
