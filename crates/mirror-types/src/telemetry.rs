use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySample {
    pub queued_ms: u64,
    pub delivery_ms: u64,
    pub total_ms: u64,
    pub captured_at: DateTime<Utc>,
}

/// Aggregated dispatch counters for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchMetrics {
    pub delivered: u64,
    pub dropped: u64,
    pub fallbacks: u64,
    pub recoveries: u64,
    pub last_latency: Option<LatencySample>,
}
