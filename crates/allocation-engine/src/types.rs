use allocation_common::TimeUnit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Usage and balance types. Every quantity is in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,

    // Totals
    pub total_used: f64,
    pub total_available: f64,
    pub remaining: f64,

    // Breakdown
    pub intervals: Vec<IntervalResult>,
    pub instances: Vec<InstanceUsage>,
    pub providers: Vec<ProviderUsage>,
    pub machines: Vec<MachineUsage>,
}

impl AllocationResult {
    /// More time was used than granted. A normal outcome, not an error.
    pub fn is_over_allocation(&self) -> bool {
        self.remaining < 0.0
    }

    pub fn total_used_in(&self, unit: TimeUnit) -> f64 {
        unit.from_seconds(self.total_used)
    }

    pub fn remaining_in(&self, unit: TimeUnit) -> f64 {
        unit.from_seconds(self.remaining)
    }

    /// Remaining balance of each sub-window, in order.
    pub fn interval_balances(&self) -> Vec<f64> {
        self.intervals.iter().map(|i| i.remaining).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalResult {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

    /// Usage after aggregate rules.
    pub time_used: f64,
    /// Amount netted against credit; differs from `time_used` once a balance is carried in.
    pub charged: f64,
    pub granted: f64,
    /// Unused balance dropped at recharge occurrences inside the sub-window.
    pub forfeited: f64,
    pub carried_in: f64,
    pub recharged: bool,
    /// Balance at the end of the sub-window. `granted - charged` until a
    /// recharge occurs; after one, only what followed the last occurrence.
    pub remaining: f64,

    /// Per-instance usage before aggregate rules.
    pub instances: Vec<InstanceUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceUsage {
    pub instance_id: String,
    pub provider_id: String,
    pub machine_id: String,
    pub time_used: f64,
    /// Clipped history entries that were counted; an entry spanning two sub-windows counts twice.
    pub counted_segments: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub provider_id: String,
    pub name: String,
    pub instance_count: usize,
    pub time_used: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineUsage {
    pub machine_id: String,
    pub name: String,
    pub instance_count: usize,
    pub time_used: f64,
}
