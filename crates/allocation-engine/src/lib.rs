// Allocation Engine - batch accounting of instance usage against granted credit
mod calculator;
mod credit;
mod engine;
mod request;
mod rules;
mod storage;
mod types;

pub mod test_utils;
pub mod window;

pub use allocation_common as common;
pub use allocation_common::{AllocationError, Result, TimeUnit};
pub use calculator::{AllocationCalculator, AllocationPlan};
pub use credit::{CreditLedger, CreditSegment};
pub use engine::calculate_allocation;
pub use request::{AllocationOptions, AllocationRequest, PriorCreditPolicy};
pub use rules::{
    apply_aggregate_rules, apply_entry_rules, AggregateContext, IntervalTotal, Rule, RuleScope,
};
pub use storage::InMemorySnapshotStore;
pub use types::*;
pub use window::TimeWindow;
