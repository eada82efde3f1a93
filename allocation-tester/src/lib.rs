//! Shared setup for the end-to-end allocation scenarios.

use allocation_common::{CreditEvent, TimeUnit};
use allocation_engine::test_utils::{
    alternating_history, ignore_build, ignore_suspended, instance_with_history, medium_size,
    multiply_by_cpu, utc,
};
use allocation_engine::{AllocationRequest, Rule};
use chrono::Duration;
use tracing_subscriber::EnvFilter;

pub const TEST_INSTANCE_ID: &str = "TestInst-ance-1_____________________";

pub fn init_tracing() {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Five month window (2014-07-01 to 2014-12-01) over one 4-cpu instance that
/// swaps between active and suspended every 3 days from 2014-07-04T12:00,
/// with a one-time credit of 10,000 hours.
pub fn alternating_usage_request() -> AllocationRequest {
    let history_start = utc(2014, 7, 4, 12);
    let instance = instance_with_history(
        TEST_INSTANCE_ID,
        alternating_history(history_start, utc(2014, 12, 4, 12), Duration::days(3), medium_size()),
    );
    let credit = CreditEvent::AllocationIncrease {
        name: "Add 10,000 Hours".to_string(),
        amount: 10_000.0,
        unit: TimeUnit::Hour,
        increase_date: history_start,
    };

    AllocationRequest::new(utc(2014, 7, 1, 0), utc(2014, 12, 1, 0))
        .with_rules(vec![multiply_by_cpu(), ignore_suspended(), ignore_build()])
        .with_credits(vec![credit])
        .with_instances(vec![instance])
}

/// Same usage re-evaluated every 21 days, with carry-forward ahead of the ignore rules.
pub fn interval_carry_forward_request() -> AllocationRequest {
    alternating_usage_request()
        .with_rules(vec![
            multiply_by_cpu(),
            Rule::carry_forward(),
            ignore_suspended(),
            ignore_build(),
        ])
        .with_interval(Duration::days(21))
}
