//! Fixture builders for tests and benchmarks. Every call builds fresh values.
use allocation_common::{Instance, InstanceHistoryEntry, InstanceStatus, Machine, Provider, Size};
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::rules::Rule;

pub fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid fixture date {year}-{month}-{day}T{hour}"))
}

pub fn openstack() -> Provider {
    Provider::new("iPlant Cloud - Tucson", "4")
}

pub fn openstack_workshop() -> Provider {
    Provider::new("iPlant Cloud Workshop - Tucson", "5")
}

pub fn random_machine() -> Machine {
    Machine::new("Not real machine", "12412515-1241-3fc8-bc13-10b03d616c54")
}

fn size(name: &str, identifier: &str, cpu: i64, ram: i64, disk: i64) -> Size {
    Size {
        name: name.to_string(),
        identifier: identifier.to_string(),
        cpu,
        ram,
        disk,
    }
}

pub fn tiny_size() -> Size {
    size("Kids Fry", "test.tiny", 1, 1024 * 2, 0)
}

pub fn small_size() -> Size {
    size("Small Fry", "test.small", 2, 1024 * 8, 60)
}

pub fn medium_size() -> Size {
    size("Medium Fry", "test.medium", 4, 1024 * 16, 120)
}

pub fn large_size() -> Size {
    size("Large Fry", "test.large", 8, 1024 * 32, 240)
}

pub fn multiply_by_cpu() -> Rule {
    Rule::multiply_by_cpu("Multiply TimeUsed by CPU", 1.0)
}

pub fn multiply_by_ram() -> Rule {
    Rule::multiply_by_ram("Multiply TimeUsed by Ram (*1GB)", 1.0)
}

pub fn ignore_suspended() -> Rule {
    Rule::ignore_status("Ignore Suspended Instances", "suspended")
}

pub fn ignore_build() -> Rule {
    Rule::ignore_status("Ignore 'Build' Instances", "build")
}

pub fn instance_with_history(identifier: &str, history: Vec<InstanceHistoryEntry>) -> Instance {
    Instance {
        identifier: identifier.to_string(),
        provider: openstack(),
        machine: random_machine(),
        history,
    }
}

/// Alternates active/suspended every `swap` starting active at `start`. An
/// entry is emitted while its end is before `stop`.
pub fn alternating_history(
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
    swap: Duration,
    size: Size,
) -> Vec<InstanceHistoryEntry> {
    let mut history = Vec::new();
    let mut entry_start = start;
    let mut active = true;
    while entry_start + swap < stop {
        history.push(InstanceHistoryEntry {
            status: InstanceStatus::from(if active { "active" } else { "suspended" }),
            size: size.clone(),
            start_date: entry_start,
            end_date: Some(entry_start + swap),
        });
        active = !active;
        entry_start += swap;
    }
    history
}
