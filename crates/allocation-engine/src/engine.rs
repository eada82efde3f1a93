use std::collections::BTreeMap;

use allocation_common::{Instance, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::credit::CreditLedger;
use crate::request::AllocationRequest;
use crate::rules::{apply_aggregate_rules, apply_entry_rules, carries_forward, AggregateContext, Rule};
use crate::types::{AllocationResult, InstanceUsage, IntervalResult, MachineUsage, ProviderUsage};
use crate::window::{clip, split, TimeWindow};

/// Computes usage against credit for `request`.
///
/// Configuration and snapshot errors are returned before anything is computed.
/// The request is only borrowed; identical requests give identical results.
#[instrument(
    skip(request),
    fields(
        instances = request.instances.len(),
        rules = request.rules.len(),
        credits = request.credits.len()
    )
)]
pub fn calculate_allocation(request: &AllocationRequest) -> Result<AllocationResult> {
    let window = request.validate()?;
    let evaluation_instant = request.evaluation_instant();
    let ledger = CreditLedger::new(&request.credits, window, request.options.prior_credit_policy);
    let carry_forward = carries_forward(&request.rules);

    // Without carry-forward every sub-window starts from a zero balance.
    let intervals: Vec<IntervalResult> = split(&window, request.interval_delta)
        .iter()
        .scan(0.0_f64, |carried_balance, interval| {
            let result = evaluate_interval(request, interval, evaluation_instant, &ledger, *carried_balance);
            *carried_balance = if carry_forward { result.remaining } else { 0.0 };
            Some(result)
        })
        .collect();

    let total_used: f64 = intervals.iter().map(|i| i.time_used).sum();
    let total_available: f64 = intervals.iter().map(|i| i.granted - i.forfeited).sum();
    let remaining = total_available - total_used;

    let instances = instance_totals(&request.instances, &intervals);
    let result = AllocationResult {
        window_start: window.start,
        window_end: window.end,
        total_used,
        total_available,
        remaining,
        providers: provider_totals(&request.instances, &instances),
        machines: machine_totals(&request.instances, &instances),
        instances,
        intervals,
    };

    info!(
        total_used,
        total_available,
        remaining,
        intervals = result.intervals.len(),
        over_allocation = result.is_over_allocation(),
        "Allocation calculated"
    );
    Ok(result)
}

fn evaluate_interval(
    request: &AllocationRequest,
    interval: &TimeWindow,
    evaluation_instant: DateTime<Utc>,
    ledger: &CreditLedger<'_>,
    carried_balance: f64,
) -> IntervalResult {
    let instances: Vec<InstanceUsage> = request
        .instances
        .iter()
        .map(|instance| instance_usage(instance, &request.rules, interval, evaluation_instant))
        .collect();
    let raw_used: f64 = instances.iter().map(|usage| usage.time_used).sum();

    let segments = ledger.segments(interval);
    let mut time_used = 0.0;
    let mut granted = 0.0;
    let mut charged = 0.0;
    let mut forfeited = 0.0_f64;
    let mut remaining = 0.0_f64;
    let mut carried_in = 0.0;
    for (idx, segment) in segments.iter().enumerate() {
        let used = if segments.len() == 1 {
            raw_used
        } else {
            segment_usage(request, &segment.window, evaluation_instant)
        };
        // Only the first segment can start off a recharge boundary.
        let context = AggregateContext {
            carried_balance: if segment.recharged { 0.0 } else { carried_balance },
        };
        let total = apply_aggregate_rules(&request.rules, used, &context);
        if idx == 0 {
            carried_in = total.carried_in.unwrap_or(0.0);
        }

        // Every segment after the first starts on a recharge, which drops the unused balance.
        forfeited += remaining.max(0.0);
        time_used += total.time_used;
        granted += segment.granted;
        charged += total.charged;
        remaining = segment.granted - total.charged;
    }
    let recharged = segments.iter().any(|segment| segment.recharged);

    debug!(
        start = %interval.start,
        end = %interval.end,
        raw_used,
        time_used,
        granted,
        forfeited,
        carried_in,
        segments = segments.len(),
        recharged,
        remaining,
        "Interval evaluated"
    );

    IntervalResult {
        start: interval.start,
        end: interval.end,
        time_used,
        charged,
        granted,
        forfeited,
        carried_in,
        recharged,
        remaining,
        instances,
    }
}

fn segment_usage(request: &AllocationRequest, segment: &TimeWindow, evaluation_instant: DateTime<Utc>) -> f64 {
    request
        .instances
        .iter()
        .map(|instance| instance_usage(instance, &request.rules, segment, evaluation_instant).time_used)
        .sum()
}

/// Usage of one instance inside `interval`. Entries are taken in the order given.
fn instance_usage(
    instance: &Instance,
    rules: &[Rule],
    interval: &TimeWindow,
    evaluation_instant: DateTime<Utc>,
) -> InstanceUsage {
    let (time_used, counted_segments) = instance
        .history
        .iter()
        .filter_map(|entry| {
            let overlap = clip(entry.start_date, entry.end_date, interval, evaluation_instant)?;
            apply_entry_rules(rules, overlap.elapsed_seconds(), entry)
        })
        .fold((0.0, 0), |(sum, count), used| (sum + used, count + 1));

    InstanceUsage {
        instance_id: instance.identifier.clone(),
        provider_id: instance.provider.identifier.clone(),
        machine_id: instance.machine.identifier.clone(),
        time_used,
        counted_segments,
    }
}

// Every interval lists the request's instances in the same order.
fn instance_totals(instances: &[Instance], intervals: &[IntervalResult]) -> Vec<InstanceUsage> {
    instances
        .iter()
        .enumerate()
        .map(|(idx, instance)| {
            let (time_used, counted_segments) = intervals
                .iter()
                .map(|interval| &interval.instances[idx])
                .fold((0.0, 0), |(sum, count), usage| {
                    (sum + usage.time_used, count + usage.counted_segments)
                });
            InstanceUsage {
                instance_id: instance.identifier.clone(),
                provider_id: instance.provider.identifier.clone(),
                machine_id: instance.machine.identifier.clone(),
                time_used,
                counted_segments,
            }
        })
        .collect()
}

fn provider_totals(instances: &[Instance], usage: &[InstanceUsage]) -> Vec<ProviderUsage> {
    let mut providers: BTreeMap<&str, ProviderUsage> = BTreeMap::new();
    for (instance, usage) in instances.iter().zip(usage) {
        let entry = providers
            .entry(instance.provider.identifier.as_str())
            .or_insert_with(|| ProviderUsage {
                provider_id: instance.provider.identifier.clone(),
                name: instance.provider.name.clone(),
                instance_count: 0,
                time_used: 0.0,
            });
        entry.instance_count += 1;
        entry.time_used += usage.time_used;
    }
    providers.into_values().collect()
}

fn machine_totals(instances: &[Instance], usage: &[InstanceUsage]) -> Vec<MachineUsage> {
    let mut machines: BTreeMap<&str, MachineUsage> = BTreeMap::new();
    for (instance, usage) in instances.iter().zip(usage) {
        let entry = machines
            .entry(instance.machine.identifier.as_str())
            .or_insert_with(|| MachineUsage {
                machine_id: instance.machine.identifier.clone(),
                name: instance.machine.name.clone(),
                instance_count: 0,
                time_used: 0.0,
            });
        entry.instance_count += 1;
        entry.time_used += usage.time_used;
    }
    machines.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{AllocationOptions, PriorCreditPolicy};
    use crate::test_utils::{instance_with_history, medium_size, tiny_size, utc};
    use allocation_common::{AllocationError, CreditEvent, InstanceHistoryEntry, TimeUnit};
    use chrono::Duration;

    fn entry(status: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> InstanceHistoryEntry {
        InstanceHistoryEntry::new(status, medium_size(), start, end).unwrap()
    }

    fn cpu_rules() -> Vec<Rule> {
        vec![
            Rule::multiply_by_cpu("Multiply TimeUsed by CPU", 1.0),
            Rule::ignore_status("Ignore Suspended Instances", "suspended"),
        ]
    }

    #[test]
    fn test_single_entry_inside_window() {
        let instance = instance_with_history(
            "inst-1",
            vec![entry("active", utc(2014, 7, 2, 0), Some(utc(2014, 7, 3, 0)))],
        );
        let request = AllocationRequest::new(utc(2014, 7, 1, 0), utc(2014, 8, 1, 0))
            .with_rules(cpu_rules())
            .with_instances(vec![instance]);

        let result = calculate_allocation(&request).unwrap();
        assert_eq!(result.total_used, 4.0 * 86_400.0);
        assert_eq!(result.total_available, 0.0);
        assert!(result.is_over_allocation());
        assert_eq!(result.instances[0].counted_segments, 1);
        assert_eq!(result.intervals.len(), 1);
    }

    #[test]
    fn test_open_entry_closed_at_evaluation_instant() {
        let instance =
            instance_with_history("inst-open", vec![entry("active", utc(2014, 7, 10, 0), None)]);
        let request = AllocationRequest::new(utc(2014, 7, 1, 0), utc(2014, 8, 1, 0))
            .with_rules(cpu_rules())
            .with_instances(vec![instance.clone()]);
        // Closed at the window end by default: 22 days.
        assert_eq!(calculate_allocation(&request).unwrap().total_used, 4.0 * 22.0 * 86_400.0);

        let request = request.with_options(AllocationOptions {
            evaluation_instant: Some(utc(2014, 7, 12, 0)),
            ..Default::default()
        });
        assert_eq!(calculate_allocation(&request).unwrap().total_used, 4.0 * 2.0 * 86_400.0);
    }

    #[test]
    fn test_validation_errors_fail_fast() {
        let mut instance = instance_with_history(
            "inst-bad",
            vec![entry("active", utc(2014, 7, 2, 0), Some(utc(2014, 7, 3, 0)))],
        );
        instance.history[0].size.cpu = -4;
        let request = AllocationRequest::new(utc(2014, 7, 1, 0), utc(2014, 8, 1, 0))
            .with_rules(cpu_rules())
            .with_instances(vec![instance]);
        assert!(matches!(calculate_allocation(&request), Err(AllocationError::Validation(_))));
    }

    #[test]
    fn test_recharge_resets_carried_balance() {
        let instance = instance_with_history(
            "inst-1",
            vec![entry("active", utc(2014, 7, 1, 0), Some(utc(2014, 7, 2, 0)))],
        );
        let credits = vec![
            CreditEvent::increase("Bonus", 10.0, TimeUnit::Day, utc(2014, 7, 1, 0)).unwrap(),
            CreditEvent::recharge("Biweekly", 2.0, TimeUnit::Day, utc(2014, 7, 15, 0), None).unwrap(),
        ];
        let request = AllocationRequest::new(utc(2014, 7, 1, 0), utc(2014, 7, 29, 0))
            .with_rules(vec![Rule::carry_forward(), Rule::multiply_by_cpu("cpu", 1.0)])
            .with_credits(credits)
            .with_instances(vec![instance])
            .with_interval(Duration::days(7));

        let result = calculate_allocation(&request).unwrap();
        let day = 86_400.0;
        assert_eq!(
            result.interval_balances(),
            vec![6.0 * day, 6.0 * day, 2.0 * day, 2.0 * day]
        );
        assert!(result.intervals[2].recharged);
        assert_eq!(result.intervals[2].carried_in, 0.0);
        assert_eq!(result.total_available, 12.0 * day);
        assert_eq!(result.remaining, 8.0 * day);
    }

    fn weekly_recharge() -> Vec<CreditEvent> {
        vec![CreditEvent::recharge("Weekly", 1.0, TimeUnit::Day, utc(2014, 7, 1, 0), Some(Duration::days(7)))
            .unwrap()]
    }

    fn tiny_entry(start: DateTime<Utc>, end: DateTime<Utc>) -> InstanceHistoryEntry {
        InstanceHistoryEntry::new("active", tiny_size(), start, Some(end)).unwrap()
    }

    #[test]
    fn test_recharge_does_not_accumulate_within_interval() {
        // Idle for three weeks, then 4 days on 1 cpu in the fourth.
        let instance = instance_with_history(
            "inst-1",
            vec![tiny_entry(utc(2014, 7, 23, 0), utc(2014, 7, 27, 0))],
        );
        let request = AllocationRequest::new(utc(2014, 7, 1, 0), utc(2014, 7, 29, 0))
            .with_rules(cpu_rules())
            .with_credits(weekly_recharge())
            .with_instances(vec![instance]);

        let result = calculate_allocation(&request).unwrap();
        let day = 86_400.0;
        let interval = &result.intervals[0];
        assert!(interval.recharged);
        assert_eq!(interval.granted, 4.0 * day);
        assert_eq!(interval.forfeited, 3.0 * day);
        assert_eq!(interval.remaining, -3.0 * day);
        assert_eq!(result.total_used, 4.0 * day);
        assert_eq!(result.total_available, day);
        assert_eq!(result.remaining, -3.0 * day);
        assert!(result.is_over_allocation());
    }

    #[test]
    fn test_overdraft_is_dropped_at_recharge() {
        // 4 days used in the first week against a 1 day recharge.
        let instance = instance_with_history(
            "inst-1",
            vec![tiny_entry(utc(2014, 7, 2, 0), utc(2014, 7, 6, 0))],
        );
        let request = AllocationRequest::new(utc(2014, 7, 1, 0), utc(2014, 7, 29, 0))
            .with_rules(cpu_rules())
            .with_credits(weekly_recharge())
            .with_instances(vec![instance]);

        let result = calculate_allocation(&request).unwrap();
        let day = 86_400.0;
        let interval = &result.intervals[0];
        // Weeks two and three go unused; the fourth is still open at the end.
        assert_eq!(interval.forfeited, 2.0 * day);
        assert_eq!(interval.remaining, day);
        assert_eq!(interval.charged, 4.0 * day);
        assert_eq!(result.total_available, 2.0 * day);
        assert_eq!(result.remaining, -2.0 * day);
        assert_eq!(result.instances[0].counted_segments, 1);
    }

    #[test]
    fn test_overflowing_durations_are_clamped() {
        let huge = Duration::try_seconds(9_000_000_000_000).unwrap();
        let instance = instance_with_history(
            "inst-1",
            vec![entry("active", utc(2014, 7, 2, 0), Some(utc(2014, 7, 3, 0)))],
        );
        let credits = vec![
            CreditEvent::recharge("Rare", 10.0, TimeUnit::Day, utc(2014, 6, 1, 0), Some(huge)).unwrap(),
        ];
        let request = AllocationRequest::new(utc(2014, 7, 1, 0), utc(2014, 8, 1, 0))
            .with_rules(cpu_rules())
            .with_credits(credits)
            .with_instances(vec![instance])
            .with_interval(huge);

        let result = calculate_allocation(&request).unwrap();
        assert_eq!(result.intervals.len(), 1);
        assert_eq!(result.total_available, 10.0 * 86_400.0);
        assert_eq!(result.remaining, 6.0 * 86_400.0);
    }

    #[test]
    fn test_prior_credit_policy_is_applied() {
        let credits =
            vec![CreditEvent::increase("Old grant", 100.0, TimeUnit::Hour, utc(2014, 6, 1, 0)).unwrap()];
        let base = AllocationRequest::new(utc(2014, 7, 1, 0), utc(2014, 7, 31, 0)).with_credits(credits);

        let include = calculate_allocation(&base).unwrap();
        assert_eq!(include.total_available, 360_000.0);

        let exclude = calculate_allocation(&base.clone().with_options(AllocationOptions {
            prior_credit_policy: PriorCreditPolicy::Exclude,
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(exclude.total_available, 0.0);
    }

    #[test]
    fn test_provider_and_machine_grouping() {
        let first = instance_with_history(
            "inst-1",
            vec![entry("active", utc(2014, 7, 2, 0), Some(utc(2014, 7, 3, 0)))],
        );
        let mut second = instance_with_history(
            "inst-2",
            vec![InstanceHistoryEntry::new(
                "active",
                tiny_size(),
                utc(2014, 7, 2, 0),
                Some(utc(2014, 7, 4, 0)),
            )
            .unwrap()],
        );
        second.machine.identifier = "39966e54-9282-4fc8-bc13-10b03d616c54".to_string();

        let request = AllocationRequest::new(utc(2014, 7, 1, 0), utc(2014, 8, 1, 0))
            .with_rules(cpu_rules())
            .with_instances(vec![first, second]);
        let result = calculate_allocation(&request).unwrap();

        assert_eq!(result.providers.len(), 1);
        assert_eq!(result.providers[0].instance_count, 2);
        assert_eq!(result.providers[0].time_used, 6.0 * 86_400.0);
        assert_eq!(result.machines.len(), 2);
        assert_eq!(result.machines.iter().map(|m| m.time_used).sum::<f64>(), 6.0 * 86_400.0);
    }
}
