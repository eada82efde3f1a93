//! Resolves credit events into what each stretch of a sub-window is granted.
//!
//! A recharge occurrence resets the balance, so a sub-window is cut into
//! segments at every occurrence inside it.

use allocation_common::CreditEvent;
use chrono::{DateTime, Duration, Utc};

use crate::request::PriorCreditPolicy;
use crate::window::TimeWindow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreditSegment {
    pub window: TimeWindow,
    /// Seconds granted inside the segment, including prior credits for the very first one.
    pub granted: f64,
    /// Starts on a recharge occurrence; no balance carries into it.
    pub recharged: bool,
}

pub struct CreditLedger<'a> {
    credits: &'a [CreditEvent],
    window: TimeWindow,
    policy: PriorCreditPolicy,
}

impl<'a> CreditLedger<'a> {
    pub fn new(credits: &'a [CreditEvent], window: TimeWindow, policy: PriorCreditPolicy) -> Self {
        Self {
            credits,
            window,
            policy,
        }
    }

    /// Consecutive segments covering `interval`, split at recharge occurrences.
    pub fn segments(&self, interval: &TimeWindow) -> Vec<CreditSegment> {
        let mut resets: Vec<DateTime<Utc>> = self
            .credits
            .iter()
            .flat_map(|credit| match credit {
                CreditEvent::AllocationRecharge {
                    recharge_date,
                    recurrence,
                    ..
                } => occurrences_within(*recharge_date, *recurrence, interval),
                CreditEvent::AllocationIncrease { .. } => Vec::new(),
            })
            .collect();
        resets.sort_unstable();
        resets.dedup();

        let mut bounds: Vec<DateTime<Utc>> =
            resets.iter().copied().chain([interval.start, interval.end]).collect();
        bounds.sort_unstable();
        bounds.dedup();

        bounds
            .windows(2)
            .map(|pair| {
                let window = TimeWindow {
                    start: pair[0],
                    end: pair[1],
                };
                let recharged = resets.binary_search(&window.start).is_ok();
                // A recharge on the window start wipes out anything granted before it.
                let with_prior = !recharged && window.start == self.window.start;
                CreditSegment {
                    window,
                    granted: self.granted_in(&window, recharged, with_prior),
                    recharged,
                }
            })
            .collect()
    }

    fn granted_in(&self, segment: &TimeWindow, recharged: bool, with_prior: bool) -> f64 {
        self.credits
            .iter()
            .map(|credit| match credit {
                CreditEvent::AllocationIncrease { increase_date, .. } => {
                    if segment.contains(*increase_date) {
                        credit.amount_seconds()
                    } else if with_prior && *increase_date < self.window.start {
                        self.prior_share(credit.amount_seconds(), *increase_date, self.window.end)
                    } else {
                        0.0
                    }
                }
                CreditEvent::AllocationRecharge {
                    recharge_date,
                    recurrence,
                    ..
                } => {
                    if recharged
                        && next_occurrence(*recharge_date, *recurrence, segment.start) == Some(segment.start)
                    {
                        credit.amount_seconds()
                    } else if with_prior {
                        last_occurrence_before(*recharge_date, *recurrence, self.window.start).map_or(
                            0.0,
                            |(occurred, next)| {
                                let span_end = next.unwrap_or(self.window.end);
                                self.prior_share(credit.amount_seconds(), occurred, span_end)
                            },
                        )
                    } else {
                        0.0
                    }
                }
            })
            .sum()
    }

    /// Share of a credit effective before the window, covering `[span_start, span_end)`.
    fn prior_share(&self, amount: f64, span_start: DateTime<Utc>, span_end: DateTime<Utc>) -> f64 {
        match self.policy {
            PriorCreditPolicy::IncludeFull => amount,
            PriorCreditPolicy::Exclude => 0.0,
            PriorCreditPolicy::Prorate => match self.window.intersect(span_start, span_end) {
                Some(overlap) => amount * millis(overlap.duration()) / millis(span_end - span_start),
                None => 0.0,
            },
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64
}

fn period_millis(recurrence: Option<Duration>) -> Option<i64> {
    recurrence.map(|period| period.num_milliseconds()).filter(|ms| *ms > 0)
}

/// `instant + millis`, or `None` past the end of the calendar.
fn offset(instant: DateTime<Utc>, millis: i64) -> Option<DateTime<Utc>> {
    Duration::try_milliseconds(millis).and_then(|delta| instant.checked_add_signed(delta))
}

/// Earliest occurrence at or after `instant`.
fn next_occurrence(
    first: DateTime<Utc>,
    recurrence: Option<Duration>,
    instant: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if first >= instant {
        return Some(first);
    }
    let period = period_millis(recurrence)?;
    let elapsed = (instant - first).num_milliseconds();
    let skipped = elapsed.checked_add(period - 1)? / period;
    let candidate = offset(first, skipped.checked_mul(period)?)?;
    // Sub-millisecond remainders can leave the candidate one period short.
    if candidate < instant {
        offset(candidate, period)
    } else {
        Some(candidate)
    }
}

/// Every occurrence inside `interval`, in order.
fn occurrences_within(
    first: DateTime<Utc>,
    recurrence: Option<Duration>,
    interval: &TimeWindow,
) -> Vec<DateTime<Utc>> {
    let step = period_millis(recurrence);
    std::iter::successors(next_occurrence(first, recurrence, interval.start), |at| {
        step.and_then(|step| offset(*at, step))
    })
    .take_while(|at| *at < interval.end)
    .collect()
}

/// Latest occurrence strictly before `instant`, with the occurrence after it
/// (`None` when the recharge does not recur, or the next one is past the
/// calendar's end).
fn last_occurrence_before(
    first: DateTime<Utc>,
    recurrence: Option<Duration>,
    instant: DateTime<Utc>,
) -> Option<(DateTime<Utc>, Option<DateTime<Utc>>)> {
    if first >= instant {
        return None;
    }
    let Some(period) = period_millis(recurrence) else {
        return Some((first, None));
    };
    let elapsed = (instant - first).num_milliseconds();
    let occurred = offset(first, (elapsed - 1) / period * period)?;
    match offset(occurred, period) {
        // An occurrence landing exactly on the window start is counted inside it.
        Some(next) if next <= instant => None,
        next => Some((occurred, next)),
    }
}
