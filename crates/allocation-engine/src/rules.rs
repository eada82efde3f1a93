//! Business rules applied to usage, in the order the caller lists them.
//!
//! Entry rules run once per clipped history entry: status vetoes first, then
//! multipliers folded over the elapsed seconds. Aggregate rules run once per
//! sub-window over the summed total.

use allocation_common::{AllocationError, InstanceHistoryEntry, InstanceStatus, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    /// Time used × cpu cores × multiplier.
    MultiplySizeCpu { name: String, multiplier: f64 },
    /// Time used × ram in GB × multiplier.
    MultiplySizeRam { name: String, multiplier: f64 },
    /// Time used × disk in GB × multiplier.
    MultiplySizeDisk { name: String, multiplier: f64 },
    /// Time used × a fixed multiplier.
    MultiplyTime { name: String, multiplier: f64 },
    /// Sub-window total × multiplier.
    MultiplyBurnTime { name: String, multiplier: f64 },
    /// Entries in `status` contribute nothing.
    IgnoreStatus { name: String, status: InstanceStatus },
    /// Rolls the previous sub-window's balance into the current one.
    CarryForwardTime {
        #[serde(default = "default_carry_forward_name")]
        name: String,
    },
}

fn default_carry_forward_name() -> String {
    "Carry Forward Time".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    Entry,
    Aggregate,
}

/// Running sub-window total threaded through the aggregate rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalTotal {
    /// Usage after burn-rate multipliers.
    pub time_used: f64,
    /// Amount netted against the sub-window's granted credit.
    pub charged: f64,
    /// Balance rolled in by carry-forward, once applied.
    pub carried_in: Option<f64>,
}

impl IntervalTotal {
    pub fn new(time_used: f64) -> Self {
        Self {
            time_used,
            charged: time_used,
            carried_in: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AggregateContext {
    /// Remaining balance of the previous sub-window, zero after a recharge reset.
    pub carried_balance: f64,
}

impl Rule {
    pub fn multiply_by_cpu(name: impl Into<String>, multiplier: f64) -> Self {
        Rule::MultiplySizeCpu {
            name: name.into(),
            multiplier,
        }
    }

    pub fn multiply_by_ram(name: impl Into<String>, multiplier: f64) -> Self {
        Rule::MultiplySizeRam {
            name: name.into(),
            multiplier,
        }
    }

    pub fn multiply_by_disk(name: impl Into<String>, multiplier: f64) -> Self {
        Rule::MultiplySizeDisk {
            name: name.into(),
            multiplier,
        }
    }

    pub fn multiply_time(name: impl Into<String>, multiplier: f64) -> Self {
        Rule::MultiplyTime {
            name: name.into(),
            multiplier,
        }
    }

    pub fn burn_rate(name: impl Into<String>, multiplier: f64) -> Self {
        Rule::MultiplyBurnTime {
            name: name.into(),
            multiplier,
        }
    }

    pub fn ignore_status(name: impl Into<String>, status: impl Into<InstanceStatus>) -> Self {
        Rule::IgnoreStatus {
            name: name.into(),
            status: status.into(),
        }
    }

    pub fn carry_forward() -> Self {
        Rule::CarryForwardTime {
            name: default_carry_forward_name(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Rule::MultiplySizeCpu { name, .. }
            | Rule::MultiplySizeRam { name, .. }
            | Rule::MultiplySizeDisk { name, .. }
            | Rule::MultiplyTime { name, .. }
            | Rule::MultiplyBurnTime { name, .. }
            | Rule::IgnoreStatus { name, .. }
            | Rule::CarryForwardTime { name } => name,
        }
    }

    pub fn scope(&self) -> RuleScope {
        match self {
            Rule::MultiplyBurnTime { .. } | Rule::CarryForwardTime { .. } => RuleScope::Aggregate,
            _ => RuleScope::Entry,
        }
    }

    pub fn is_size_multiplier(&self) -> bool {
        matches!(
            self,
            Rule::MultiplySizeCpu { .. } | Rule::MultiplySizeRam { .. } | Rule::MultiplySizeDisk { .. }
        )
    }

    fn multiplier(&self) -> Option<f64> {
        match self {
            Rule::MultiplySizeCpu { multiplier, .. }
            | Rule::MultiplySizeRam { multiplier, .. }
            | Rule::MultiplySizeDisk { multiplier, .. }
            | Rule::MultiplyTime { multiplier, .. }
            | Rule::MultiplyBurnTime { multiplier, .. } => Some(*multiplier),
            Rule::IgnoreStatus { .. } | Rule::CarryForwardTime { .. } => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.multiplier() {
            Some(m) if !m.is_finite() || m < 0.0 => Err(AllocationError::Configuration(format!(
                "rule '{}' has invalid multiplier: {m}",
                self.name()
            ))),
            _ => Ok(()),
        }
    }

    /// False when this rule vetoes the entry.
    pub fn applies(&self, entry: &InstanceHistoryEntry) -> bool {
        match self {
            Rule::IgnoreStatus { status, .. } => entry.status != *status,
            _ => true,
        }
    }

    pub fn apply_to_entry(&self, time_used: f64, entry: &InstanceHistoryEntry) -> f64 {
        match self {
            Rule::MultiplySizeCpu { multiplier, .. } => time_used * entry.size.cpu as f64 * multiplier,
            Rule::MultiplySizeRam { multiplier, .. } => time_used * entry.size.ram_gb() * multiplier,
            Rule::MultiplySizeDisk { multiplier, .. } => time_used * entry.size.disk as f64 * multiplier,
            Rule::MultiplyTime { multiplier, .. } => time_used * multiplier,
            _ => time_used,
        }
    }

    pub fn apply_to_total(&self, total: IntervalTotal, context: &AggregateContext) -> IntervalTotal {
        match self {
            Rule::MultiplyBurnTime { multiplier, .. } => IntervalTotal {
                time_used: total.time_used * multiplier,
                charged: total.charged * multiplier,
                carried_in: total.carried_in,
            },
            // A second carry-forward in the same list must not roll the balance in twice.
            Rule::CarryForwardTime { .. } if total.carried_in.is_none() => IntervalTotal {
                time_used: total.time_used,
                charged: total.charged - context.carried_balance,
                carried_in: Some(context.carried_balance),
            },
            _ => total,
        }
    }
}

/// Time used by one clipped entry after every entry rule, in list order.
/// `None` when a veto rule excludes the entry.
pub fn apply_entry_rules(
    rules: &[Rule],
    elapsed_seconds: f64,
    entry: &InstanceHistoryEntry,
) -> Option<f64> {
    if !rules.iter().all(|rule| rule.applies(entry)) {
        return None;
    }
    let time_used = rules
        .iter()
        .filter(|rule| rule.scope() == RuleScope::Entry)
        .fold(elapsed_seconds, |time_used, rule| rule.apply_to_entry(time_used, entry));
    Some(time_used)
}

pub fn apply_aggregate_rules(rules: &[Rule], time_used: f64, context: &AggregateContext) -> IntervalTotal {
    rules
        .iter()
        .filter(|rule| rule.scope() == RuleScope::Aggregate)
        .fold(IntervalTotal::new(time_used), |total, rule| {
            rule.apply_to_total(total, context)
        })
}

pub fn carries_forward(rules: &[Rule]) -> bool {
    rules.iter().any(|rule| matches!(rule, Rule::CarryForwardTime { .. }))
}
