use allocation_common::{duration_secs, AllocationError, CreditEvent, Instance, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::rules::Rule;
use crate::window::TimeWindow;

/// What to do with credits that became effective before the window starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorCreditPolicy {
    /// Count the whole amount in the first sub-window.
    #[default]
    IncludeFull,
    /// Ignore them.
    Exclude,
    /// Count the share of the credit's span that falls inside the window.
    Prorate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationOptions {
    /// Instant that closes open-ended history entries. Defaults to the window end.
    #[serde(default)]
    pub evaluation_instant: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prior_credit_policy: PriorCreditPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRequest {
    #[serde(default)]
    pub credits: Vec<CreditEvent>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub instances: Vec<Instance>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Sub-window length; the whole window is one interval when absent.
    #[serde(default, with = "duration_secs::option")]
    pub interval_delta: Option<Duration>,
    #[serde(default)]
    pub options: AllocationOptions,
}

impl AllocationRequest {
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            credits: Vec::new(),
            rules: Vec::new(),
            instances: Vec::new(),
            start_date,
            end_date,
            interval_delta: None,
            options: AllocationOptions::default(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_credits(mut self, credits: Vec<CreditEvent>) -> Self {
        self.credits = credits;
        self
    }

    pub fn with_instances(mut self, instances: Vec<Instance>) -> Self {
        self.instances = instances;
        self
    }

    pub fn with_interval(mut self, interval_delta: Duration) -> Self {
        self.interval_delta = Some(interval_delta);
        self
    }

    pub fn with_options(mut self, options: AllocationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn window(&self) -> Result<TimeWindow> {
        TimeWindow::new(self.start_date, self.end_date)
    }

    pub fn evaluation_instant(&self) -> DateTime<Utc> {
        self.options.evaluation_instant.unwrap_or(self.end_date)
    }

    /// Rejects bad configuration and malformed snapshots before anything is computed.
    pub fn validate(&self) -> Result<TimeWindow> {
        let window = self.window()?;

        if let Some(delta) = self.interval_delta {
            if delta <= Duration::zero() {
                return Err(AllocationError::Configuration(format!(
                    "interval_delta must be positive, got {}s",
                    delta.num_seconds()
                )));
            }
        }

        if let Some(instant) = self.options.evaluation_instant {
            if instant < self.start_date {
                return Err(AllocationError::Configuration(format!(
                    "evaluation instant ({instant}) precedes window start ({})",
                    self.start_date
                )));
            }
        }

        for rule in &self.rules {
            rule.validate()?;
        }
        if !self.rules.iter().any(Rule::is_size_multiplier) {
            warn!(
                rules = self.rules.len(),
                "No size multiplier rule configured; usage is counted as raw clock time"
            );
        }

        for instance in &self.instances {
            instance.validate()?;
        }
        for credit in &self.credits {
            credit.validate()?;
        }

        Ok(window)
    }
}
