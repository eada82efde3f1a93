//! Read-only snapshots of the instances, sizes and credits an allocation is computed over.

use std::fmt::Display;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{AllocationError, Result, TimeUnit};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceStatus {
    Active,
    Suspended,
    Build,
    Error,
    Shutoff,
    Deploying,
    Networking,
    Pending,
    Unknown(String),
}

impl InstanceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            InstanceStatus::Active => "active",
            InstanceStatus::Suspended => "suspended",
            InstanceStatus::Build => "build",
            InstanceStatus::Error => "error",
            InstanceStatus::Shutoff => "shutoff",
            InstanceStatus::Deploying => "deploying",
            InstanceStatus::Networking => "networking",
            InstanceStatus::Pending => "pending",
            InstanceStatus::Unknown(other) => other,
        }
    }
}

impl From<&str> for InstanceStatus {
    fn from(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "active" => InstanceStatus::Active,
            "suspended" => InstanceStatus::Suspended,
            "build" => InstanceStatus::Build,
            "error" => InstanceStatus::Error,
            "shutoff" => InstanceStatus::Shutoff,
            "deploying" => InstanceStatus::Deploying,
            "networking" => InstanceStatus::Networking,
            "pending" => InstanceStatus::Pending,
            _ => InstanceStatus::Unknown(normalized),
        }
    }
}

impl From<String> for InstanceStatus {
    fn from(value: String) -> Self {
        InstanceStatus::from(value.as_str())
    }
}

impl From<InstanceStatus> for String {
    fn from(value: InstanceStatus) -> Self {
        value.as_str().to_string()
    }
}

impl Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hardware profile an instance ran with. `ram` is in MB, `disk` in GB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub name: String,
    pub identifier: String,
    pub cpu: i64,
    pub ram: i64,
    pub disk: i64,
}

impl Size {
    pub fn new(
        name: impl Into<String>,
        identifier: impl Into<String>,
        cpu: i64,
        ram: i64,
        disk: i64,
    ) -> Result<Self> {
        let size = Self {
            name: name.into(),
            identifier: identifier.into(),
            cpu,
            ram,
            disk,
        };
        size.validate()?;
        Ok(size)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("cpu", self.cpu), ("ram", self.ram), ("disk", self.disk)] {
            if value < 0 {
                return Err(AllocationError::Validation(format!(
                    "size '{}' has negative {field}: {value}",
                    self.identifier
                )));
            }
        }
        Ok(())
    }

    pub fn ram_gb(&self) -> f64 {
        self.ram as f64 / 1024.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
    pub identifier: String,
}

impl Machine {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub identifier: String,
}

impl Provider {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
        }
    }
}

/// One contiguous status period. An `end_date` of `None` means the instance
/// is still in this status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceHistoryEntry {
    pub status: InstanceStatus,
    pub size: Size,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl InstanceHistoryEntry {
    pub fn new(
        status: impl Into<InstanceStatus>,
        size: Size,
        start_date: DateTime<Utc>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let entry = Self {
            status: status.into(),
            size,
            start_date,
            end_date,
        };
        entry.validate()?;
        Ok(entry)
    }

    pub fn validate(&self) -> Result<()> {
        self.size.validate()?;
        if let Some(end) = self.end_date {
            if end <= self.start_date {
                return Err(AllocationError::Validation(format!(
                    "history entry ends ({end}) at or before it starts ({})",
                    self.start_date
                )));
            }
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub identifier: String,
    pub provider: Provider,
    pub machine: Machine,
    #[serde(default)]
    pub history: Vec<InstanceHistoryEntry>,
}

impl Instance {
    pub fn new(
        identifier: impl Into<String>,
        provider: Provider,
        machine: Machine,
        history: Vec<InstanceHistoryEntry>,
    ) -> Result<Self> {
        let instance = Self {
            identifier: identifier.into(),
            provider,
            machine,
            history,
        };
        instance.validate()?;
        Ok(instance)
    }

    /// Checks every entry and that the history is chronological and non-overlapping.
    /// Disordered history is rejected, never reordered.
    pub fn validate(&self) -> Result<()> {
        for (idx, entry) in self.history.iter().enumerate() {
            entry.validate().map_err(|e| {
                AllocationError::Validation(format!(
                    "instance '{}' history[{idx}]: {e}",
                    self.identifier
                ))
            })?;
        }

        for (idx, pair) in self.history.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            let Some(prev_end) = prev.end_date else {
                return Err(AllocationError::Validation(format!(
                    "instance '{}' history[{idx}] is open-ended but is not the last entry",
                    self.identifier
                )));
            };
            if next.start_date < prev_end {
                return Err(AllocationError::Validation(format!(
                    "instance '{}' history[{}] starts at {} before history[{idx}] ends at {prev_end}",
                    self.identifier,
                    idx + 1,
                    next.start_date
                )));
            }
        }
        Ok(())
    }
}

/// A grant of allocation time. Effective dates are instants; a credit has no
/// effect before its effective date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CreditEvent {
    /// One-time grant.
    AllocationIncrease {
        name: String,
        amount: f64,
        unit: TimeUnit,
        increase_date: DateTime<Utc>,
    },
    /// Grant that resets the available balance at every occurrence,
    /// `recharge_date + k * recurrence`. Without a recurrence it occurs once.
    AllocationRecharge {
        name: String,
        amount: f64,
        unit: TimeUnit,
        recharge_date: DateTime<Utc>,
        #[serde(default, with = "crate::duration_secs::option")]
        recurrence: Option<Duration>,
    },
}

impl CreditEvent {
    pub fn increase(
        name: impl Into<String>,
        amount: f64,
        unit: TimeUnit,
        increase_date: DateTime<Utc>,
    ) -> Result<Self> {
        let credit = CreditEvent::AllocationIncrease {
            name: name.into(),
            amount,
            unit,
            increase_date,
        };
        credit.validate()?;
        Ok(credit)
    }

    pub fn recharge(
        name: impl Into<String>,
        amount: f64,
        unit: TimeUnit,
        recharge_date: DateTime<Utc>,
        recurrence: Option<Duration>,
    ) -> Result<Self> {
        let credit = CreditEvent::AllocationRecharge {
            name: name.into(),
            amount,
            unit,
            recharge_date,
            recurrence,
        };
        credit.validate()?;
        Ok(credit)
    }

    pub fn name(&self) -> &str {
        match self {
            CreditEvent::AllocationIncrease { name, .. }
            | CreditEvent::AllocationRecharge { name, .. } => name,
        }
    }

    pub fn effective_date(&self) -> DateTime<Utc> {
        match self {
            CreditEvent::AllocationIncrease { increase_date, .. } => *increase_date,
            CreditEvent::AllocationRecharge { recharge_date, .. } => *recharge_date,
        }
    }

    /// Amount of the grant in seconds.
    pub fn amount_seconds(&self) -> f64 {
        match self {
            CreditEvent::AllocationIncrease { amount, unit, .. }
            | CreditEvent::AllocationRecharge { amount, unit, .. } => unit.to_seconds(*amount),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let amount = match self {
            CreditEvent::AllocationIncrease { amount, .. }
            | CreditEvent::AllocationRecharge { amount, .. } => *amount,
        };
        if !amount.is_finite() || amount < 0.0 {
            return Err(AllocationError::Validation(format!(
                "credit '{}' has invalid amount: {amount}",
                self.name()
            )));
        }
        if let CreditEvent::AllocationRecharge {
            recurrence: Some(recurrence),
            ..
        } = self
        {
            if *recurrence <= Duration::zero() {
                return Err(AllocationError::Validation(format!(
                    "recharge '{}' has non-positive recurrence",
                    self.name()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 7, day, 0, 0, 0).unwrap()
    }

    fn medium() -> Size {
        Size::new("Medium Fry", "test.medium", 4, 1024 * 16, 120).unwrap()
    }

    #[test]
    fn test_size_rejects_negative_fields() {
        let err = Size::new("Broken", "test.broken", 2, -1, 0).unwrap_err();
        assert!(matches!(err, AllocationError::Validation(_)));
        assert!(err.to_string().contains("ram"));
        assert_eq!(medium().ram_gb(), 16.0);
    }

    #[test]
    fn test_history_entry_requires_positive_duration() {
        assert!(InstanceHistoryEntry::new("active", medium(), at(2), Some(at(2))).is_err());
        assert!(InstanceHistoryEntry::new("active", medium(), at(3), Some(at(2))).is_err());
        let open = InstanceHistoryEntry::new("active", medium(), at(3), None).unwrap();
        assert!(open.is_open());
    }

    #[test]
    fn test_instance_rejects_overlapping_history() {
        let provider = Provider::new("iPlant Cloud - Tucson", "4");
        let machine = Machine::new("Not real machine", "12412515");
        let history = vec![
            InstanceHistoryEntry::new("active", medium(), at(1), Some(at(5))).unwrap(),
            InstanceHistoryEntry::new("suspended", medium(), at(4), Some(at(8))).unwrap(),
        ];
        let err = Instance::new("inst-1", provider.clone(), machine.clone(), history).unwrap_err();
        assert!(err.to_string().contains("history[1]"));

        let history = vec![
            InstanceHistoryEntry::new("active", medium(), at(1), None).unwrap(),
            InstanceHistoryEntry::new("suspended", medium(), at(4), Some(at(8))).unwrap(),
        ];
        assert!(Instance::new("inst-1", provider, machine, history).is_err());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(InstanceStatus::from("Suspended"), InstanceStatus::Suspended);
        assert_eq!(
            InstanceStatus::from("hard_reboot"),
            InstanceStatus::Unknown("hard_reboot".to_string())
        );
        let yaml = serde_yaml::to_string(&InstanceStatus::Build).unwrap();
        assert_eq!(yaml.trim(), "build");
    }

    #[test]
    fn test_credit_validation() {
        assert!(CreditEvent::increase("Negative", -1.0, TimeUnit::Hour, at(1)).is_err());
        assert!(
            CreditEvent::recharge("Zero period", 10.0, TimeUnit::Hour, at(1), Some(Duration::zero()))
                .is_err()
        );
        let credit = CreditEvent::increase("Add 10,000 Hours", 10_000.0, TimeUnit::Hour, at(4)).unwrap();
        assert_eq!(credit.amount_seconds(), 36_000_000.0);
        assert_eq!(credit.effective_date(), at(4));
    }

    #[test]
    fn test_credit_serialization() {
        let credit = CreditEvent::recharge(
            "Monthly",
            720.0,
            TimeUnit::Hour,
            at(1),
            Some(Duration::days(30)),
        )
        .unwrap();
        let json = serde_json::to_string(&credit).unwrap();
        assert!(json.contains("\"type\":\"allocation_recharge\""));
        assert!(json.contains("\"recurrence\":2592000"));
        let parsed: CreditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, credit);
    }
}
