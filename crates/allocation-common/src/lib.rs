// Re-export dependencies used in public interfaces of common types

use async_trait::async_trait;
pub use chrono;
pub use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod model;

pub use model::{
    CreditEvent, Instance, InstanceHistoryEntry, InstanceStatus, Machine, Provider, Size,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Instance Not Found: {0}")]
    InstanceNotFound(String),

    #[error("Storage Error: {0}")]
    Storage(String),
}

// Define the primary Result type for allocation operations
pub type Result<T> = std::result::Result<T, AllocationError>;

/// Unit a credit amount is expressed in. The engine's canonical unit is the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    pub fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Second => 1.0,
            TimeUnit::Minute => 60.0,
            TimeUnit::Hour => 3_600.0,
            TimeUnit::Day => 86_400.0,
        }
    }

    pub fn to_seconds(&self, amount: f64) -> f64 {
        amount * self.seconds()
    }

    pub fn from_seconds(&self, seconds: f64) -> f64 {
        seconds / self.seconds()
    }
}

// Read-only source of instance snapshots. Implemented by whatever store the
// hosting service keeps instances in.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get_instance(&self, identifier: &str) -> Result<Instance>;

    /// Every instance, or only those owned by `provider_id` when given.
    async fn list_instances(&self, provider_id: Option<&str>) -> Result<Vec<Instance>>;
}

/// Serde helpers storing `chrono::Duration` as whole seconds.
pub mod duration_secs {
    use chrono::Duration;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Duration::try_seconds(secs).ok_or_else(|| D::Error::custom(format!("duration out of range: {secs}s")))
    }

    pub mod option {
        use chrono::Duration;
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> std::result::Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&d.num_seconds()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> std::result::Result<Option<Duration>, D::Error> {
            match Option::<i64>::deserialize(deserializer)? {
                Some(secs) => Duration::try_seconds(secs)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("duration out of range: {secs}s"))),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_unit_conversion() {
        assert_eq!(TimeUnit::Hour.to_seconds(10_000.0), 36_000_000.0);
        assert_eq!(TimeUnit::Day.from_seconds(172_800.0), 2.0);
        assert_eq!(TimeUnit::Minute.to_seconds(1.5), 90.0);
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&TimeUnit::Hour).unwrap();
        assert_eq!(json, "\"hour\"");

        let err = AllocationError::Configuration("bad window".to_string());
        assert_eq!(err.to_string(), "Configuration Error: bad window");
    }
}
