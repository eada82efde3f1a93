use crate::{
    calculate_allocation, AllocationOptions, AllocationRequest, AllocationResult, Result, Rule,
};
use allocation_common::{CreditEvent, Instance, SnapshotStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

/// Everything in a request except the instances, which come from the store.
#[derive(Debug, Clone)]
pub struct AllocationPlan {
    pub rules: Vec<Rule>,
    pub credits: Vec<CreditEvent>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub interval_delta: Option<Duration>,
    pub options: AllocationOptions,
}

impl AllocationPlan {
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>, rules: Vec<Rule>) -> Self {
        Self {
            rules,
            credits: Vec::new(),
            start_date,
            end_date,
            interval_delta: None,
            options: AllocationOptions::default(),
        }
    }

    fn into_request(self, instances: Vec<Instance>) -> AllocationRequest {
        AllocationRequest {
            credits: self.credits,
            rules: self.rules,
            instances,
            start_date: self.start_date,
            end_date: self.end_date,
            interval_delta: self.interval_delta,
            options: self.options,
        }
    }
}

pub struct AllocationCalculator {
    store: Arc<dyn SnapshotStore>,
}

impl AllocationCalculator {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    /// Resolves every id before calculating; one missing id fails the whole call.
    pub async fn calculate_for_instances(
        &self,
        instance_ids: &[&str],
        plan: AllocationPlan,
    ) -> Result<AllocationResult> {
        let mut instances = Vec::with_capacity(instance_ids.len());
        for id in instance_ids {
            instances.push(self.store.get_instance(id).await?);
        }

        info!(instances = instances.len(), "Resolved instance snapshots");
        calculate_allocation(&plan.into_request(instances))
    }

    pub async fn calculate_for_provider(
        &self,
        provider_id: &str,
        plan: AllocationPlan,
    ) -> Result<AllocationResult> {
        let instances = self.store.list_instances(Some(provider_id)).await?;

        info!(%provider_id, instances = instances.len(), "Resolved provider instances");
        calculate_allocation(&plan.into_request(instances))
    }
}
