use allocation_common::{AllocationError, Instance, Result, SnapshotStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

// In-memory snapshot store for development/testing
pub struct InMemorySnapshotStore {
    instances: Arc<RwLock<HashMap<String, Instance>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            instances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Stores a snapshot, replacing any previous one with the same identifier.
    pub async fn insert_instance(&self, instance: Instance) -> Result<()> {
        instance.validate()?;
        debug!(instance_id = %instance.identifier, entries = instance.history.len(), "Storing instance snapshot");
        self.instances
            .write()
            .await
            .insert(instance.identifier.clone(), instance);
        Ok(())
    }

    pub async fn remove_instance(&self, identifier: &str) -> Result<Instance> {
        self.instances
            .write()
            .await
            .remove(identifier)
            .ok_or_else(|| AllocationError::InstanceNotFound(identifier.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }
}

impl Default for InMemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get_instance(&self, identifier: &str) -> Result<Instance> {
        self.instances
            .read()
            .await
            .get(identifier)
            .cloned()
            .ok_or_else(|| AllocationError::InstanceNotFound(identifier.to_string()))
    }

    async fn list_instances(&self, provider_id: Option<&str>) -> Result<Vec<Instance>> {
        let instances = self.instances.read().await;
        let mut matching: Vec<Instance> = instances
            .values()
            .filter(|instance| provider_id.map_or(true, |id| instance.provider.identifier == id))
            .cloned()
            .collect();
        // HashMap order is arbitrary; results must not depend on it.
        matching.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(matching)
    }
}
