//! Availability set manager
//!
//! An availability set is shared by every VM that names it and has no single
//! owner. Creating VMs in a set holds its readers/writer lock in read mode;
//! deleting the set once empty holds it in write mode. First creation of a set
//! is serialized by a separate mutex.

use crate::error::{Result, VmError};
use nodeflow_cloud::{AvailabilitySet, AvailabilitySetSpec, CloudClient};
use nodeflow_lock::{LockCoordinator, ReadGuard};
use std::sync::Arc;

const LOCK_PREFIX: &str = "availability-set";

/// Readers/writer lock guarding membership of availability set `name`
pub fn rw_lock_name(name: &str) -> String {
    format!("{}-{}", LOCK_PREFIX, name)
}

/// Mutex serializing the first creation of availability set `name`
pub fn create_lock_name(name: &str) -> String {
    format!("{}-create-{}", LOCK_PREFIX, name)
}

pub struct AvailabilitySetManager {
    client: Arc<dyn CloudClient>,
    locks: LockCoordinator,
}

impl AvailabilitySetManager {
    pub fn new(client: Arc<dyn CloudClient>, locks: LockCoordinator) -> Self {
        Self { client, locks }
    }

    /// Admit a VM creator into availability set `name`
    pub async fn enter(&self, name: &str) -> Result<ReadGuard> {
        Ok(self.locks.rw_lock(&rw_lock_name(name)).acquire_read().await?)
    }

    /// Fetch the availability set described by `spec`, creating or upgrading it
    /// when needed.
    ///
    /// Must be called while holding the set's read lock.
    pub async fn get_or_create(
        &self,
        resource_group: &str,
        spec: &AvailabilitySetSpec,
    ) -> Result<AvailabilitySet> {
        let name = &spec.name;
        let mut spec = spec.clone();
        let mut upgrade = false;

        match self.client.get_availability_set(resource_group, name).await? {
            None => {
                tracing::info!(
                    "Availability set `{}' doesn't exist. Will create a new one.",
                    name
                );
            }
            Some(existing) => {
                // Some regions report locations in mixed case, e.g. CanadaCentral
                if !existing.location.eq_ignore_ascii_case(&spec.location) {
                    return Err(VmError::Configuration(format!(
                        "The availability set `{}' already exists, but in a different location `{}' instead of `{}'. \
                        Please delete the availability set or choose another location.",
                        name,
                        existing.location.to_lowercase(),
                        spec.location.to_lowercase()
                    )));
                }
                if existing.managed && !spec.managed {
                    return Err(VmError::Configuration(format!(
                        "The availability set `{}' already exists. It's not allowed to update it from managed to unmanaged.",
                        name
                    )));
                }
                if !spec.managed || existing.managed {
                    tracing::info!("Availability set `{}' exists. No need to update.", name);
                    return Ok(existing);
                }

                tracing::info!(
                    "Availability set `{}' exists, but it needs to be updated from unmanaged to managed.",
                    name
                );
                spec.platform_update_domain_count = existing.platform_update_domain_count;
                spec.platform_fault_domain_count = existing.platform_fault_domain_count;
                spec.managed = true;
                upgrade = true;
            }
        }

        self.create_or_update(resource_group, &spec, upgrade)
            .await
            .map_err(|source| VmError::AvailabilitySet {
                action: "create",
                name: name.clone(),
                resource_group: resource_group.to_string(),
                source: Box::new(source),
            })?;

        self.client
            .get_availability_set(resource_group, name)
            .await?
            .ok_or_else(|| {
                VmError::NotFound(format!(
                    "Cannot find the availability set `{}' in the resource group `{}' after creating it",
                    name, resource_group
                ))
            })
    }

    async fn create_or_update(
        &self,
        resource_group: &str,
        spec: &AvailabilitySetSpec,
        upgrade: bool,
    ) -> Result<()> {
        let lock_name = create_lock_name(&spec.name);
        let mutex = self.locks.mutex(&lock_name);

        let Some(guard) = mutex.try_acquire().await? else {
            // Another creator holds the mutex; its result is fetched afterwards
            if let Err(e) = mutex.wait().await {
                self.mark(&lock_name, &e.to_string()).await;
                return Err(e.into());
            }
            return Ok(());
        };

        let result = async {
            match self.client.get_availability_set(resource_group, &spec.name).await? {
                None => {
                    self.client
                        .create_availability_set(resource_group, spec)
                        .await?
                }
                Some(existing) if upgrade && !existing.managed => {
                    self.client
                        .update_availability_set(resource_group, spec)
                        .await?
                }
                Some(_) => {
                    tracing::debug!("Availability set `{}' was created concurrently", spec.name);
                }
            }
            Ok::<(), VmError>(())
        }
        .await;

        match result {
            Ok(()) => {
                guard.release().await?;
                Ok(())
            }
            Err(e) => {
                guard.abandon().await;
                self.mark(&lock_name, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Delete availability set `name` if no VM is left in it.
    ///
    /// The write lock is released only when this completes. On failure it stays
    /// held and is marked for deletion, so no creator joins a set whose state
    /// is unknown until an operator clears the lock.
    pub async fn delete_if_empty(&self, resource_group: &str, name: &str) -> Result<()> {
        let lock_name = rw_lock_name(name);
        let wrap = |source: VmError| VmError::AvailabilitySet {
            action: "delete",
            name: name.to_string(),
            resource_group: resource_group.to_string(),
            source: Box::new(source),
        };

        let guard = match self.locks.rw_lock(&lock_name).acquire_write().await {
            Ok(guard) => guard,
            Err(e) => {
                self.mark(&lock_name, &e.to_string()).await;
                return Err(wrap(e.into()));
            }
        };

        let result = async {
            match self.client.get_availability_set(resource_group, name).await? {
                Some(set) if set.virtual_machines.is_empty() => {
                    tracing::info!("Deleting empty availability set `{}'", name);
                    self.client.delete_availability_set(resource_group, name).await?;
                }
                Some(set) => {
                    tracing::debug!(
                        "Availability set `{}' still has {} VMs",
                        name,
                        set.virtual_machines.len()
                    );
                }
                None => {}
            }
            Ok::<(), VmError>(())
        }
        .await;

        match result {
            Ok(()) => {
                guard.release().await.map_err(|e| wrap(e.into()))?;
                Ok(())
            }
            Err(e) => {
                guard.abandon().await;
                self.mark(&lock_name, &e.to_string()).await;
                Err(wrap(e))
            }
        }
    }

    async fn mark(&self, lock_name: &str, reason: &str) {
        if let Err(e) = self.locks.mark_for_deletion(lock_name, reason).await {
            tracing::error!(lock = %lock_name, "failed to mark lock for deletion: {}", e);
        }
    }
}
