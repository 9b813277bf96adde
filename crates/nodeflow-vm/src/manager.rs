//! VM lifecycle manager
//!
//! Sequences the spec builder, network planner and availability set manager
//! against the cloud API to create, delete, reboot, tag and attach disks to
//! VMs.
//!
//! # Create
//!
//! ```text
//! validate ─▶ resource group ─▶ disks ─▶ VM spec ─▶ interfaces ─▶ gateway
//!                                                        │
//!                                ┌───────────────────────┘
//!                                ▼
//!                  [read lock] get_or_create set ─▶ create VM
//!                                │
//!            provisioning failed ├──▶ retry (at most 2 more attempts)
//!   exhausted or lock on a retry ├──▶ keep everything for diagnostics
//!                  other errors  └──▶ delete VM, empty set, disks ─▶ unwind ledger
//! ```

use crate::availability_set::{AvailabilitySetManager, rw_lock_name};
use crate::builder::{self, TAG_APPLICATION_GATEWAY, TAG_AVAILABILITY_SET, VmSpecParams};
use crate::disks::{BlobDiskManager, DiskManager, StorageAccountManager};
use crate::env::VmEnvironment;
use crate::error::{Result, VmError};
use crate::gateway::GatewayRegistrar;
use crate::identity::{DiskId, InstanceId};
use crate::image::ImageMetadata;
use crate::ledger::{RollbackLedger, Undo};
use crate::network::NetworkTopology;
use crate::planner::NetworkPlanner;
use nodeflow_cloud::{
    AvailabilitySetSpec, CloudClient, DataDiskAttachment, DataDiskSource, EphemeralDisk,
    NetworkInterface, OsDisk, Tags, VirtualMachine, VmSpec,
};
use nodeflow_config::{CloudProperties, ResourcePool};
use nodeflow_lock::LockCoordinator;
use std::sync::Arc;

/// Additional create attempts after the VM failed in provisioning
pub const PROVISIONING_FAIL_RETRIES: u32 = 2;

/// How a failed create ends
#[derive(Debug)]
pub enum CreateFailure {
    /// Provisioning failed again and again, a retry hit a lock error, or
    /// cleanup failed: the VM and its disks are kept so an operator can
    /// investigate
    KeepForDiagnostics(VmError),
    /// The VM-level resources are gone; the rollback ledger removes the rest
    Fatal(VmError),
}

enum Disposition {
    Retry,
    Cleanup,
    KeepForDiagnostics,
    AbortOnLock,
}

fn classify(error: &VmError, retry_count: u32, vm_created: bool) -> Disposition {
    if error.is_lock_error() && !vm_created {
        return Disposition::AbortOnLock;
    }
    if error.is_provisioning_failure() {
        if retry_count < PROVISIONING_FAIL_RETRIES {
            return Disposition::Retry;
        }
        return Disposition::KeepForDiagnostics;
    }
    Disposition::Cleanup
}

struct AttemptFailure {
    error: VmError,
    /// Availability set the VM was submitted into, if it got that far
    availability_set: Option<String>,
    vm_created: bool,
}

/// Everything a create call has assembled before submitting the VM
struct CreatePlan<'a> {
    identity: &'a InstanceId,
    vm_spec: &'a VmSpec,
    network_interfaces: &'a [NetworkInterface],
    availability_set: Option<&'a AvailabilitySetSpec>,
}

pub struct VmManager {
    properties: CloudProperties,
    client: Arc<dyn CloudClient>,
    disks: Arc<dyn DiskManager>,
    blob_disks: Arc<dyn BlobDiskManager>,
    storage_accounts: Arc<dyn StorageAccountManager>,
    locks: LockCoordinator,
    availability_sets: AvailabilitySetManager,
    gateway: GatewayRegistrar,
}

impl VmManager {
    pub fn new(
        properties: CloudProperties,
        client: Arc<dyn CloudClient>,
        disks: Arc<dyn DiskManager>,
        blob_disks: Arc<dyn BlobDiskManager>,
        storage_accounts: Arc<dyn StorageAccountManager>,
        locks: LockCoordinator,
    ) -> Self {
        let gateway = GatewayRegistrar::new(
            client.clone(),
            locks.clone(),
            properties.lock.gateway_timeout(),
        );
        let availability_sets = AvailabilitySetManager::new(client.clone(), locks.clone());
        Self {
            properties,
            client,
            disks,
            blob_disks,
            storage_accounts,
            locks,
            availability_sets,
            gateway,
        }
    }

    pub fn availability_sets(&self) -> &AvailabilitySetManager {
        &self.availability_sets
    }

    /// Create a VM and everything it needs.
    ///
    /// On failure the returned [`VmError::CreationFailed`] names the resource
    /// group and VM. Resources created so far are removed, unless they were
    /// kept for diagnostics, in which case the error lists them.
    pub async fn create(
        &self,
        identity: &InstanceId,
        location: &str,
        image: &ImageMetadata,
        pool: &ResourcePool,
        topology: &NetworkTopology,
        env: &VmEnvironment,
    ) -> Result<VmSpec> {
        tracing::info!(
            instance = %identity,
            location = %location,
            instance_type = ?pool.instance_type,
            "create"
        );

        let mut ledger = RollbackLedger::new();
        let mut has_ephemeral_disk = false;
        let result = self
            .create_inner(
                identity,
                location,
                image,
                pool,
                topology,
                env,
                &mut ledger,
                &mut has_ephemeral_disk,
            )
            .await;

        let failure = match result {
            Ok(spec) => return Ok(spec),
            Err(failure) => failure,
        };

        let (cause, left_behind, cleanup_errors) = match failure {
            CreateFailure::KeepForDiagnostics(cause) => {
                let mut left_behind = self.vm_resources(identity, has_ephemeral_disk);
                left_behind.extend(ledger.resources());
                (cause, left_behind, Vec::new())
            }
            CreateFailure::Fatal(cause) => {
                let cleanup_errors = self.unwind(identity.resource_group_name(), &mut ledger).await;
                (cause, Vec::new(), cleanup_errors)
            }
        };

        Err(self.creation_failed(identity, cause, left_behind, cleanup_errors))
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_inner(
        &self,
        identity: &InstanceId,
        location: &str,
        image: &ImageMetadata,
        pool: &ResourcePool,
        topology: &NetworkTopology,
        env: &VmEnvironment,
        ledger: &mut RollbackLedger,
        has_ephemeral_disk: &mut bool,
    ) -> std::result::Result<VmSpec, CreateFailure> {
        let resource_group = identity.resource_group_name();
        let vm_name = identity.vm_name();

        let vm_size = pool.instance_type().map_err(|e| CreateFailure::Fatal(e.into()))?;
        pool.validate().map_err(|e| CreateFailure::Fatal(e.into()))?;

        self.ensure_resource_group(resource_group, location)
            .await
            .map_err(CreateFailure::Fatal)?;

        let (os_disk, ephemeral_disk) = self
            .os_and_ephemeral_disks(identity, image, pool)
            .await
            .map_err(CreateFailure::Fatal)?;
        *has_ephemeral_disk = ephemeral_disk.is_some();

        let mut vm_spec = builder::vm_spec(
            &self.properties,
            VmSpecParams {
                identity,
                location,
                vm_size,
                image,
                os_disk,
                ephemeral_disk,
                default_dns: topology.default_dns(),
                availability_zone: pool.availability_zone.clone(),
            },
        )
        .map_err(CreateFailure::Fatal)?;
        vm_spec.diag_storage_uri = self.diagnostics_endpoint(location).await;

        let availability_set_name = builder::availability_set_name(pool, env);
        let application_gateway = pool.application_gateway.as_deref();
        let primary_tags =
            builder::primary_nic_tags(availability_set_name.as_deref(), application_gateway);

        let planner = NetworkPlanner::new(self.client.as_ref(), &self.properties);
        let network_interfaces = planner
            .create_network_interfaces(
                resource_group,
                vm_name,
                location,
                pool,
                topology,
                &primary_tags,
                ledger,
            )
            .await
            .map_err(CreateFailure::Fatal)?;

        if let Some(gateway) = application_gateway {
            let Some(ip_address) = network_interfaces
                .first()
                .and_then(|nic| nic.private_ip.clone())
            else {
                return Err(CreateFailure::Fatal(VmError::Configuration(
                    "You need to use static IP for the VM which will be bound to the application gateway"
                        .to_string(),
                )));
            };
            ledger.push(Undo::DeregisterGatewayAddress {
                gateway: gateway.to_string(),
                ip_address: ip_address.clone(),
            });
            self.gateway
                .register(gateway, &ip_address)
                .await
                .map_err(CreateFailure::Fatal)?;
        }

        let availability_set_spec = availability_set_name.as_deref().map(|name| {
            builder::availability_set_spec(name, location, pool, identity.use_managed_disks())
        });

        let plan = CreatePlan {
            identity,
            vm_spec: &vm_spec,
            network_interfaces: &network_interfaces,
            availability_set: availability_set_spec.as_ref(),
        };
        self.create_virtual_machine(&plan).await?;
        Ok(vm_spec)
    }

    /// Submit the VM, retrying provisioning failures.
    ///
    /// Only the VM create is retried; the interfaces and gateway registration
    /// done before are reused as they are.
    async fn create_virtual_machine(
        &self,
        plan: &CreatePlan<'_>,
    ) -> std::result::Result<(), CreateFailure> {
        let resource_group = plan.identity.resource_group_name();
        let vm_name = plan.identity.vm_name();
        let mut retry_count = 0;
        // A VM left in the failed state by an earlier attempt still exists
        let mut provisioning_failed_before = false;

        loop {
            let failure = match self.attempt_create(plan).await {
                Ok(()) => {
                    tracing::info!("Created virtual machine `{}'", vm_name);
                    return Ok(());
                }
                Err(failure) => failure,
            };

            match classify(&failure.error, retry_count, failure.vm_created) {
                Disposition::Retry => {
                    retry_count += 1;
                    provisioning_failed_before = true;
                    tracing::info!(
                        "Retry {}: will retry to create the virtual machine `{}' which failed in provisioning",
                        retry_count,
                        vm_name
                    );
                }
                Disposition::KeepForDiagnostics => {
                    tracing::warn!(
                        "Virtual machine `{}' failed in provisioning after {} retries, keeping it for investigation",
                        vm_name,
                        retry_count
                    );
                    return Err(CreateFailure::KeepForDiagnostics(failure.error));
                }
                Disposition::AbortOnLock => {
                    if let Some(name) = failure.error.lock_name() {
                        self.mark_lock(name, &failure.error.to_string()).await;
                    }
                    if provisioning_failed_before {
                        tracing::warn!(
                            "Retry of virtual machine `{}' aborted by a lock error, keeping it for investigation",
                            vm_name
                        );
                        return Err(CreateFailure::KeepForDiagnostics(failure.error));
                    }
                    return Err(CreateFailure::Fatal(failure.error));
                }
                Disposition::Cleanup => {
                    tracing::info!(
                        "Cleaning up resources of the failed virtual machine `{}' in the resource group `{}'",
                        vm_name,
                        resource_group
                    );
                    let cleanup = self
                        .cleanup_vm(
                            plan.identity,
                            failure.availability_set.as_deref(),
                            plan.vm_spec.ephemeral_disk.is_some(),
                        )
                        .await;
                    return Err(match cleanup {
                        Ok(()) => CreateFailure::Fatal(failure.error),
                        Err(cleanup) => {
                            tracing::error!(
                                "Failed to clean up the virtual machine `{}': {}",
                                vm_name,
                                cleanup
                            );
                            CreateFailure::KeepForDiagnostics(VmError::Cleanup {
                                source: Box::new(failure.error),
                                cleanup: Box::new(cleanup),
                            })
                        }
                    });
                }
            }
        }
    }

    async fn attempt_create(&self, plan: &CreatePlan<'_>) -> std::result::Result<(), AttemptFailure> {
        let resource_group = plan.identity.resource_group_name();

        let Some(spec) = plan.availability_set else {
            return self
                .client
                .create_virtual_machine(resource_group, plan.vm_spec, plan.network_interfaces, None)
                .await
                .map_err(|e| AttemptFailure {
                    error: e.into(),
                    availability_set: None,
                    vm_created: false,
                });
        };

        // Concurrent creators share the read side; deleting the set needs the
        // write side, so no member can appear once a deleter is admitted.
        let guard = self
            .availability_sets
            .enter(&spec.name)
            .await
            .map_err(|error| AttemptFailure {
                error,
                availability_set: None,
                vm_created: false,
            })?;

        let mut joined = None;
        let result = async {
            let set = self
                .availability_sets
                .get_or_create(resource_group, spec)
                .await?;
            joined = Some(set.name.clone());
            self.client
                .create_virtual_machine(
                    resource_group,
                    plan.vm_spec,
                    plan.network_interfaces,
                    Some(&set),
                )
                .await?;
            Ok::<(), VmError>(())
        }
        .await;
        let vm_created = result.is_ok();

        let released = guard.release().await;
        if let Err(e) = &released {
            let lock_name = rw_lock_name(&spec.name);
            tracing::error!(lock = %lock_name, "failed to release read lock: {}", e);
            self.mark_lock(&lock_name, &e.to_string()).await;
        }
        let error = match (result, released) {
            (Ok(()), Ok(())) => return Ok(()),
            (Err(e), _) => e,
            (Ok(()), Err(e)) => e.into(),
        };
        Err(AttemptFailure {
            error,
            availability_set: joined,
            vm_created,
        })
    }

    async fn mark_lock(&self, name: &str, reason: &str) {
        if let Err(e) = self.locks.mark_for_deletion(name, reason).await {
            tracing::error!(lock = %name, "failed to mark lock for deletion: {}", e);
        }
    }

    /// Remove the VM, its availability set if now empty, and its disks.
    ///
    /// Stops at the first failure.
    async fn cleanup_vm(
        &self,
        identity: &InstanceId,
        availability_set: Option<&str>,
        has_ephemeral_disk: bool,
    ) -> Result<()> {
        let resource_group = identity.resource_group_name();
        let vm_name = identity.vm_name();

        self.client.delete_virtual_machine(resource_group, vm_name).await?;

        if let Some(name) = availability_set {
            self.availability_sets
                .delete_if_empty(resource_group, name)
                .await?;
        }

        match identity.storage_account_name() {
            None => {
                self.disks
                    .delete_disk(resource_group, &self.disks.os_disk_name(vm_name))
                    .await?;
                if has_ephemeral_disk {
                    self.disks
                        .delete_disk(resource_group, &self.disks.ephemeral_disk_name(vm_name))
                        .await?;
                }
            }
            Some(storage_account) => {
                self.blob_disks
                    .delete_disk(storage_account, &self.blob_disks.os_disk_name(vm_name))
                    .await?;
                self.blob_disks
                    .delete_vm_status_files(storage_account, vm_name)
                    .await?;
                if has_ephemeral_disk {
                    self.blob_disks
                        .delete_disk(storage_account, &self.blob_disks.ephemeral_disk_name(vm_name))
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Run every recorded inverse, newest first, collecting failures
    async fn unwind(&self, resource_group: &str, ledger: &mut RollbackLedger) -> Vec<VmError> {
        let mut errors = Vec::new();
        for undo in ledger.unwind_order() {
            tracing::debug!(?undo, "rolling back");
            let result = match &undo {
                Undo::DeletePublicIp { name } => self.delete_public_ip_if_exists(resource_group, name).await,
                Undo::SweepNetworkInterfaces { vm_name } => {
                    self.delete_possible_network_interfaces(resource_group, vm_name)
                        .await
                }
                Undo::DeleteNetworkInterfaces { names } => {
                    let mut result = Ok(());
                    for name in names {
                        if let Err(e) = self.client.delete_network_interface(resource_group, name).await {
                            result = Err(e.into());
                            break;
                        }
                    }
                    result
                }
                Undo::DeregisterGatewayAddress {
                    gateway,
                    ip_address,
                } => self.gateway.deregister(gateway, ip_address).await,
            };
            if let Err(e) = result {
                tracing::error!(?undo, "rollback step failed: {}", e);
                errors.push(e);
            }
        }
        errors
    }

    fn creation_failed(
        &self,
        identity: &InstanceId,
        cause: VmError,
        left_behind: Vec<String>,
        cleanup_errors: Vec<VmError>,
    ) -> VmError {
        let resource_group = identity.resource_group_name();
        let vm_name = identity.vm_name();
        let mut message = String::new();

        if !left_behind.is_empty() {
            if matches!(cause, VmError::Cleanup { .. }) {
                message.push_str(
                    "The VM fails in provisioning but an error is thrown in cleaning up the VM, OS disk or ephemeral disk.\n",
                );
            } else if cause.is_lock_error() {
                message.push_str(
                    "The VM fails in provisioning and retrying it is aborted by a lock error.\n",
                );
            } else {
                message.push_str("This VM fails in provisioning after multiple retries.\n");
            }
            message.push_str(
                "You need to delete below resources manually after finishing investigation.\n",
            );
            message.push_str(&format!("\t Resource Group: {}\n", resource_group));
            for resource in &left_behind {
                message.push_str(&format!("\t {}\n", resource));
            }
        } else {
            message.push_str(&format!(
                "Failed to create the VM `{}' in the resource group `{}'.\n",
                vm_name, resource_group
            ));
        }

        if !cleanup_errors.is_empty() {
            message.push_str(
                "The VM fails in creating but an error is thrown in cleaning up network interfaces or dynamic public IP.\n",
            );
            for e in &cleanup_errors {
                message.push_str(&format!("\t {}\n", e));
            }
        }

        message.push_str(&cause.to_string());
        // Manifests only know `instance_type`
        let message = message.replace("vmSize", "instance_type");

        VmError::CreationFailed {
            resource_group: resource_group.to_string(),
            vm_name: vm_name.to_string(),
            left_behind,
            message,
            cause: Box::new(cause),
        }
    }

    /// VM-level resources by exact name, for an operator to remove by hand
    fn vm_resources(&self, identity: &InstanceId, has_ephemeral_disk: bool) -> Vec<String> {
        let vm_name = identity.vm_name();
        let mut resources = vec![format!("Virtual Machine: {}", vm_name)];

        match identity.storage_account_name() {
            None => {
                resources.push(format!("Managed OS Disk: {}", self.disks.os_disk_name(vm_name)));
                if has_ephemeral_disk {
                    resources.push(format!(
                        "Managed Ephemeral Disk: {}",
                        self.disks.ephemeral_disk_name(vm_name)
                    ));
                }
            }
            Some(storage_account) => {
                let container = self.blob_disks.container();
                resources.push(format!(
                    "OS disk blob: {}.vhd in the container {} in the storage account {} in default resource group",
                    self.blob_disks.os_disk_name(vm_name),
                    container,
                    storage_account
                ));
                if has_ephemeral_disk {
                    resources.push(format!(
                        "Ephemeral disk blob: {}.vhd in the container {} in the storage account {} in default resource group",
                        self.blob_disks.ephemeral_disk_name(vm_name),
                        container,
                        storage_account
                    ));
                }
                resources.push(format!(
                    "VM status blobs: All blobs which match the pattern /^{}.*status$/ in the container {} in the storage account {} in default resource group",
                    vm_name, container, storage_account
                ));
            }
        }
        resources
    }

    /// Create the resource group if it is missing.
    ///
    /// Not lock protected: concurrent first creates rely on the API treating
    /// create as create-if-not-exists.
    async fn ensure_resource_group(&self, resource_group: &str, location: &str) -> Result<()> {
        if self.client.get_resource_group(resource_group).await?.is_some() {
            return Ok(());
        }
        tracing::info!("Creating resource group `{}' in `{}'", resource_group, location);
        self.client
            .create_resource_group(resource_group, location)
            .await?;
        Ok(())
    }

    async fn os_and_ephemeral_disks(
        &self,
        identity: &InstanceId,
        image: &ImageMetadata,
        pool: &ResourcePool,
    ) -> Result<(OsDisk, Option<EphemeralDisk>)> {
        let vm_name = identity.vm_name();
        match identity.storage_account_name() {
            None => Ok((
                self.disks.os_disk(vm_name, image, pool).await?,
                self.disks.ephemeral_disk(vm_name, pool).await?,
            )),
            Some(storage_account) => Ok((
                self.blob_disks
                    .os_disk(storage_account, vm_name, image, pool)
                    .await?,
                self.blob_disks
                    .ephemeral_disk(storage_account, vm_name, pool)
                    .await?,
            )),
        }
    }

    /// Boot diagnostics endpoint, only when the default storage account is in
    /// the VM's location. Never fails the create.
    async fn diagnostics_endpoint(&self, location: &str) -> Option<String> {
        if !self.properties.debug_mode {
            return None;
        }
        match self.storage_accounts.default_storage_account().await {
            Ok(Some(account)) if account.location.eq_ignore_ascii_case(location) => {
                Some(account.blob_endpoint)
            }
            Ok(Some(account)) => {
                tracing::warn!(
                    "Default storage account `{}' is in different region `{}', ignore boot diagnostics.",
                    account.name,
                    account.location
                );
                None
            }
            Ok(None) => {
                tracing::warn!("No default storage account, ignore boot diagnostics.");
                None
            }
            Err(e) => {
                tracing::warn!("Failed to look up the default storage account, ignore boot diagnostics: {}", e);
                None
            }
        }
    }

    pub async fn find(&self, identity: &InstanceId) -> Result<Option<VirtualMachine>> {
        Ok(self
            .client
            .get_virtual_machine(identity.resource_group_name(), identity.vm_name())
            .await?)
    }

    /// Delete a VM and everything created for it.
    ///
    /// Safe to repeat after a partial delete: each step is skipped when its
    /// target is already gone.
    pub async fn delete(&self, identity: &InstanceId) -> Result<()> {
        tracing::info!(instance = %identity, "delete");
        let resource_group = identity.resource_group_name();
        let vm_name = identity.vm_name();

        match self.client.get_virtual_machine(resource_group, vm_name).await? {
            Some(vm) => {
                self.client.delete_virtual_machine(resource_group, vm_name).await?;

                if let Some(set) = &vm.availability_set {
                    self.availability_sets
                        .delete_if_empty(resource_group, &set.name)
                        .await?;
                }

                for nic in &vm.network_interfaces {
                    self.delete_network_interface(resource_group, nic).await?;
                }
            }
            None => {
                // The VM went away in an earlier attempt; its primary interface
                // may still remember the availability set.
                let leftovers = self.possible_network_interfaces(resource_group, vm_name).await?;
                // Listing order is unspecified; only the primary interface is tagged
                if let Some(name) = leftovers.iter().find_map(|nic| nic.tag(TAG_AVAILABILITY_SET)) {
                    self.availability_sets
                        .delete_if_empty(resource_group, name)
                        .await?;
                }
                for nic in &leftovers {
                    self.delete_network_interface(resource_group, nic).await?;
                }
            }
        }

        self.delete_public_ip_if_exists(resource_group, vm_name).await?;

        match identity.storage_account_name() {
            None => {
                self.disks
                    .delete_disk(resource_group, &self.disks.os_disk_name(vm_name))
                    .await?;
                self.disks
                    .delete_disk(resource_group, &self.disks.ephemeral_disk_name(vm_name))
                    .await?;
            }
            Some(storage_account) => {
                self.blob_disks
                    .delete_disk(storage_account, &self.blob_disks.os_disk_name(vm_name))
                    .await?;
                self.blob_disks
                    .delete_disk(storage_account, &self.blob_disks.ephemeral_disk_name(vm_name))
                    .await?;
                self.blob_disks
                    .delete_vm_status_files(storage_account, vm_name)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn reboot(&self, identity: &InstanceId) -> Result<()> {
        tracing::info!(instance = %identity, "reboot");
        self.client
            .restart_virtual_machine(identity.resource_group_name(), identity.vm_name())
            .await?;
        Ok(())
    }

    /// Replace the VM's tags with `metadata` plus the system tags
    pub async fn set_metadata(&self, identity: &InstanceId, metadata: &Tags) -> Result<()> {
        tracing::info!(instance = %identity, ?metadata, "set_metadata");
        self.client
            .update_tags_of_virtual_machine(
                identity.resource_group_name(),
                identity.vm_name(),
                &builder::merge_system_tags(metadata),
            )
            .await?;
        Ok(())
    }

    /// Attach a data disk and return its logical unit number
    pub async fn attach_disk(&self, identity: &InstanceId, disk: &DiskId) -> Result<String> {
        tracing::info!(instance = %identity, disk = %disk, "attach_disk");

        let source = if identity.use_managed_disks() {
            let managed = self
                .client
                .get_managed_disk(disk.resource_group_name(), disk.disk_name())
                .await?
                .ok_or_else(|| {
                    VmError::NotFound(format!(
                        "Cannot find the managed disk `{}' in the resource group `{}'",
                        disk.disk_name(),
                        disk.resource_group_name()
                    ))
                })?;
            DataDiskSource::Managed {
                resource_id: managed.id,
            }
        } else {
            DataDiskSource::Blob {
                uri: self.blob_disks.data_disk_uri(disk).await?,
                size_gb: self.blob_disks.disk_size_in_gb(disk).await?,
            }
        };

        let attachment = DataDiskAttachment {
            disk_name: disk.disk_name().to_string(),
            caching: disk.caching().to_string(),
            disk_id: disk.to_string(),
            source,
        };
        let lun = self
            .client
            .attach_disk_to_virtual_machine(
                identity.resource_group_name(),
                identity.vm_name(),
                &attachment,
            )
            .await?;
        Ok(lun.to_string())
    }

    pub async fn detach_disk(&self, identity: &InstanceId, disk: &DiskId) -> Result<()> {
        tracing::info!(instance = %identity, disk = %disk, "detach_disk");
        self.client
            .detach_disk_from_virtual_machine(
                identity.resource_group_name(),
                identity.vm_name(),
                disk.disk_name(),
            )
            .await?;
        Ok(())
    }

    /// Interfaces named `<vm_name>-<n>`
    async fn possible_network_interfaces(
        &self,
        resource_group: &str,
        vm_name: &str,
    ) -> Result<Vec<NetworkInterface>> {
        let prefix = format!("{}-", vm_name);
        Ok(self
            .client
            .list_network_interfaces_by_keyword(resource_group, vm_name)
            .await?
            .into_iter()
            .filter(|nic| nic.name.starts_with(&prefix))
            .collect())
    }

    async fn delete_possible_network_interfaces(
        &self,
        resource_group: &str,
        vm_name: &str,
    ) -> Result<()> {
        for nic in self.possible_network_interfaces(resource_group, vm_name).await? {
            self.client
                .delete_network_interface(resource_group, &nic.name)
                .await?;
        }
        Ok(())
    }

    /// Deregister from the application gateway first, then delete
    async fn delete_network_interface(&self, resource_group: &str, nic: &NetworkInterface) -> Result<()> {
        if let (Some(gateway), Some(ip_address)) = (nic.tag(TAG_APPLICATION_GATEWAY), &nic.private_ip) {
            self.gateway.deregister(gateway, ip_address).await?;
        }
        self.client
            .delete_network_interface(resource_group, &nic.name)
            .await?;
        Ok(())
    }

    async fn delete_public_ip_if_exists(&self, resource_group: &str, name: &str) -> Result<()> {
        if self.client.get_public_ip(resource_group, name).await?.is_some() {
            tracing::info!("Deleting dynamic public IP `{}'", name);
            self.client.delete_public_ip(resource_group, name).await?;
        }
        Ok(())
    }
}
