//! Disk and storage collaborators
//!
//! Disk naming, sizing and blob housekeeping belong to the embedding service.
//! The orchestrator only needs deterministic names per VM and a way to remove
//! what it created.

use crate::error::Result;
use crate::identity::DiskId;
use crate::image::ImageMetadata;
use async_trait::async_trait;
use nodeflow_cloud::{EphemeralDisk, OsDisk};
use nodeflow_config::ResourcePool;

/// Managed disk collaborator
#[async_trait]
pub trait DiskManager: Send + Sync {
    fn os_disk_name(&self, vm_name: &str) -> String;

    fn ephemeral_disk_name(&self, vm_name: &str) -> String;

    /// Fails when the resource pool's disk properties are invalid
    async fn os_disk(
        &self,
        vm_name: &str,
        image: &ImageMetadata,
        pool: &ResourcePool,
    ) -> Result<OsDisk>;

    /// `None` when the ephemeral disk lives on the OS disk
    async fn ephemeral_disk(&self, vm_name: &str, pool: &ResourcePool)
    -> Result<Option<EphemeralDisk>>;

    /// Succeeds when the disk does not exist
    async fn delete_disk(&self, resource_group: &str, disk_name: &str) -> Result<()>;
}

/// Unmanaged (blob) disk collaborator
#[async_trait]
pub trait BlobDiskManager: Send + Sync {
    /// Container holding OS, ephemeral and status blobs
    fn container(&self) -> &str;

    fn os_disk_name(&self, vm_name: &str) -> String;

    fn ephemeral_disk_name(&self, vm_name: &str) -> String;

    async fn os_disk(
        &self,
        storage_account: &str,
        vm_name: &str,
        image: &ImageMetadata,
        pool: &ResourcePool,
    ) -> Result<OsDisk>;

    async fn ephemeral_disk(
        &self,
        storage_account: &str,
        vm_name: &str,
        pool: &ResourcePool,
    ) -> Result<Option<EphemeralDisk>>;

    async fn delete_disk(&self, storage_account: &str, disk_name: &str) -> Result<()>;

    /// Remove blobs matching `<vm_name>*status` left by the guest agent
    async fn delete_vm_status_files(&self, storage_account: &str, vm_name: &str) -> Result<()>;

    async fn data_disk_uri(&self, disk: &DiskId) -> Result<String>;

    async fn disk_size_in_gb(&self, disk: &DiskId) -> Result<u32>;
}

/// Storage account used for boot diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageAccount {
    pub name: String,
    pub location: String,
    pub blob_endpoint: String,
}

#[async_trait]
pub trait StorageAccountManager: Send + Sync {
    async fn default_storage_account(&self) -> Result<Option<StorageAccount>>;
}
