//! Cloud API client trait definition

use crate::error::Result;
use crate::model::{
    AvailabilitySet, AvailabilitySetSpec, DataDiskAttachment, LoadBalancer, ManagedDisk,
    NetworkInterface, NetworkInterfaceSpec, PublicIp, PublicIpSpec, ResourceGroup, SecurityGroup,
    Subnet, Tags, VirtualMachine, VmSpec,
};
use async_trait::async_trait;

/// Cloud API abstraction trait
///
/// Implementations own transport, authentication and polling of long-running
/// operations: every call returns only once the remote operation reached a
/// terminal status. A terminal failure is reported as
/// [`CloudError::AsyncOperationFailed`](crate::CloudError::AsyncOperationFailed).
///
/// `get_*` calls return `Ok(None)` when the resource does not exist. `delete_*`
/// calls succeed when the resource is already gone.
#[async_trait]
pub trait CloudClient: Send + Sync {
    // Resource groups

    async fn get_resource_group(&self, name: &str) -> Result<Option<ResourceGroup>>;

    async fn create_resource_group(&self, name: &str, location: &str) -> Result<()>;

    // Virtual machines

    async fn get_virtual_machine(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<VirtualMachine>>;

    /// Create the VM and wait until it is provisioned.
    ///
    /// When `availability_set` is given the VM joins it; membership is visible
    /// on the set once this call returns.
    async fn create_virtual_machine(
        &self,
        resource_group: &str,
        spec: &VmSpec,
        network_interfaces: &[NetworkInterface],
        availability_set: Option<&AvailabilitySet>,
    ) -> Result<()>;

    async fn delete_virtual_machine(&self, resource_group: &str, name: &str) -> Result<()>;

    async fn restart_virtual_machine(&self, resource_group: &str, name: &str) -> Result<()>;

    /// Replace the full tag set of a VM
    async fn update_tags_of_virtual_machine(
        &self,
        resource_group: &str,
        name: &str,
        tags: &Tags,
    ) -> Result<()>;

    /// Attach a data disk and return the logical unit number it was assigned
    async fn attach_disk_to_virtual_machine(
        &self,
        resource_group: &str,
        vm_name: &str,
        disk: &DataDiskAttachment,
    ) -> Result<u32>;

    async fn detach_disk_from_virtual_machine(
        &self,
        resource_group: &str,
        vm_name: &str,
        disk_name: &str,
    ) -> Result<()>;

    // Network interfaces

    async fn get_network_interface(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<NetworkInterface>>;

    async fn create_network_interface(
        &self,
        resource_group: &str,
        spec: &NetworkInterfaceSpec,
        subnet: &Subnet,
        tags: &Tags,
        load_balancer: Option<&LoadBalancer>,
    ) -> Result<()>;

    async fn delete_network_interface(&self, resource_group: &str, name: &str) -> Result<()>;

    /// List network interfaces whose name contains `keyword`
    async fn list_network_interfaces_by_keyword(
        &self,
        resource_group: &str,
        keyword: &str,
    ) -> Result<Vec<NetworkInterface>>;

    // Public IPs

    async fn get_public_ip(&self, resource_group: &str, name: &str) -> Result<Option<PublicIp>>;

    async fn list_public_ips(&self, resource_group: &str) -> Result<Vec<PublicIp>>;

    async fn create_public_ip(&self, resource_group: &str, spec: &PublicIpSpec) -> Result<()>;

    async fn delete_public_ip(&self, resource_group: &str, name: &str) -> Result<()>;

    // Availability sets

    async fn get_availability_set(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<AvailabilitySet>>;

    async fn create_availability_set(
        &self,
        resource_group: &str,
        spec: &AvailabilitySetSpec,
    ) -> Result<()>;

    /// Rewrite an existing availability set in place
    async fn update_availability_set(
        &self,
        resource_group: &str,
        spec: &AvailabilitySetSpec,
    ) -> Result<()>;

    async fn delete_availability_set(&self, resource_group: &str, name: &str) -> Result<()>;

    // Lookups

    async fn get_subnet(
        &self,
        resource_group: &str,
        virtual_network: &str,
        subnet: &str,
    ) -> Result<Option<Subnet>>;

    async fn get_security_group(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<SecurityGroup>>;

    async fn get_load_balancer(&self, name: &str) -> Result<Option<LoadBalancer>>;

    async fn get_managed_disk(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<ManagedDisk>>;

    // Application gateway backend pool

    async fn list_gateway_backend_addresses(&self, gateway: &str) -> Result<Vec<String>>;

    async fn add_gateway_backend_address(&self, gateway: &str, ip_address: &str) -> Result<()>;

    async fn delete_gateway_backend_address(&self, gateway: &str, ip_address: &str)
    -> Result<()>;

    /// Find a public IP in `resource_group` by its address
    async fn find_public_ip_by_address(
        &self,
        resource_group: &str,
        ip_address: &str,
    ) -> Result<Option<PublicIp>> {
        Ok(self
            .list_public_ips(resource_group)
            .await?
            .into_iter()
            .find(|ip| ip.ip_address.as_deref() == Some(ip_address)))
    }
}
