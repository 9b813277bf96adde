//! In-memory cloud and disk collaborators that record every call

#![allow(dead_code)]

use async_trait::async_trait;
use nodeflow_cloud::{
    AvailabilitySet, AvailabilitySetRef, AvailabilitySetSpec, CloudClient, CloudError,
    DataDiskAttachment, EphemeralDisk, LoadBalancer, ManagedDisk, NetworkInterface,
    NetworkInterfaceSpec, OsDisk, OsType, PublicIp, PublicIpSpec, ResourceGroup, SecurityGroup,
    Subnet, Tags, VirtualMachine, VmSpec,
};
use nodeflow_config::{CloudProperties, ResourcePool};
use nodeflow_lock::{HolderInfo, LockConfig, LockCoordinator};
use nodeflow_vm::{
    BlobDiskManager, DiskId, DiskManager, ImageMetadata, InstanceId, Network, NetworkKind,
    NetworkTopology, StorageAccount, StorageAccountManager, VmEnvironment, VmManager,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const RESOURCE_GROUP: &str = "bosh-rg";
pub const LOCATION: &str = "eastus";
pub const VNET: &str = "boshvnet";
pub const SUBNET: &str = "bosh";
pub const SECURITY_GROUP: &str = "nsg-bosh";
pub const STORAGE_ACCOUNT: &str = "boshsa";

/// Ordered `"<operation> <target>"` entries shared by every fake
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, op: &str, target: &str) {
        self.0.lock().unwrap().push(format!("{} {}", op, target));
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| op_of(c) == op).count()
    }

    /// Number of calls whose operation contains `fragment`
    pub fn count_matching(&self, fragment: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| op_of(c).contains(fragment))
            .count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn contains(&self, call: &str) -> bool {
        self.position(call).is_some()
    }
}

fn op_of(call: &str) -> &str {
    call.split_once(' ').map(|(op, _)| op).unwrap_or(call)
}

pub fn provisioning_failed() -> CloudError {
    CloudError::AsyncOperationFailed {
        status: "Failed".to_string(),
        message: "OS Provisioning for VM did not finish in the allotted time".to_string(),
    }
}

pub fn bad_request() -> CloudError {
    CloudError::Api {
        status: 400,
        message: "The value Standard_Foo of parameter vmSize is invalid".to_string(),
    }
}

pub fn server_error() -> CloudError {
    CloudError::Api {
        status: 500,
        message: "InternalServerError".to_string(),
    }
}

struct Injected {
    /// `None` fails forever
    remaining: Option<usize>,
    make: fn() -> CloudError,
}

#[derive(Default)]
struct State {
    resource_groups: BTreeMap<String, ResourceGroup>,
    vms: BTreeMap<String, VirtualMachine>,
    nics: BTreeMap<String, NetworkInterface>,
    public_ips: BTreeMap<String, PublicIp>,
    availability_sets: BTreeMap<String, AvailabilitySet>,
    subnets: BTreeSet<String>,
    security_groups: BTreeSet<String>,
    load_balancers: BTreeSet<String>,
    managed_disks: BTreeMap<String, ManagedDisk>,
    backend_pools: BTreeMap<String, Vec<String>>,
    next_lun: u32,
}

pub struct FakeCloud {
    log: CallLog,
    state: Mutex<State>,
    failures: Mutex<BTreeMap<String, Injected>>,
    hooks: Mutex<BTreeMap<String, Hook>>,
    list_reversed: AtomicBool,
    availability_set_create_delay: Duration,
}

type Hook = Box<dyn FnOnce() + Send>;

impl FakeCloud {
    pub fn new(log: CallLog) -> Self {
        let mut state = State::default();
        state.subnets.insert(format!("{}/{}/{}", RESOURCE_GROUP, VNET, SUBNET));
        state
            .security_groups
            .insert(format!("{}/{}", RESOURCE_GROUP, SECURITY_GROUP));
        Self {
            log,
            state: Mutex::new(state),
            failures: Mutex::new(BTreeMap::new()),
            hooks: Mutex::new(BTreeMap::new()),
            list_reversed: AtomicBool::new(false),
            availability_set_create_delay: Duration::from_millis(100),
        }
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Fail `op` the next `times` calls, or every call when `None`
    pub fn fail(&self, op: &str, times: Option<usize>, make: fn() -> CloudError) {
        self.failures.lock().unwrap().insert(
            op.to_string(),
            Injected {
                remaining: times,
                make,
            },
        );
    }

    /// List network interfaces in descending name order
    pub fn list_in_reverse(&self) {
        self.list_reversed.store(true, Ordering::SeqCst);
    }

    /// Run `hook` once, on the next call of `op`
    pub fn on_call(&self, op: &str, hook: impl FnOnce() + Send + 'static) {
        self.hooks
            .lock()
            .unwrap()
            .insert(op.to_string(), Box::new(hook));
    }

    fn call(&self, op: &str, target: &str) -> nodeflow_cloud::Result<()> {
        self.log.push(op, target);
        let hook = self.hooks.lock().unwrap().remove(op);
        if let Some(hook) = hook {
            hook();
        }
        let mut failures = self.failures.lock().unwrap();
        let Some(injected) = failures.get_mut(op) else {
            return Ok(());
        };
        match &mut injected.remaining {
            Some(0) => Ok(()),
            Some(n) => {
                *n -= 1;
                Err((injected.make)())
            }
            None => Err((injected.make)()),
        }
    }

    pub fn add_security_group(&self, resource_group: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .security_groups
            .insert(format!("{}/{}", resource_group, name));
    }

    pub fn add_load_balancer(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .load_balancers
            .insert(name.to_string());
    }

    pub fn add_availability_set(&self, set: AvailabilitySet) {
        self.state
            .lock()
            .unwrap()
            .availability_sets
            .insert(set.name.clone(), set);
    }

    pub fn add_virtual_machine(&self, vm: VirtualMachine) {
        self.state.lock().unwrap().vms.insert(vm.name.clone(), vm);
    }

    pub fn add_network_interface(&self, nic: NetworkInterface) {
        self.state
            .lock()
            .unwrap()
            .nics
            .insert(nic.name.clone(), nic);
    }

    pub fn add_public_ip(&self, ip: PublicIp) {
        self.state
            .lock()
            .unwrap()
            .public_ips
            .insert(ip.name.clone(), ip);
    }

    pub fn add_managed_disk(&self, disk: ManagedDisk) {
        self.state
            .lock()
            .unwrap()
            .managed_disks
            .insert(disk.name.clone(), disk);
    }

    pub fn add_backend_address(&self, gateway: &str, ip_address: &str) {
        self.state
            .lock()
            .unwrap()
            .backend_pools
            .entry(gateway.to_string())
            .or_default()
            .push(ip_address.to_string());
    }

    pub fn availability_set(&self, name: &str) -> Option<AvailabilitySet> {
        self.state.lock().unwrap().availability_sets.get(name).cloned()
    }

    pub fn virtual_machine(&self, name: &str) -> Option<VirtualMachine> {
        self.state.lock().unwrap().vms.get(name).cloned()
    }

    pub fn network_interface_names(&self) -> Vec<String> {
        self.state.lock().unwrap().nics.keys().cloned().collect()
    }

    pub fn public_ip_names(&self) -> Vec<String> {
        self.state.lock().unwrap().public_ips.keys().cloned().collect()
    }

    pub fn backend_addresses(&self, gateway: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .backend_pools
            .get(gateway)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CloudClient for FakeCloud {
    async fn get_resource_group(&self, name: &str) -> nodeflow_cloud::Result<Option<ResourceGroup>> {
        self.call("get_resource_group", name)?;
        Ok(self.state.lock().unwrap().resource_groups.get(name).cloned())
    }

    async fn create_resource_group(&self, name: &str, location: &str) -> nodeflow_cloud::Result<()> {
        self.call("create_resource_group", name)?;
        self.state.lock().unwrap().resource_groups.insert(
            name.to_string(),
            ResourceGroup {
                name: name.to_string(),
                location: location.to_string(),
            },
        );
        Ok(())
    }

    async fn get_virtual_machine(
        &self,
        _resource_group: &str,
        name: &str,
    ) -> nodeflow_cloud::Result<Option<VirtualMachine>> {
        self.call("get_virtual_machine", name)?;
        Ok(self.state.lock().unwrap().vms.get(name).cloned())
    }

    async fn create_virtual_machine(
        &self,
        _resource_group: &str,
        spec: &VmSpec,
        network_interfaces: &[NetworkInterface],
        availability_set: Option<&AvailabilitySet>,
    ) -> nodeflow_cloud::Result<()> {
        self.call("create_virtual_machine", &spec.name)?;
        let id = format!("/vms/{}", spec.name);
        let mut state = self.state.lock().unwrap();
        if let Some(set) = availability_set
            && let Some(stored) = state.availability_sets.get_mut(&set.name)
        {
            stored.virtual_machines.push(id.clone());
        }
        state.vms.insert(
            spec.name.clone(),
            VirtualMachine {
                id: id.clone(),
                name: spec.name.clone(),
                location: spec.location.clone(),
                vm_size: spec.vm_size.clone(),
                availability_set: availability_set.map(|set| AvailabilitySetRef {
                    id: set.id.clone(),
                    name: set.name.clone(),
                }),
                network_interfaces: network_interfaces.to_vec(),
                provisioning_state: Some("Succeeded".to_string()),
                tags: spec.tags.clone(),
            },
        );
        Ok(())
    }

    async fn delete_virtual_machine(&self, _resource_group: &str, name: &str) -> nodeflow_cloud::Result<()> {
        self.call("delete_virtual_machine", name)?;
        let mut state = self.state.lock().unwrap();
        if let Some(vm) = state.vms.remove(name) {
            for set in state.availability_sets.values_mut() {
                set.virtual_machines.retain(|id| id != &vm.id);
            }
        }
        Ok(())
    }

    async fn restart_virtual_machine(&self, _resource_group: &str, name: &str) -> nodeflow_cloud::Result<()> {
        self.call("restart_virtual_machine", name)
    }

    async fn update_tags_of_virtual_machine(
        &self,
        _resource_group: &str,
        name: &str,
        tags: &Tags,
    ) -> nodeflow_cloud::Result<()> {
        self.call("update_tags_of_virtual_machine", name)?;
        let mut state = self.state.lock().unwrap();
        let vm = state
            .vms
            .get_mut(name)
            .ok_or_else(|| CloudError::NotFound(name.to_string()))?;
        vm.tags = tags.clone();
        Ok(())
    }

    async fn attach_disk_to_virtual_machine(
        &self,
        _resource_group: &str,
        vm_name: &str,
        disk: &DataDiskAttachment,
    ) -> nodeflow_cloud::Result<u32> {
        self.call("attach_disk_to_virtual_machine", &disk.disk_name)?;
        let mut state = self.state.lock().unwrap();
        if !state.vms.contains_key(vm_name) {
            return Err(CloudError::NotFound(vm_name.to_string()));
        }
        let lun = state.next_lun;
        state.next_lun += 1;
        Ok(lun)
    }

    async fn detach_disk_from_virtual_machine(
        &self,
        _resource_group: &str,
        _vm_name: &str,
        disk_name: &str,
    ) -> nodeflow_cloud::Result<()> {
        self.call("detach_disk_from_virtual_machine", disk_name)
    }

    async fn get_network_interface(
        &self,
        _resource_group: &str,
        name: &str,
    ) -> nodeflow_cloud::Result<Option<NetworkInterface>> {
        self.call("get_network_interface", name)?;
        Ok(self.state.lock().unwrap().nics.get(name).cloned())
    }

    async fn create_network_interface(
        &self,
        _resource_group: &str,
        spec: &NetworkInterfaceSpec,
        _subnet: &Subnet,
        tags: &Tags,
        _load_balancer: Option<&LoadBalancer>,
    ) -> nodeflow_cloud::Result<()> {
        self.call("create_network_interface", &spec.name)?;
        self.state.lock().unwrap().nics.insert(
            spec.name.clone(),
            NetworkInterface {
                id: format!("/nics/{}", spec.name),
                name: spec.name.clone(),
                location: spec.location.clone(),
                private_ip: spec.private_ip.clone(),
                public_ip: spec.public_ip.clone(),
                tags: tags.clone(),
            },
        );
        Ok(())
    }

    async fn delete_network_interface(&self, _resource_group: &str, name: &str) -> nodeflow_cloud::Result<()> {
        self.call("delete_network_interface", name)?;
        self.state.lock().unwrap().nics.remove(name);
        Ok(())
    }

    async fn list_network_interfaces_by_keyword(
        &self,
        _resource_group: &str,
        keyword: &str,
    ) -> nodeflow_cloud::Result<Vec<NetworkInterface>> {
        self.call("list_network_interfaces_by_keyword", keyword)?;
        let mut nics: Vec<NetworkInterface> = self
            .state
            .lock()
            .unwrap()
            .nics
            .values()
            .filter(|nic| nic.name.contains(keyword))
            .cloned()
            .collect();
        if self.list_reversed.load(Ordering::SeqCst) {
            nics.reverse();
        }
        Ok(nics)
    }

    async fn get_public_ip(&self, _resource_group: &str, name: &str) -> nodeflow_cloud::Result<Option<PublicIp>> {
        self.call("get_public_ip", name)?;
        Ok(self.state.lock().unwrap().public_ips.get(name).cloned())
    }

    async fn list_public_ips(&self, resource_group: &str) -> nodeflow_cloud::Result<Vec<PublicIp>> {
        self.call("list_public_ips", resource_group)?;
        Ok(self.state.lock().unwrap().public_ips.values().cloned().collect())
    }

    async fn create_public_ip(&self, _resource_group: &str, spec: &PublicIpSpec) -> nodeflow_cloud::Result<()> {
        self.call("create_public_ip", &spec.name)?;
        self.state.lock().unwrap().public_ips.insert(
            spec.name.clone(),
            PublicIp {
                id: format!("/publicIPAddresses/{}", spec.name),
                name: spec.name.clone(),
                location: spec.location.clone(),
                ip_address: Some("52.0.0.10".to_string()),
                is_static: spec.is_static,
                idle_timeout_in_minutes: Some(spec.idle_timeout_in_minutes),
            },
        );
        Ok(())
    }

    async fn delete_public_ip(&self, _resource_group: &str, name: &str) -> nodeflow_cloud::Result<()> {
        self.call("delete_public_ip", name)?;
        self.state.lock().unwrap().public_ips.remove(name);
        Ok(())
    }

    async fn get_availability_set(
        &self,
        _resource_group: &str,
        name: &str,
    ) -> nodeflow_cloud::Result<Option<AvailabilitySet>> {
        self.call("get_availability_set", name)?;
        Ok(self.state.lock().unwrap().availability_sets.get(name).cloned())
    }

    async fn create_availability_set(
        &self,
        _resource_group: &str,
        spec: &AvailabilitySetSpec,
    ) -> nodeflow_cloud::Result<()> {
        self.call("create_availability_set", &spec.name)?;
        tokio::time::sleep(self.availability_set_create_delay).await;
        let mut state = self.state.lock().unwrap();
        if state.availability_sets.contains_key(&spec.name) {
            return Err(CloudError::Api {
                status: 409,
                message: format!("availability set {} already exists", spec.name),
            });
        }
        state
            .availability_sets
            .insert(spec.name.clone(), availability_set_from(spec));
        Ok(())
    }

    async fn update_availability_set(
        &self,
        _resource_group: &str,
        spec: &AvailabilitySetSpec,
    ) -> nodeflow_cloud::Result<()> {
        self.call("update_availability_set", &spec.name)?;
        let mut state = self.state.lock().unwrap();
        let members = state
            .availability_sets
            .get(&spec.name)
            .map(|set| set.virtual_machines.clone())
            .unwrap_or_default();
        let mut updated = availability_set_from(spec);
        updated.virtual_machines = members;
        state.availability_sets.insert(spec.name.clone(), updated);
        Ok(())
    }

    async fn delete_availability_set(&self, _resource_group: &str, name: &str) -> nodeflow_cloud::Result<()> {
        self.call("delete_availability_set", name)?;
        self.state.lock().unwrap().availability_sets.remove(name);
        Ok(())
    }

    async fn get_subnet(
        &self,
        resource_group: &str,
        virtual_network: &str,
        subnet: &str,
    ) -> nodeflow_cloud::Result<Option<Subnet>> {
        let key = format!("{}/{}/{}", resource_group, virtual_network, subnet);
        self.call("get_subnet", &key)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .subnets
            .contains(&key)
            .then(|| Subnet {
                id: format!("/subnets/{}", key),
                name: subnet.to_string(),
            }))
    }

    async fn get_security_group(
        &self,
        resource_group: &str,
        name: &str,
    ) -> nodeflow_cloud::Result<Option<SecurityGroup>> {
        let key = format!("{}/{}", resource_group, name);
        self.call("get_security_group", &key)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .security_groups
            .contains(&key)
            .then(|| SecurityGroup {
                id: format!("/networkSecurityGroups/{}", key),
                name: name.to_string(),
            }))
    }

    async fn get_load_balancer(&self, name: &str) -> nodeflow_cloud::Result<Option<LoadBalancer>> {
        self.call("get_load_balancer", name)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .load_balancers
            .contains(name)
            .then(|| LoadBalancer {
                id: format!("/loadBalancers/{}", name),
                name: name.to_string(),
                backend_address_pool_ids: vec![format!("/loadBalancers/{}/pools/0", name)],
            }))
    }

    async fn get_managed_disk(
        &self,
        _resource_group: &str,
        name: &str,
    ) -> nodeflow_cloud::Result<Option<ManagedDisk>> {
        self.call("get_managed_disk", name)?;
        Ok(self.state.lock().unwrap().managed_disks.get(name).cloned())
    }

    async fn list_gateway_backend_addresses(&self, gateway: &str) -> nodeflow_cloud::Result<Vec<String>> {
        self.call("list_gateway_backend_addresses", gateway)?;
        Ok(self.backend_addresses(gateway))
    }

    async fn add_gateway_backend_address(&self, gateway: &str, ip_address: &str) -> nodeflow_cloud::Result<()> {
        self.call("add_gateway_backend_address", ip_address)?;
        self.add_backend_address(gateway, ip_address);
        Ok(())
    }

    async fn delete_gateway_backend_address(
        &self,
        gateway: &str,
        ip_address: &str,
    ) -> nodeflow_cloud::Result<()> {
        self.call("delete_gateway_backend_address", ip_address)?;
        if let Some(pool) = self.state.lock().unwrap().backend_pools.get_mut(gateway) {
            pool.retain(|addr| addr != ip_address);
        }
        Ok(())
    }
}

fn availability_set_from(spec: &AvailabilitySetSpec) -> AvailabilitySet {
    AvailabilitySet {
        id: format!("/availabilitySets/{}", spec.name),
        name: spec.name.clone(),
        location: spec.location.clone(),
        platform_update_domain_count: spec.platform_update_domain_count,
        platform_fault_domain_count: spec.platform_fault_domain_count,
        managed: spec.managed,
        virtual_machines: vec![],
        tags: spec.tags.clone(),
    }
}

/// Managed and blob disk collaborator in one, logging to the shared call log
pub struct FakeDisks {
    log: CallLog,
    failures: Mutex<BTreeSet<String>>,
}

impl FakeDisks {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            failures: Mutex::new(BTreeSet::new()),
        }
    }

    /// Fail every call of `op`
    pub fn fail(&self, op: &str) {
        self.failures.lock().unwrap().insert(op.to_string());
    }

    fn call(&self, op: &str, target: &str) -> nodeflow_vm::Result<()> {
        self.log.push(op, target);
        if self.failures.lock().unwrap().contains(op) {
            return Err(server_error().into());
        }
        Ok(())
    }

    fn ephemeral(vm_name: &str, pool: &ResourcePool, uri: Option<String>) -> Option<EphemeralDisk> {
        if pool.ephemeral_disk.as_ref().is_some_and(|e| e.use_root_disk) {
            return None;
        }
        Some(EphemeralDisk {
            disk_name: format!("bosh-ephemeral-{}", vm_name),
            disk_uri: uri,
            disk_size_gb: pool
                .ephemeral_disk
                .as_ref()
                .and_then(|e| e.size)
                .map(|mb| mb / 1024)
                .unwrap_or(30),
            disk_caching: "ReadWrite".to_string(),
            storage_account_type: pool.storage_account_type.clone(),
        })
    }
}

#[async_trait]
impl DiskManager for FakeDisks {
    fn os_disk_name(&self, vm_name: &str) -> String {
        format!("bosh-os-{}", vm_name)
    }

    fn ephemeral_disk_name(&self, vm_name: &str) -> String {
        format!("bosh-ephemeral-{}", vm_name)
    }

    async fn os_disk(
        &self,
        vm_name: &str,
        _image: &ImageMetadata,
        pool: &ResourcePool,
    ) -> nodeflow_vm::Result<OsDisk> {
        Ok(OsDisk {
            disk_name: DiskManager::os_disk_name(self, vm_name),
            disk_uri: None,
            disk_size_gb: pool.root_disk.as_ref().and_then(|r| r.size).map(|mb| mb / 1024),
            disk_caching: pool.caching.clone().unwrap_or_else(|| "ReadWrite".to_string()),
            storage_account_type: pool.storage_account_type.clone(),
        })
    }

    async fn ephemeral_disk(
        &self,
        vm_name: &str,
        pool: &ResourcePool,
    ) -> nodeflow_vm::Result<Option<EphemeralDisk>> {
        Ok(Self::ephemeral(vm_name, pool, None))
    }

    async fn delete_disk(&self, _resource_group: &str, disk_name: &str) -> nodeflow_vm::Result<()> {
        self.call("delete_disk", disk_name)
    }
}

#[async_trait]
impl BlobDiskManager for FakeDisks {
    fn container(&self) -> &str {
        "bosh"
    }

    fn os_disk_name(&self, vm_name: &str) -> String {
        format!("bosh-os-{}", vm_name)
    }

    fn ephemeral_disk_name(&self, vm_name: &str) -> String {
        format!("bosh-ephemeral-{}", vm_name)
    }

    async fn os_disk(
        &self,
        storage_account: &str,
        vm_name: &str,
        _image: &ImageMetadata,
        pool: &ResourcePool,
    ) -> nodeflow_vm::Result<OsDisk> {
        let disk_name = BlobDiskManager::os_disk_name(self, vm_name);
        Ok(OsDisk {
            disk_uri: Some(format!(
                "https://{}.blob.core.windows.net/bosh/{}.vhd",
                storage_account, disk_name
            )),
            disk_name,
            disk_size_gb: pool.root_disk.as_ref().and_then(|r| r.size).map(|mb| mb / 1024),
            disk_caching: "ReadWrite".to_string(),
            storage_account_type: None,
        })
    }

    async fn ephemeral_disk(
        &self,
        storage_account: &str,
        vm_name: &str,
        pool: &ResourcePool,
    ) -> nodeflow_vm::Result<Option<EphemeralDisk>> {
        let uri = format!(
            "https://{}.blob.core.windows.net/bosh/bosh-ephemeral-{}.vhd",
            storage_account, vm_name
        );
        Ok(Self::ephemeral(vm_name, pool, Some(uri)))
    }

    async fn delete_disk(&self, _storage_account: &str, disk_name: &str) -> nodeflow_vm::Result<()> {
        self.call("delete_blob", disk_name)
    }

    async fn delete_vm_status_files(&self, _storage_account: &str, vm_name: &str) -> nodeflow_vm::Result<()> {
        self.call("delete_vm_status_files", vm_name)
    }

    async fn data_disk_uri(&self, disk: &DiskId) -> nodeflow_vm::Result<String> {
        self.call("data_disk_uri", disk.disk_name())?;
        Ok(format!(
            "https://{}.blob.core.windows.net/bosh/{}.vhd",
            disk.storage_account_name().unwrap_or(STORAGE_ACCOUNT),
            disk.disk_name()
        ))
    }

    async fn disk_size_in_gb(&self, disk: &DiskId) -> nodeflow_vm::Result<u32> {
        self.call("disk_size_in_gb", disk.disk_name())?;
        Ok(42)
    }
}

pub struct FakeStorage {
    pub account: Option<StorageAccount>,
}

#[async_trait]
impl StorageAccountManager for FakeStorage {
    async fn default_storage_account(&self) -> nodeflow_vm::Result<Option<StorageAccount>> {
        Ok(self.account.clone())
    }
}

pub fn properties(use_managed_disks: bool, lock_dir: &std::path::Path) -> CloudProperties {
    let mut properties = CloudProperties::from_yaml(&format!(
        "resource_group_name: {}\nssh_user: vcap\nssh_public_key: ssh-rsa AAAAB3Nza\nregistry_endpoint: http://registry:25777\ndefault_security_group: {}\n",
        RESOURCE_GROUP, SECURITY_GROUP
    ))
    .unwrap();
    properties.use_managed_disks = use_managed_disks;
    properties.lock.dir = Some(lock_dir.to_path_buf());
    properties.lock.gateway_timeout_secs = 2;
    properties
}

/// Leave the state guard of readers/writer lock `name` behind, as a process
/// that died while rewriting the lock state would
pub fn plant_state_guard(lock_dir: &std::path::Path, name: &str) {
    let holder = HolderInfo::new("crashed-process");
    std::fs::write(
        lock_dir.join(format!("{}.rwlock.guard", name)),
        serde_json::to_string(&holder).unwrap(),
    )
    .unwrap();
}

pub fn lock_config() -> LockConfig {
    LockConfig::new(Duration::from_secs(5), Duration::from_millis(10))
}

/// Everything a test needs to drive a [`VmManager`] against the fakes
pub struct Harness {
    pub cloud: Arc<FakeCloud>,
    pub disks: Arc<FakeDisks>,
    pub locks: LockCoordinator,
    pub manager: VmManager,
    pub log: CallLog,
    _dir: TempDir,
}

impl Harness {
    pub fn managed() -> Self {
        Self::build(true, lock_config(), None)
    }

    pub fn unmanaged() -> Self {
        Self::build(false, lock_config(), None)
    }

    pub fn with_lock_config(config: LockConfig) -> Self {
        Self::build(true, config, None)
    }

    pub fn with_debug_storage(account: StorageAccount) -> Self {
        Self::build(true, lock_config(), Some(account))
    }

    fn build(managed: bool, config: LockConfig, account: Option<StorageAccount>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let cloud = Arc::new(FakeCloud::new(log.clone()));
        let disks = Arc::new(FakeDisks::new(log.clone()));
        let locks = LockCoordinator::new(dir.path(), config);
        let mut properties = properties(managed, dir.path());
        properties.debug_mode = account.is_some();

        let manager = VmManager::new(
            properties,
            cloud.clone(),
            disks.clone(),
            disks.clone(),
            Arc::new(FakeStorage { account }),
            locks.clone(),
        );
        Self {
            cloud,
            disks,
            locks,
            manager,
            log,
            _dir: dir,
        }
    }

    pub fn identity(&self, vm_name: &str) -> InstanceId {
        InstanceId::managed(RESOURCE_GROUP, vm_name)
    }

    pub fn unmanaged_identity(&self, vm_name: &str) -> InstanceId {
        InstanceId::unmanaged(RESOURCE_GROUP, vm_name, STORAGE_ACCOUNT)
    }

    pub async fn create(
        &self,
        identity: &InstanceId,
        pool: &ResourcePool,
        topology: &NetworkTopology,
    ) -> nodeflow_vm::Result<VmSpec> {
        self.manager
            .create(
                identity,
                LOCATION,
                &image(),
                pool,
                topology,
                &VmEnvironment::default(),
            )
            .await
    }
}

pub fn image() -> ImageMetadata {
    ImageMetadata {
        uri: "/images/bosh-stemcell-ubuntu".to_string(),
        os_type: OsType::Linux,
        image_reference: None,
        image_size_mb: Some(3072),
    }
}

pub fn pool() -> ResourcePool {
    ResourcePool {
        instance_type: Some("Standard_D1_v2".to_string()),
        ..Default::default()
    }
}

pub fn pool_in_set(name: &str) -> ResourcePool {
    ResourcePool {
        availability_set: Some(name.to_string()),
        ..pool()
    }
}

fn network(kind: NetworkKind) -> Network {
    Network {
        name: "default".to_string(),
        kind,
        resource_group_name: RESOURCE_GROUP.to_string(),
        virtual_network_name: VNET.to_string(),
        subnet_name: SUBNET.to_string(),
        security_group: None,
    }
}

pub fn manual_network(private_ip: &str) -> Network {
    network(NetworkKind::Manual {
        private_ip: private_ip.to_string(),
    })
}

pub fn dynamic_network() -> Network {
    network(NetworkKind::Dynamic)
}

pub fn dynamic_topology() -> NetworkTopology {
    NetworkTopology::new(vec![dynamic_network()], None, Some(vec!["168.63.129.16".to_string()]))
        .unwrap()
}

pub fn manual_topology(private_ip: &str) -> NetworkTopology {
    NetworkTopology::new(vec![manual_network(private_ip)], None, None).unwrap()
}

pub fn availability_set(name: &str, managed: bool, members: &[&str]) -> AvailabilitySet {
    AvailabilitySet {
        id: format!("/availabilitySets/{}", name),
        name: name.to_string(),
        location: LOCATION.to_string(),
        platform_update_domain_count: 5,
        platform_fault_domain_count: if managed { 2 } else { 3 },
        managed,
        virtual_machines: members.iter().map(|m| format!("/vms/{}", m)).collect(),
        tags: Tags::new(),
    }
}
