//! Remote resource model and request parameters
//!
//! Resource structs (`VirtualMachine`, `NetworkInterface`, ...) describe what the
//! cloud API reports back. `*Spec` structs describe what NodeFlow submits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CloudError;

/// Resource tags. Ordered so that tag payloads are deterministic.
pub type Tags = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Remote resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: String,
    pub name: String,
    pub location: String,
    pub vm_size: String,

    /// Availability set the VM belongs to, if any
    #[serde(default)]
    pub availability_set: Option<AvailabilitySetRef>,

    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,

    #[serde(default)]
    pub provisioning_state: Option<String>,

    #[serde(default)]
    pub tags: Tags,
}

/// Reference from a VM to the availability set it joined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySetRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub id: String,
    pub name: String,
    pub location: String,

    #[serde(default)]
    pub private_ip: Option<String>,

    #[serde(default)]
    pub public_ip: Option<PublicIp>,

    #[serde(default)]
    pub tags: Tags,
}

impl NetworkInterface {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIp {
    pub id: String,
    pub name: String,
    pub location: String,

    #[serde(default)]
    pub ip_address: Option<String>,

    /// `false` for dynamically allocated addresses
    #[serde(default)]
    pub is_static: bool,

    #[serde(default)]
    pub idle_timeout_in_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySet {
    pub id: String,
    pub name: String,
    pub location: String,
    pub platform_update_domain_count: u32,
    pub platform_fault_domain_count: u32,

    /// Whether the set is aligned for managed disks
    pub managed: bool,

    /// Resource ids of the member VMs
    #[serde(default)]
    pub virtual_machines: Vec<String>,

    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub backend_address_pool_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedDisk {
    pub id: String,
    pub name: String,
    pub location: String,

    #[serde(default)]
    pub disk_size_gb: Option<u32>,
}

// ---------------------------------------------------------------------------
// Request parameters
// ---------------------------------------------------------------------------

/// Guest operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    Linux,
    Windows,
}

impl OsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsType {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            other => Err(CloudError::Api {
                status: 400,
                message: format!("unsupported os type `{}'", other),
            }),
        }
    }
}

/// Platform catalog image coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

/// Where the VM image comes from. Exactly one source is ever submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Managed image resource id (managed disks)
    ImageId(String),
    /// Caller-owned image blob (unmanaged disks)
    ImageUri(String),
    /// Platform catalog image (light stemcell)
    Catalog(ImageReference),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsDisk {
    pub disk_name: String,

    /// Blob location; only set for unmanaged disks
    pub disk_uri: Option<String>,

    pub disk_size_gb: Option<u32>,
    pub disk_caching: String,

    /// Storage SKU for managed disks
    pub storage_account_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralDisk {
    pub disk_name: String,
    pub disk_uri: Option<String>,
    pub disk_size_gb: u32,
    pub disk_caching: String,
    pub storage_account_type: Option<String>,
}

/// Administrator credentials for Windows guests.
///
/// These are generated per VM and never handed to operators; `Debug` redacts them.
#[derive(Clone, PartialEq, Eq)]
pub struct WindowsCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for WindowsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowsCredentials")
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// OS-specific provisioning profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsProfile {
    Linux {
        ssh_username: String,
        ssh_public_key: String,
    },
    Windows {
        credentials: WindowsCredentials,
        computer_name: String,
    },
}

impl OsProfile {
    pub fn os_type(&self) -> OsType {
        match self {
            OsProfile::Linux { .. } => OsType::Linux,
            OsProfile::Windows { .. } => OsType::Windows,
        }
    }
}

/// Full declarative description of a VM submitted to the cloud API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSpec {
    pub name: String,
    pub location: String,
    pub tags: Tags,
    pub vm_size: String,
    pub os_disk: OsDisk,
    pub ephemeral_disk: Option<EphemeralDisk>,
    pub image: ImageSource,
    pub os_profile: OsProfile,

    /// Base64-encoded bootstrap payload handed to the guest
    pub custom_data: String,

    pub managed: bool,

    /// Boot diagnostics storage endpoint
    pub diag_storage_uri: Option<String>,

    pub availability_zone: Option<String>,
}

impl VmSpec {
    pub fn os_type(&self) -> OsType {
        self.os_profile.os_type()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterfaceSpec {
    pub name: String,
    pub location: String,
    pub private_ip: Option<String>,

    /// Only the primary interface (index 0) ever carries a public IP
    pub public_ip: Option<PublicIp>,

    pub security_group: SecurityGroup,
    pub ipconfig_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIpSpec {
    pub name: String,
    pub location: String,
    pub is_static: bool,
    pub idle_timeout_in_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilitySetSpec {
    pub name: String,
    pub location: String,
    pub tags: Tags,
    pub platform_update_domain_count: u32,
    pub platform_fault_domain_count: u32,
    pub managed: bool,
}

/// Where an attached data disk lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataDiskSource {
    Managed { resource_id: String },
    Blob { uri: String, size_gb: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDiskAttachment {
    pub disk_name: String,
    pub caching: String,

    /// Caller-facing disk identifier, recorded on the VM for later lookup
    pub disk_id: String,

    pub source: DataDiskSource,
}

impl DataDiskAttachment {
    pub fn is_managed(&self) -> bool {
        matches!(self.source, DataDiskSource::Managed { .. })
    }
}
