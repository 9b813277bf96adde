//! Instance and disk identifiers
//!
//! Both identifiers serialize to `key:value` pairs joined by `;` with keys in
//! sorted order, e.g. `agent_id:vm-1;resource_group_name:rg`.

use crate::error::{Result, VmError};
use nodeflow_config::CloudProperties;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const KEY_AGENT_ID: &str = "agent_id";
const KEY_RESOURCE_GROUP: &str = "resource_group_name";
const KEY_STORAGE_ACCOUNT: &str = "storage_account_name";
const KEY_DISK_NAME: &str = "disk_name";
const KEY_CACHING: &str = "caching";

fn parse_pairs(s: &str) -> Result<BTreeMap<String, String>> {
    let mut pairs = BTreeMap::new();
    for part in s.split(';').filter(|p| !p.is_empty()) {
        let (key, value) = part
            .split_once(':')
            .ok_or_else(|| VmError::InvalidIdentifier(s.to_string()))?;
        if key.is_empty() || value.is_empty() {
            return Err(VmError::InvalidIdentifier(s.to_string()));
        }
        pairs.insert(key.to_string(), value.to_string());
    }
    Ok(pairs)
}

fn format_pairs(f: &mut fmt::Formatter<'_>, pairs: &BTreeMap<&str, &str>) -> fmt::Result {
    let joined = pairs
        .iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join(";");
    f.write_str(&joined)
}

/// Immutable key of a VM
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceId {
    resource_group_name: String,
    vm_name: String,
    /// Set only when the VM uses unmanaged disks
    storage_account_name: Option<String>,
}

impl InstanceId {
    pub fn managed(resource_group_name: impl Into<String>, vm_name: impl Into<String>) -> Self {
        Self {
            resource_group_name: resource_group_name.into(),
            vm_name: vm_name.into(),
            storage_account_name: None,
        }
    }

    pub fn unmanaged(
        resource_group_name: impl Into<String>,
        vm_name: impl Into<String>,
        storage_account_name: impl Into<String>,
    ) -> Self {
        Self {
            resource_group_name: resource_group_name.into(),
            vm_name: vm_name.into(),
            storage_account_name: Some(storage_account_name.into()),
        }
    }

    /// Build the identity of a new VM according to the disk model in `properties`
    pub fn for_properties(
        properties: &CloudProperties,
        resource_group_name: impl Into<String>,
        vm_name: impl Into<String>,
        storage_account_name: Option<String>,
    ) -> Result<Self> {
        if properties.use_managed_disks {
            return Ok(Self::managed(resource_group_name, vm_name));
        }
        let storage_account_name = storage_account_name.ok_or_else(|| {
            VmError::Configuration(
                "a storage account is required when managed disks are disabled".to_string(),
            )
        })?;
        Ok(Self::unmanaged(resource_group_name, vm_name, storage_account_name))
    }

    pub fn resource_group_name(&self) -> &str {
        &self.resource_group_name
    }

    pub fn vm_name(&self) -> &str {
        &self.vm_name
    }

    pub fn storage_account_name(&self) -> Option<&str> {
        self.storage_account_name.as_deref()
    }

    pub fn use_managed_disks(&self) -> bool {
        self.storage_account_name.is_none()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs = BTreeMap::new();
        pairs.insert(KEY_AGENT_ID, self.vm_name.as_str());
        pairs.insert(KEY_RESOURCE_GROUP, self.resource_group_name.as_str());
        if let Some(sa) = &self.storage_account_name {
            pairs.insert(KEY_STORAGE_ACCOUNT, sa.as_str());
        }
        format_pairs(f, &pairs)
    }
}

impl FromStr for InstanceId {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self> {
        let mut pairs = parse_pairs(s)?;
        let missing = || VmError::InvalidIdentifier(s.to_string());
        Ok(Self {
            vm_name: pairs.remove(KEY_AGENT_ID).ok_or_else(missing)?,
            resource_group_name: pairs.remove(KEY_RESOURCE_GROUP).ok_or_else(missing)?,
            storage_account_name: pairs.remove(KEY_STORAGE_ACCOUNT),
        })
    }
}

/// Identity of a persistent data disk, independent of any VM
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiskId {
    resource_group_name: String,
    disk_name: String,
    caching: String,
    storage_account_name: Option<String>,
}

impl DiskId {
    pub fn managed(
        resource_group_name: impl Into<String>,
        disk_name: impl Into<String>,
        caching: impl Into<String>,
    ) -> Self {
        Self {
            resource_group_name: resource_group_name.into(),
            disk_name: disk_name.into(),
            caching: caching.into(),
            storage_account_name: None,
        }
    }

    pub fn unmanaged(
        resource_group_name: impl Into<String>,
        disk_name: impl Into<String>,
        caching: impl Into<String>,
        storage_account_name: impl Into<String>,
    ) -> Self {
        Self {
            storage_account_name: Some(storage_account_name.into()),
            ..Self::managed(resource_group_name, disk_name, caching)
        }
    }

    pub fn resource_group_name(&self) -> &str {
        &self.resource_group_name
    }

    pub fn disk_name(&self) -> &str {
        &self.disk_name
    }

    pub fn caching(&self) -> &str {
        &self.caching
    }

    pub fn storage_account_name(&self) -> Option<&str> {
        self.storage_account_name.as_deref()
    }
}

impl fmt::Display for DiskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs = BTreeMap::new();
        pairs.insert(KEY_CACHING, self.caching.as_str());
        pairs.insert(KEY_DISK_NAME, self.disk_name.as_str());
        pairs.insert(KEY_RESOURCE_GROUP, self.resource_group_name.as_str());
        if let Some(sa) = &self.storage_account_name {
            pairs.insert(KEY_STORAGE_ACCOUNT, sa.as_str());
        }
        format_pairs(f, &pairs)
    }
}

impl FromStr for DiskId {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self> {
        let mut pairs = parse_pairs(s)?;
        let missing = || VmError::InvalidIdentifier(s.to_string());
        Ok(Self {
            disk_name: pairs.remove(KEY_DISK_NAME).ok_or_else(missing)?,
            caching: pairs.remove(KEY_CACHING).ok_or_else(missing)?,
            resource_group_name: pairs.remove(KEY_RESOURCE_GROUP).ok_or_else(missing)?,
            storage_account_name: pairs.remove(KEY_STORAGE_ACCOUNT),
        })
    }
}
