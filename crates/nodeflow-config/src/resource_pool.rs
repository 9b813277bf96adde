//! Per-VM placement and sizing properties

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Deserializer, Serialize};

const AVAILABILITY_ZONES: [&str; 3] = ["1", "2", "3"];

/// Properties a caller attaches to a VM request.
///
/// Every key except `instance_type` is optional:
///
/// | Key | Default | Effect |
/// |---|---|---|
/// | `instance_type` | required | VM size |
/// | `resource_group_name` | cloud default | resource group recorded in the instance id when the VM is named |
/// | `availability_set` | env group, else none | availability set to join |
/// | `platform_update_domain_count` | 5 | update domains of a new availability set |
/// | `platform_fault_domain_count` | 2 managed, 3 unmanaged | fault domains of a new availability set |
/// | `application_gateway` | none | gateway whose backend pool receives the primary IP |
/// | `load_balancer` | none | load balancer bound to the primary interface |
/// | `security_group` | network, then cloud default | security group of every interface |
/// | `assign_dynamic_public_ip` | false | allocate a public IP named after the VM |
/// | `availability_zone` | none | zone `1`, `2` or `3`; never combined with an availability set |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePool {
    #[serde(default)]
    pub instance_type: Option<String>,

    #[serde(default)]
    pub resource_group_name: Option<String>,

    #[serde(default)]
    pub availability_set: Option<String>,

    #[serde(default)]
    pub platform_update_domain_count: Option<u32>,

    #[serde(default)]
    pub platform_fault_domain_count: Option<u32>,

    #[serde(default)]
    pub application_gateway: Option<String>,

    #[serde(default)]
    pub load_balancer: Option<String>,

    #[serde(default)]
    pub security_group: Option<String>,

    #[serde(default)]
    pub assign_dynamic_public_ip: bool,

    #[serde(default, deserialize_with = "deserialize_zone")]
    pub availability_zone: Option<String>,

    #[serde(default)]
    pub root_disk: Option<RootDiskProperties>,

    #[serde(default)]
    pub ephemeral_disk: Option<EphemeralDiskProperties>,

    #[serde(default)]
    pub storage_account_type: Option<String>,

    #[serde(default)]
    pub caching: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootDiskProperties {
    /// Size in MiB
    #[serde(default)]
    pub size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralDiskProperties {
    #[serde(default)]
    pub use_root_disk: bool,

    /// Size in MiB
    #[serde(default)]
    pub size: Option<u32>,
}

impl ResourcePool {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Required VM size
    pub fn instance_type(&self) -> Result<&str> {
        self.instance_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::Invalid("missing required property `instance_type'".to_string())
            })
    }

    /// Resource group the VM is placed in; `default` is the cloud-wide one.
    ///
    /// Read when the instance id is minted. Afterwards the id is authoritative.
    pub fn resource_group<'a>(&'a self, default: &'a str) -> &'a str {
        self.resource_group_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(default)
    }

    pub fn validate(&self) -> Result<()> {
        self.instance_type()?;

        if let Some(zone) = &self.availability_zone {
            if self.availability_set.is_some() {
                return Err(ConfigError::Invalid(
                    "only one of `availability_zone' and `availability_set' is allowed".to_string(),
                ));
            }
            if !AVAILABILITY_ZONES.contains(&zone.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "`{}' is not a valid availability zone, available availability zones: {:?}",
                    zone, AVAILABILITY_ZONES
                )));
            }
        }
        Ok(())
    }
}

/// Zones are written as `1` or `"1"` interchangeably
fn deserialize_zone<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Zone {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Zone>::deserialize(deserializer)?.map(|zone| match zone {
        Zone::Text(s) => s,
        Zone::Number(n) => n.to_string(),
    }))
}
