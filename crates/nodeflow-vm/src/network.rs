//! Network topology of a VM request

use crate::error::{Result, VmError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NetworkKind {
    /// Static private IP
    Manual { private_ip: String },
    Dynamic,
}

/// A network a VM attaches one interface to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,

    #[serde(flatten)]
    pub kind: NetworkKind,

    pub resource_group_name: String,
    pub virtual_network_name: String,
    pub subnet_name: String,

    #[serde(default)]
    pub security_group: Option<String>,
}

impl Network {
    pub fn private_ip(&self) -> Option<&str> {
        match &self.kind {
            NetworkKind::Manual { private_ip } => Some(private_ip),
            NetworkKind::Dynamic => None,
        }
    }
}

/// Network that binds an existing public IP to the primary interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipNetwork {
    pub name: String,
    pub resource_group_name: String,
    pub public_ip: String,
}

/// Ordered interface networks plus an optional VIP binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTopology {
    networks: Vec<Network>,

    #[serde(default)]
    vip_network: Option<VipNetwork>,

    #[serde(default)]
    default_dns: Option<Vec<String>>,
}

impl NetworkTopology {
    pub fn new(
        networks: Vec<Network>,
        vip_network: Option<VipNetwork>,
        default_dns: Option<Vec<String>>,
    ) -> Result<Self> {
        if networks.is_empty() {
            return Err(VmError::Configuration(
                "at least one manual or dynamic network is required".to_string(),
            ));
        }
        Ok(Self {
            networks,
            vip_network,
            default_dns,
        })
    }

    /// Networks in declaration order; index 0 is the primary interface
    pub fn networks(&self) -> &[Network] {
        &self.networks
    }

    pub fn vip_network(&self) -> Option<&VipNetwork> {
        self.vip_network.as_ref()
    }

    pub fn default_dns(&self) -> Option<&[String]> {
        self.default_dns.as_deref()
    }
}
