//! Network attachment planner
//!
//! Resolves the load balancer, public IP, security group and subnet of every
//! interface a VM needs, then creates the interfaces in network declaration
//! order. Interface 0 is the primary one: it carries the public IP and the
//! caller's primary tags.

use crate::builder::system_tags;
use crate::error::{Result, VmError};
use crate::ledger::{RollbackLedger, Undo};
use crate::network::{Network, NetworkTopology, VipNetwork};
use nodeflow_cloud::{
    CloudClient, LoadBalancer, NetworkInterface, NetworkInterfaceSpec, PublicIp, PublicIpSpec,
    SecurityGroup, Subnet, Tags,
};
use nodeflow_config::properties::PIP_IDLE_TIMEOUT_RANGE;
use nodeflow_config::{CloudProperties, ResourcePool};

pub struct NetworkPlanner<'a> {
    client: &'a dyn CloudClient,
    properties: &'a CloudProperties,
}

impl<'a> NetworkPlanner<'a> {
    pub fn new(client: &'a dyn CloudClient, properties: &'a CloudProperties) -> Self {
        Self { client, properties }
    }

    pub async fn load_balancer(&self, pool: &ResourcePool) -> Result<Option<LoadBalancer>> {
        let Some(name) = &pool.load_balancer else {
            return Ok(None);
        };
        match self.client.get_load_balancer(name).await? {
            Some(lb) => Ok(Some(lb)),
            None => Err(VmError::NotFound(format!(
                "Cannot find the load balancer `{}'",
                name
            ))),
        }
    }

    /// Existing public IP bound through the VIP network
    pub async fn vip_public_ip(&self, vip: Option<&VipNetwork>) -> Result<Option<PublicIp>> {
        let Some(vip) = vip else {
            return Ok(None);
        };
        match self
            .client
            .find_public_ip_by_address(&vip.resource_group_name, &vip.public_ip)
            .await?
        {
            Some(ip) => Ok(Some(ip)),
            None => Err(VmError::NotFound(format!(
                "Cannot find the public IP address `{}' in the resource group `{}'",
                vip.public_ip, vip.resource_group_name
            ))),
        }
    }

    /// Security group of one interface.
    ///
    /// The name comes from the resource pool, else the network, else the
    /// default. It is looked up in the network's resource group first and in
    /// the default resource group second.
    pub async fn security_group(
        &self,
        pool: &ResourcePool,
        network: &Network,
    ) -> Result<SecurityGroup> {
        let name = pool
            .security_group
            .as_deref()
            .or(network.security_group.as_deref())
            .or(self.properties.default_security_group.as_deref())
            .ok_or_else(|| {
                VmError::Configuration(format!(
                    "No security group is configured for the network `{}'",
                    network.name
                ))
            })?;

        let resource_group = &network.resource_group_name;
        if let Some(sg) = self.client.get_security_group(resource_group, name).await? {
            return Ok(sg);
        }

        let default_resource_group = &self.properties.resource_group_name;
        if resource_group != default_resource_group {
            tracing::info!(
                "Cannot find the network security group `{}' in the resource group `{}', trying to search it in the resource group `{}'",
                name,
                resource_group,
                default_resource_group
            );
            if let Some(sg) = self
                .client
                .get_security_group(default_resource_group, name)
                .await?
            {
                return Ok(sg);
            }
        }

        Err(VmError::NotFound(format!(
            "Cannot find the network security group `{}'",
            name
        )))
    }

    pub async fn subnet(&self, network: &Network) -> Result<Subnet> {
        self.client
            .get_subnet(
                &network.resource_group_name,
                &network.virtual_network_name,
                &network.subnet_name,
            )
            .await?
            .ok_or_else(|| {
                VmError::NotFound(format!(
                    "Cannot find the subnet `{}/{}' in the resource group `{}'",
                    network.virtual_network_name, network.subnet_name, network.resource_group_name
                ))
            })
    }

    async fn dynamic_public_ip(
        &self,
        resource_group: &str,
        vm_name: &str,
        location: &str,
        ledger: &mut RollbackLedger,
    ) -> Result<PublicIp> {
        let idle_timeout = self.properties.pip_idle_timeout_in_minutes;
        if !PIP_IDLE_TIMEOUT_RANGE.contains(&idle_timeout) {
            return Err(VmError::Configuration(format!(
                "pip_idle_timeout_in_minutes needs to be an integer between {} and {}",
                PIP_IDLE_TIMEOUT_RANGE.start(),
                PIP_IDLE_TIMEOUT_RANGE.end()
            )));
        }

        ledger.push(Undo::DeletePublicIp {
            name: vm_name.to_string(),
        });
        tracing::info!("Creating dynamic public IP `{}'", vm_name);
        self.client
            .create_public_ip(
                resource_group,
                &PublicIpSpec {
                    name: vm_name.to_string(),
                    location: location.to_string(),
                    is_static: false,
                    idle_timeout_in_minutes: idle_timeout,
                },
            )
            .await?;

        self.client
            .get_public_ip(resource_group, vm_name)
            .await?
            .ok_or_else(|| {
                VmError::NotFound(format!(
                    "Cannot find the public IP `{}' in the resource group `{}'",
                    vm_name, resource_group
                ))
            })
    }

    /// Create one interface per network and return them in order.
    ///
    /// Every remote side effect is recorded in `ledger` before it is attempted.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_network_interfaces(
        &self,
        resource_group: &str,
        vm_name: &str,
        location: &str,
        pool: &ResourcePool,
        topology: &NetworkTopology,
        primary_tags: &Tags,
        ledger: &mut RollbackLedger,
    ) -> Result<Vec<NetworkInterface>> {
        let load_balancer = self.load_balancer(pool).await?;
        let mut public_ip = self.vip_public_ip(topology.vip_network()).await?;
        if public_ip.is_none() && pool.assign_dynamic_public_ip {
            public_ip = Some(
                self.dynamic_public_ip(resource_group, vm_name, location, ledger)
                    .await?,
            );
        }

        ledger.push(Undo::SweepNetworkInterfaces {
            vm_name: vm_name.to_string(),
        });

        let secondary_tags = system_tags();
        let mut interfaces = Vec::with_capacity(topology.networks().len());
        for (index, network) in topology.networks().iter().enumerate() {
            let security_group = self.security_group(pool, network).await?;
            let subnet = self.subnet(network).await?;
            let spec = NetworkInterfaceSpec {
                name: format!("{}-{}", vm_name, index),
                location: location.to_string(),
                private_ip: network.private_ip().map(str::to_string),
                public_ip: if index == 0 { public_ip.clone() } else { None },
                security_group,
                ipconfig_name: format!("ipconfig{}", index),
            };
            let tags = if index == 0 {
                primary_tags
            } else {
                &secondary_tags
            };

            tracing::info!("Creating network interface `{}'", spec.name);
            self.client
                .create_network_interface(resource_group, &spec, &subnet, tags, load_balancer.as_ref())
                .await?;

            let nic = self
                .client
                .get_network_interface(resource_group, &spec.name)
                .await?
                .ok_or_else(|| {
                    VmError::NotFound(format!(
                        "Cannot find the network interface `{}' in the resource group `{}'",
                        spec.name, resource_group
                    ))
                })?;
            interfaces.push(nic);
        }

        ledger.settle_network_interfaces(&interfaces);
        Ok(interfaces)
    }
}
