//! NodeFlow VM lifecycle orchestration
//!
//! [`VmManager`] creates, deletes, reboots and tags VMs and attaches data
//! disks to them through a [`nodeflow_cloud::CloudClient`]. Availability sets
//! are shared between VMs and coordinated across processes with
//! [`nodeflow_lock`].
//!
//! # Components
//!
//! - [`builder`]: VM spec, bootstrap payload, tags and availability set naming
//! - [`planner`]: subnets, security groups, load balancer, public IPs and
//!   network interfaces
//! - [`availability_set`]: get-or-create and delete-if-empty under locks
//! - [`gateway`]: application gateway backend pool registration
//! - [`ledger`]: inverse actions unwound when a create fails
//! - [`manager`]: the lifecycle operations
//!
//! # Example
//!
//! ```no_run
//! use nodeflow_vm::{InstanceId, VmManager};
//!
//! # async fn example(manager: VmManager) -> nodeflow_vm::Result<()> {
//! let id: InstanceId = "agent_id:vm-0a1b;resource_group_name:bosh-rg".parse()?;
//! manager.reboot(&id).await?;
//! # Ok(())
//! # }
//! ```

pub mod availability_set;
pub mod builder;
pub mod disks;
pub mod env;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod image;
pub mod ledger;
pub mod manager;
pub mod network;
pub mod planner;

pub use availability_set::AvailabilitySetManager;
pub use disks::{BlobDiskManager, DiskManager, StorageAccount, StorageAccountManager};
pub use env::{DirectorEnvironment, VmEnvironment};
pub use error::{Result, VmError};
pub use gateway::GatewayRegistrar;
pub use identity::{DiskId, InstanceId};
pub use image::ImageMetadata;
pub use ledger::{RollbackLedger, Undo};
pub use manager::{CreateFailure, PROVISIONING_FAIL_RETRIES, VmManager};
pub use network::{Network, NetworkKind, NetworkTopology, VipNetwork};
pub use planner::NetworkPlanner;
