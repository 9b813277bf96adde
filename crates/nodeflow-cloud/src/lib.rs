//! NodeFlow Cloud API boundary
//!
//! This crate defines the interface NodeFlow consumes from a cloud API client:
//! the [`CloudClient`] trait, the remote resource model and the request
//! parameters submitted for VMs, network interfaces, public IPs, availability
//! sets and data disks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  nodeflow-vm                     │
//! │        (VM lifecycle orchestration)              │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               nodeflow-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Client Abstraction               │   │
//! │  │  trait CloudClient { ... }                │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ Resource     │  │ Request      │            │
//! │  │ model        │  │ parameters   │            │
//! │  └──────────────┘  └──────────────┘            │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!          ┌────────▼────────┐
//!          │  transport/auth │  (provided by the embedding service)
//!          └─────────────────┘
//! ```

pub mod client;
pub mod error;
pub mod model;

// Re-exports
pub use client::CloudClient;
pub use error::{CloudError, PROVISIONING_STATE_FAILED, Result};
pub use model::{
    AvailabilitySet, AvailabilitySetRef, AvailabilitySetSpec, DataDiskAttachment, DataDiskSource,
    EphemeralDisk, ImageReference, ImageSource, LoadBalancer, ManagedDisk, NetworkInterface,
    NetworkInterfaceSpec, OsDisk, OsProfile, OsType, PublicIp, PublicIpSpec, ResourceGroup,
    SecurityGroup, Subnet, Tags, VirtualMachine, VmSpec, WindowsCredentials,
};
