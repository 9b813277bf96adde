//! Application gateway backend pool registration
//!
//! Unrelated VMs register into the same backend pool, so every change to a
//! pool happens under that gateway's mutex. Waiting for it is bounded.

use crate::error::Result;
use nodeflow_cloud::CloudClient;
use nodeflow_lock::LockCoordinator;
use std::sync::Arc;
use std::time::Duration;

const LOCK_PREFIX: &str = "application-gateway";

pub fn lock_name(gateway: &str) -> String {
    format!("{}-{}", LOCK_PREFIX, gateway)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Add,
    Remove,
}

pub struct GatewayRegistrar {
    client: Arc<dyn CloudClient>,
    locks: LockCoordinator,
    timeout: Duration,
}

impl GatewayRegistrar {
    pub fn new(client: Arc<dyn CloudClient>, locks: LockCoordinator, timeout: Duration) -> Self {
        Self {
            client,
            locks,
            timeout,
        }
    }

    /// Add `ip_address` to the backend pool of `gateway` unless already there
    pub async fn register(&self, gateway: &str, ip_address: &str) -> Result<()> {
        self.change(Change::Add, gateway, ip_address).await
    }

    /// Remove `ip_address` from the backend pool of `gateway` if present
    pub async fn deregister(&self, gateway: &str, ip_address: &str) -> Result<()> {
        self.change(Change::Remove, gateway, ip_address).await
    }

    async fn change(&self, change: Change, gateway: &str, ip_address: &str) -> Result<()> {
        let lock_name = lock_name(gateway);
        let mutex = self.locks.mutex_with_timeout(&lock_name, self.timeout);

        let guard = match mutex.acquire().await {
            Ok(guard) => guard,
            Err(e) => {
                self.mark(&lock_name, &e.to_string()).await;
                return Err(e.into());
            }
        };

        let result = async {
            let present = self
                .client
                .list_gateway_backend_addresses(gateway)
                .await?
                .iter()
                .any(|addr| addr == ip_address);

            match change {
                Change::Add if !present => {
                    tracing::info!("Adding {} to the backend pool of `{}'", ip_address, gateway);
                    self.client.add_gateway_backend_address(gateway, ip_address).await?;
                }
                Change::Remove if present => {
                    tracing::info!("Removing {} from the backend pool of `{}'", ip_address, gateway);
                    self.client
                        .delete_gateway_backend_address(gateway, ip_address)
                        .await?;
                }
                _ => tracing::debug!(
                    "Backend pool of `{}' needs no change for {}",
                    gateway,
                    ip_address
                ),
            }
            Ok::<(), crate::error::VmError>(())
        }
        .await;

        match result {
            Ok(()) => Ok(guard.release().await?),
            Err(e) => {
                // A pool change is a single call, so the pool is still consistent
                if let Err(release_err) = guard.release().await {
                    tracing::warn!(lock = %lock_name, "failed to release mutex: {}", release_err);
                }
                self.mark(&lock_name, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn mark(&self, lock_name: &str, reason: &str) {
        if let Err(e) = self.locks.mark_for_deletion(lock_name, reason).await {
            tracing::error!(lock = %lock_name, "failed to mark lock for deletion: {}", e);
        }
    }
}
