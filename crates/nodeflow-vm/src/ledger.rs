//! Rollback ledger for VM creation
//!
//! Before each step that creates something remote, the step's inverse is
//! pushed. On failure the ledger is unwound newest first; every inverse is
//! attempted and its error collected.

use nodeflow_cloud::NetworkInterface;

/// Inverse of one create step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Undo {
    /// Remove the dynamic public IP named after the VM, if it exists
    DeletePublicIp { name: String },

    /// Interfaces were being created but not all of them are known yet;
    /// remove every interface named `<vm_name>-*`
    SweepNetworkInterfaces { vm_name: String },

    DeleteNetworkInterfaces { names: Vec<String> },

    DeregisterGatewayAddress { gateway: String, ip_address: String },
}

impl Undo {
    /// Human readable resources this entry would remove
    pub fn resources(&self) -> Vec<String> {
        match self {
            Undo::DeletePublicIp { name } => vec![format!("Public IP: {}", name)],
            Undo::SweepNetworkInterfaces { vm_name } => {
                vec![format!("Network Interfaces: {}-*", vm_name)]
            }
            Undo::DeleteNetworkInterfaces { names } => names
                .iter()
                .map(|name| format!("Network Interface: {}", name))
                .collect(),
            Undo::DeregisterGatewayAddress {
                gateway,
                ip_address,
            } => vec![format!(
                "Application Gateway backend address: {} in {}",
                ip_address, gateway
            )],
        }
    }
}

#[derive(Debug, Default)]
pub struct RollbackLedger {
    entries: Vec<Undo>,
}

impl RollbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, undo: Undo) {
        tracing::debug!(?undo, "recorded rollback step");
        self.entries.push(undo);
    }

    /// Replace the interface sweep with the exact interfaces that were created
    pub fn settle_network_interfaces(&mut self, interfaces: &[NetworkInterface]) {
        let names: Vec<String> = interfaces.iter().map(|nic| nic.name.clone()).collect();
        match self
            .entries
            .iter_mut()
            .rev()
            .find(|u| matches!(u, Undo::SweepNetworkInterfaces { .. }))
        {
            Some(entry) => *entry = Undo::DeleteNetworkInterfaces { names },
            None => self.entries.push(Undo::DeleteNetworkInterfaces { names }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Undo] {
        &self.entries
    }

    /// Resources left behind if the ledger is not unwound, oldest first
    pub fn resources(&self) -> Vec<String> {
        self.entries.iter().flat_map(Undo::resources).collect()
    }

    /// Drain entries in unwind order (newest first)
    pub fn unwind_order(&mut self) -> Vec<Undo> {
        let mut entries = std::mem::take(&mut self.entries);
        entries.reverse();
        entries
    }
}
