//! Deployment environment attached to a VM request

use serde::{Deserialize, Serialize};

/// Environment handed down by the director for one VM.
///
/// Only the logical group is consumed here; it names the availability set
/// when the resource pool does not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmEnvironment {
    #[serde(default)]
    pub bosh: Option<DirectorEnvironment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorEnvironment {
    #[serde(default)]
    pub group: Option<String>,
}

impl VmEnvironment {
    pub fn with_group(group: impl Into<String>) -> Self {
        Self {
            bosh: Some(DirectorEnvironment {
                group: Some(group.into()),
            }),
        }
    }

    pub fn group(&self) -> Option<&str> {
        self.bosh.as_ref().and_then(|b| b.group.as_deref())
    }
}
